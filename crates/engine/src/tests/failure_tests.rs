use super::helpers::{
    config, count_sort_files, u64_codec, undecodable_codec, watch, FaultyFs, Stutter,
};
use crate::*;
use anyhow::Result;
use ordering::Natural;
use std::io;
use std::rc::Rc;
use stream::{DemandError, ReadStream, StreamError, VecReadStream};
use tempfile::tempdir;

// -------------------- Construction --------------------

#[test]
fn invalid_config_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let cfg = SortConfig::new(dir.path(), "bad").with_spill_threshold(0);
    let err = SortingStream::new(VecReadStream::new(vec![1u64]), Rc::new(Natural), u64_codec(), cfg)
        .unwrap_err();
    assert!(matches!(err, ConfigError::ZeroThreshold));
    Ok(())
}

#[test]
fn missing_temp_dir_is_created() -> Result<()> {
    let dir = tempdir()?;
    let nested = dir.path().join("a").join("b");
    let cfg = config(&nested, 2);
    let mut sort =
        SortingStream::new(VecReadStream::new(vec![3u64, 2, 1]), Rc::new(Natural), u64_codec(), cfg)?;

    assert!(nested.is_dir());
    assert_eq!(sort.drain()?, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn negative_fetch_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let input = Stutter::new(vec![1u64, 2]);
    let drives = input.drives();
    let mut sort = SortingStream::new(input, Rc::new(Natural), u64_codec(), config(dir.path(), 4))?;
    let _seen = watch(&mut sort);

    assert_eq!(sort.fetch(-1), Err(DemandError::Negative(-1)));
    assert_eq!(drives.get(), 0);
    assert!(!sort.is_terminated());
    Ok(())
}

// -------------------- Spill failures --------------------

#[test]
fn spill_create_failure_is_an_io_error() -> Result<()> {
    let dir = tempdir()?;
    let fs = Rc::new(FaultyFs::default());
    fs.fail_create.set(true);
    let input: Vec<u64> = (0..20).collect();
    let mut sort = SortingStream::with_fs(
        VecReadStream::new(input),
        Rc::new(Natural),
        u64_codec(),
        config(dir.path(), 4),
        fs,
    )?;

    match sort.drain() {
        Err(StreamError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
        other => panic!("expected io error, got {other:?}"),
    }
    assert_eq!(sort.phase(), SortPhase::Failed);
    Ok(())
}

#[test]
fn spill_write_failure_leaves_no_files() -> Result<()> {
    let dir = tempdir()?;
    let fs = Rc::new(FaultyFs::default());
    fs.fail_write.set(true);
    let input: Vec<u64> = (0..20).collect();
    let mut sort = SortingStream::with_fs(
        VecReadStream::new(input),
        Rc::new(Natural),
        u64_codec(),
        config(dir.path(), 4),
        fs,
    )?;

    assert!(matches!(sort.drain(), Err(StreamError::Io(_))));
    assert_eq!(count_sort_files(dir.path()), 0);
    Ok(())
}

// -------------------- Merge failures --------------------

#[test]
fn undecodable_run_fails_before_any_output() -> Result<()> {
    let dir = tempdir()?;
    let input: Vec<u64> = (0..40).rev().collect();
    let mut sort = SortingStream::new(
        VecReadStream::new(input),
        Rc::new(Natural),
        undecodable_codec(),
        config(dir.path(), 10),
    )?;
    let seen = watch(&mut sort);

    sort.resume();
    let seen = seen.borrow();
    assert!(seen.items.is_empty());
    assert_eq!(seen.ends, 0);
    assert_eq!(seen.errors.len(), 1);
    assert!(matches!(seen.errors[0], StreamError::Deserialization(_)));
    assert_eq!(count_sort_files(dir.path()), 0);
    Ok(())
}

#[test]
fn fast_path_never_deserializes() -> Result<()> {
    let dir = tempdir()?;
    let mut sort = SortingStream::new(
        VecReadStream::new(vec![2u64, 1]),
        Rc::new(Natural),
        undecodable_codec(),
        config(dir.path(), 10),
    )?;
    assert_eq!(sort.drain()?, vec![1, 2]);
    Ok(())
}

// -------------------- Input failures --------------------

#[test]
fn input_error_is_forwarded_and_cleans_up() -> Result<()> {
    let dir = tempdir()?;
    let input = Stutter::failing((0..30u64).collect());
    let mut sort = SortingStream::new(input, Rc::new(Natural), u64_codec(), config(dir.path(), 4))?;

    match sort.drain() {
        Err(StreamError::Upstream(source)) => {
            assert!(matches!(source.downcast_ref::<StreamError>(), Some(StreamError::Io(_))));
            let cause = std::error::Error::source(&*source).map(ToString::to_string);
            assert_eq!(cause.as_deref(), Some("connection reset"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert_eq!(sort.items_in(), 30);
    assert_eq!(count_sort_files(dir.path()), 0);
    Ok(())
}

// -------------------- Teardown --------------------

#[test]
fn drop_while_collecting_removes_spills() -> Result<()> {
    let dir = tempdir()?;
    let input = Stutter::new((0..1000u64).collect());
    let mut sort = SortingStream::new(input, Rc::new(Natural), u64_codec(), config(dir.path(), 10))?;
    let _seen = watch(&mut sort);

    sort.fetch(1)?;
    for _ in 0..100 {
        sort.drive();
    }
    assert_eq!(sort.phase(), SortPhase::Collecting);
    assert!(sort.spill_count() > 0);
    assert!(count_sort_files(dir.path()) > 0);

    drop(sort);
    assert_eq!(count_sort_files(dir.path()), 0);
    Ok(())
}

#[test]
fn drop_while_merging_removes_spills() -> Result<()> {
    let dir = tempdir()?;
    let input: Vec<u64> = (0..100).rev().collect();
    let mut sort =
        SortingStream::new(VecReadStream::new(input), Rc::new(Natural), u64_codec(), config(dir.path(), 10))?;
    let _seen = watch(&mut sort);

    sort.fetch(5)?;
    assert_eq!(sort.emitted(), 5);
    assert_eq!(count_sort_files(dir.path()), 10);

    drop(sort);
    assert_eq!(count_sort_files(dir.path()), 0);
    Ok(())
}

#[test]
fn close_tears_down_without_events() -> Result<()> {
    let dir = tempdir()?;
    let input: Vec<u64> = (0..100).rev().collect();
    let mut sort =
        SortingStream::new(VecReadStream::new(input), Rc::new(Natural), u64_codec(), config(dir.path(), 10))?;
    let seen = watch(&mut sort);

    sort.fetch(1)?;
    sort.close();
    sort.resume();

    assert_eq!(sort.phase(), SortPhase::Closed);
    assert!(sort.is_terminated());
    assert_eq!(seen.borrow().items.len(), 1);
    assert_eq!(seen.borrow().ends, 0);
    assert!(seen.borrow().errors.is_empty());
    assert_eq!(count_sort_files(dir.path()), 0);
    Ok(())
}
