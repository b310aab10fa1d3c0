use super::*;
use anyhow::Result;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use frame::{Deserializer, FrameReader};
use ordering::Natural;
use std::cell::Cell;
use std::fs;
use std::io::{self, Read};
use stream::{drain, BoxError};
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn ser() -> Rc<dyn Serializer<u32>> {
    Rc::new(|v: &u32, out: &mut Vec<u8>| -> Result<(), BoxError> {
        out.write_u32::<BigEndian>(*v)?;
        Ok(())
    })
}

fn de() -> Rc<dyn Deserializer<u32>> {
    Rc::new(|mut b: &[u8]| -> Result<u32, BoxError> { Ok(b.read_u32::<BigEndian>()?) })
}

/// Every item weighs 4 bytes, so a threshold of `4 * n` spills every `n`
/// items.
fn builder(cfg: SortConfig, fs: Rc<dyn SpillFs>) -> RunBuilder<u32> {
    RunBuilder::new(cfg, fs, Rc::new(Natural), ser(), Rc::new(|_: &u32| 4usize))
}

fn config(dir: &Path, threshold: usize) -> SortConfig {
    SortConfig::new(dir, "unit").with_spill_threshold(threshold)
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}

fn read_run(path: &Path) -> Result<Vec<u32>> {
    let mut r = FrameReader::new(fs::File::open(path)?, de());
    Ok(drain(&mut r)?)
}

/// Local filesystem that can be told to fail creates, writes or removes.
#[derive(Default)]
struct FaultyFs {
    fail_create: Cell<bool>,
    fail_write: Cell<bool>,
    fail_remove: Cell<bool>,
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SpillFs for FaultyFs {
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write>> {
        if self.fail_create.get() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        let file = LocalFs.create(path)?;
        if self.fail_write.get() {
            drop(file);
            return Ok(Box::new(FailingWriter));
        }
        Ok(file)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read>> {
        LocalFs.open(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        if self.fail_remove.get() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
        }
        LocalFs.remove(path)
    }

    fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        LocalFs.ensure_dir(dir)
    }
}

// -------------------- Fast path --------------------

#[test]
fn below_threshold_stays_in_memory() -> Result<()> {
    let dir = tempdir()?;
    let mut b = builder(config(dir.path(), 1 << 20), Rc::new(LocalFs));
    for v in [5, 3, 8, 1] {
        b.offer(v)?;
    }
    assert_eq!(b.buffered_bytes(), 16);

    let runs = b.finish()?;
    assert_eq!(runs.len(), 1);
    match &runs[0] {
        Run::Memory(items) => assert_eq!(items, &vec![1, 3, 5, 8]),
        other => panic!("expected memory run, got {other:?}"),
    }
    assert_eq!(count_files(dir.path()), 0);
    Ok(())
}

#[test]
fn empty_input_gives_one_empty_memory_run() -> Result<()> {
    let dir = tempdir()?;
    let runs = builder(config(dir.path(), 8), Rc::new(LocalFs)).finish()?;
    assert_eq!(runs.len(), 1);
    assert!(runs[0].is_empty());
    assert!(runs[0].path().is_none());
    Ok(())
}

// -------------------- Spilling --------------------

#[test]
fn reaching_threshold_spills_a_sorted_run() -> Result<()> {
    let dir = tempdir()?;
    let mut b = builder(config(dir.path(), 12), Rc::new(LocalFs));
    b.offer(9)?;
    b.offer(2)?;
    assert_eq!(b.spill_count(), 0);
    b.offer(4)?;
    assert_eq!(b.spill_count(), 1);
    assert_eq!(b.buffered_len(), 0);
    assert_eq!(b.buffered_bytes(), 0);

    let path = dir.path().join(format!("unit-{:08x}-000001.sort", b.tag()));
    assert!(path.exists());
    assert_eq!(read_run(&path)?, vec![2, 4, 9]);
    Ok(())
}

#[test]
fn finish_spills_remainder_as_final_run() -> Result<()> {
    let dir = tempdir()?;
    let mut b = builder(config(dir.path(), 8), Rc::new(LocalFs));
    for v in [7, 6, 5, 4, 3] {
        b.offer(v)?;
    }
    assert_eq!(b.spill_count(), 2);

    let runs = b.finish()?;
    assert_eq!(runs.len(), 3);
    let contents: Vec<Vec<u32>> = runs
        .iter()
        .map(|r| read_run(r.path().expect("file run")))
        .collect::<Result<_>>()?;
    assert_eq!(contents, vec![vec![6, 7], vec![4, 5], vec![3]]);

    match &runs[2] {
        Run::File(f) => {
            assert_eq!(f.seq, 3);
            assert_eq!(f.items, 1);
            assert_eq!(f.bytes, 8);
        }
        other => panic!("expected file run, got {other:?}"),
    }
    Ok(())
}

#[test]
fn finish_without_remainder_adds_no_empty_run() -> Result<()> {
    let dir = tempdir()?;
    let mut b = builder(config(dir.path(), 8), Rc::new(LocalFs));
    for v in [1, 2, 3, 4] {
        b.offer(v)?;
    }
    let runs = b.finish()?;
    assert_eq!(runs.len(), 2);
    assert_eq!(count_files(dir.path()), 2);
    Ok(())
}

#[test]
fn drop_before_finish_removes_run_files() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut b = builder(config(dir.path(), 4), Rc::new(LocalFs));
        for v in 0..5 {
            b.offer(v)?;
        }
        assert_eq!(count_files(dir.path()), 5);
    }
    assert_eq!(count_files(dir.path()), 0);
    Ok(())
}

#[test]
fn finished_runs_outlive_the_builder() -> Result<()> {
    let dir = tempdir()?;
    let mut b = builder(config(dir.path(), 4), Rc::new(LocalFs));
    b.offer(1)?;
    let runs = b.finish()?;
    assert_eq!(count_files(dir.path()), 1);
    assert!(runs[0].path().is_some_and(Path::exists));
    Ok(())
}

// -------------------- Naming --------------------

#[test]
fn builders_sharing_a_config_write_distinct_files() -> Result<()> {
    let dir = tempdir()?;
    let mut a = builder(config(dir.path(), 4), Rc::new(LocalFs));
    let mut b = builder(config(dir.path(), 4), Rc::new(LocalFs));
    a.offer(1)?;
    b.offer(2)?;
    a.offer(3)?;

    let runs_a = a.finish()?;
    let runs_b = b.finish()?;
    assert_eq!(count_files(dir.path()), 3);
    assert_eq!(read_run(runs_b[0].path().expect("file run"))?, vec![2]);
    assert_eq!(read_run(runs_a[1].path().expect("file run"))?, vec![3]);
    Ok(())
}

#[test]
fn taken_names_are_skipped_and_left_alone() -> Result<()> {
    let dir = tempdir()?;
    let cfg = config(dir.path(), 4);
    let mut b = builder(cfg.clone(), Rc::new(LocalFs));
    let tag = b.tag();
    for seq in 1..=2 {
        fs::write(cfg.run_path(tag, seq), b"leftover")?;
    }

    b.offer(5)?;
    let runs = b.finish()?;
    match &runs[0] {
        Run::File(f) => {
            assert_eq!(f.seq, 3);
            assert_eq!(read_run(&f.path)?, vec![5]);
        }
        other => panic!("expected file run, got {other:?}"),
    }
    for seq in 1..=2 {
        assert_eq!(fs::read(cfg.run_path(tag, seq))?, b"leftover");
    }
    Ok(())
}

#[test]
fn spill_gives_up_when_every_name_is_taken() -> Result<()> {
    let dir = tempdir()?;
    let cfg = config(dir.path(), 4);
    let mut b = builder(cfg.clone(), Rc::new(LocalFs));
    for seq in 1..=u64::from(CREATE_ATTEMPTS) {
        fs::write(cfg.run_path(b.tag(), seq), b"leftover")?;
    }

    let err = b.offer(1).unwrap_err();
    assert!(matches!(err, StreamError::Io(ref e) if e.kind() == io::ErrorKind::AlreadyExists));
    assert_eq!(b.spill_count(), 0);
    drop(b);
    assert_eq!(count_files(dir.path()), CREATE_ATTEMPTS as usize);
    Ok(())
}

// -------------------- Failures --------------------

#[test]
fn create_failure_aborts_with_io_error() -> Result<()> {
    let dir = tempdir()?;
    let fs = Rc::new(FaultyFs::default());
    fs.fail_create.set(true);
    let mut b = builder(config(dir.path(), 4), fs);
    let err = b.offer(1).unwrap_err();
    assert!(matches!(err, StreamError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied));
    assert_eq!(count_files(dir.path()), 0);
    Ok(())
}

#[test]
fn write_failure_removes_partial_file() -> Result<()> {
    let dir = tempdir()?;
    let fs = Rc::new(FaultyFs::default());
    fs.fail_write.set(true);
    let mut b = builder(config(dir.path(), 4), fs);
    assert!(matches!(b.offer(1), Err(StreamError::Io(_))));
    assert_eq!(count_files(dir.path()), 0);
    assert_eq!(b.spill_count(), 0);
    Ok(())
}

#[test]
fn serializer_failure_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let failing: Rc<dyn Serializer<u32>> =
        Rc::new(|_: &u32, _: &mut Vec<u8>| -> Result<(), BoxError> { Err("unencodable".into()) });
    let mut b = RunBuilder::new(
        config(dir.path(), 4),
        Rc::new(LocalFs),
        Rc::new(Natural),
        failing,
        Rc::new(|_: &u32| 4usize),
    );
    assert!(matches!(b.offer(1), Err(StreamError::Serialization(_))));
    assert_eq!(count_files(dir.path()), 0);
    Ok(())
}

#[test]
fn remove_failures_are_swallowed() -> Result<()> {
    let dir = tempdir()?;
    let fs = Rc::new(FaultyFs::default());
    let mut b = builder(config(dir.path(), 4), Rc::clone(&fs) as Rc<dyn SpillFs>);
    b.offer(1)?;
    fs.fail_remove.set(true);
    drop(b);
    assert_eq!(count_files(dir.path()), 1);
    Ok(())
}

#[test]
fn remove_quietly_treats_missing_as_removed() {
    let dir = tempdir().unwrap();
    assert!(remove_quietly(&LocalFs, &dir.path().join("nope")));
}

#[test]
fn create_refuses_to_clobber() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("x");
    fs::write(&path, b"keep")?;
    let err = LocalFs.create(&path).err().map(|e| e.kind());
    assert_eq!(err, Some(io::ErrorKind::AlreadyExists));
    assert_eq!(fs::read(&path)?, b"keep");
    Ok(())
}
