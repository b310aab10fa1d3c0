//! # rowsort - external sort of a tab-separated table
//!
//! Reads a table from stdin, sorts its rows by one or more columns and writes
//! the sorted table to stdout. Rows that do not fit the memory budget are
//! spilled to sorted run files and merged back, so the input may be larger
//! than memory.
//!
//! ## Usage
//!
//! ```text
//! rowsort FIELD...      Sort by the given columns, in priority order
//!                       (prefix a column with '-' for descending)
//! ```
//!
//! The first input line is the header. Cells are typed per value: empty is
//! null, `true`/`false` are booleans, then integers, floats, and anything
//! else is a string. Integers and floats in one column compare by value.
//! Nulls sort last ascending and first descending.
//!
//! ## Configuration
//!
//! ```text
//! SORT_SPILL_KB        Spill threshold in KiB      (default: 4096)
//! SORT_TEMP_DIR        Spill file directory        (default: system temp)
//! SORT_ID              Spill file name prefix      (default: "sort")
//! SORT_READ_AHEAD      Items buffered per run      (default: 10)
//! SORT_READ_CHUNK_KB   Run file read size in KiB   (default: 8)
//! RUST_LOG             Log filter for stderr       (default: "info")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ printf 'name\tage\nbob\t25\nalice\t30\ncarol\t\n' | rowsort -age name
//! name    age
//! carol
//! alice   30
//! bob     25
//! ```

use anyhow::{bail, Context, Result};
use config::SortConfig;
use engine::SortingStream;
use input::TsvReadStream;
use ordering::{FieldSpec, Row};
use std::cell::RefCell;
use std::io::{self, BufRead, BufWriter, Write};
use std::rc::Rc;
use stream::{Handlers, ReadStream, StreamError};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod codec;
mod input;

const USAGE: &str = "usage: rowsort FIELD... (prefix a field with '-' to sort descending)";

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let specs = match FieldSpec::parse_list(&args.join(" ")) {
        Ok(specs) => specs,
        Err(e) => bail!("{e}\n{USAGE}"),
    };

    let config = SortConfig::from_env();
    let stdin = io::stdin().lock();
    let stdout = BufWriter::new(io::stdout().lock());
    let rows = sort_table(stdin, stdout, specs, config)?;
    info!(rows, "done");
    Ok(())
}

/// Sorts the table read from `reader` and writes it to `output`. Returns the
/// number of data rows written.
fn sort_table<R, W>(mut reader: R, output: W, specs: Vec<FieldSpec>, config: SortConfig) -> Result<u64>
where
    R: BufRead + 'static,
    W: Write + 'static,
{
    let Some(header) = input::read_header(&mut reader).context("failed to read header")? else {
        return Ok(0);
    };
    for spec in &specs {
        if !header.contains(&spec.key) {
            bail!(
                "unknown column '{}' (header has: {})",
                spec.key,
                header.join(", ")
            );
        }
    }

    let out = Rc::new(RefCell::new(output));
    writeln!(out.borrow_mut(), "{}", header.join("\t"))?;

    let columns: Rc<[String]> = header.into();
    let rows = TsvReadStream::new(reader, Rc::clone(&columns));
    let mut sort = SortingStream::by_fields(rows, specs, codec::row_codec(columns), config)?;

    let outcome: Rc<RefCell<Option<Result<(), StreamError>>>> = Rc::new(RefCell::new(None));
    let write_error: Rc<RefCell<Option<io::Error>>> = Rc::new(RefCell::new(None));
    let written = Rc::new(RefCell::new(0u64));

    let sink = Rc::clone(&out);
    let failed_write = Rc::clone(&write_error);
    let count = Rc::clone(&written);
    let demand = sort.demand();
    let on_end = Rc::clone(&outcome);
    let on_error = Rc::clone(&outcome);
    sort.set_handlers(
        Handlers::new(move |row: Row| {
            if let Err(e) = write_row(&mut *sink.borrow_mut(), &row) {
                *failed_write.borrow_mut() = Some(e);
                demand.pause();
                return;
            }
            *count.borrow_mut() += 1;
        })
        .on_end(move || *on_end.borrow_mut() = Some(Ok(())))
        .on_error(move |e| *on_error.borrow_mut() = Some(Err(e))),
    );

    sort.resume();
    loop {
        if let Some(e) = write_error.borrow_mut().take() {
            sort.close();
            return Err(e).context("failed to write output");
        }
        let done = outcome.borrow_mut().take();
        match done {
            Some(result) => {
                result.context("sort failed")?;
                break;
            }
            None => {
                std::thread::yield_now();
                sort.drive();
            }
        }
    }
    out.borrow_mut().flush()?;

    let stats = sort.stats();
    info!(
        rows = stats.items_in,
        spills = stats.spills,
        runs = stats.runs,
        "table sorted"
    );
    let n = *written.borrow();
    Ok(n)
}

fn write_row<W: Write + ?Sized>(out: &mut W, row: &Row) -> io::Result<()> {
    let mut first = true;
    for value in row.values() {
        if !first {
            out.write_all(b"\t")?;
        }
        first = false;
        write!(out, "{value}")?;
    }
    out.write_all(b"\n")
}
