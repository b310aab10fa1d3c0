//! Tab-separated table input.
//!
//! The first line is the header. Every following line becomes a [`Row`]
//! whose cells are typed by [`infer_value`].
use std::io::{self, BufRead};
use std::rc::Rc;

use ordering::{Row, Value};
use stream::{DemandHandle, Handlers, Outlet, ReadStream, StreamError};

/// Reads the header line. Returns `None` for empty input.
pub fn read_header<R: BufRead>(input: &mut R) -> io::Result<Option<Vec<String>>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(split_line(&line).map(str::to_string).collect()))
}

fn split_line(line: &str) -> impl Iterator<Item = &str> {
    line.trim_end_matches(['\n', '\r']).split('\t')
}

/// Types one cell: empty is null, then bool, integer, float, and anything
/// else is a string.
pub fn infer_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match cell {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = cell.parse::<f64>() {
        if x.is_finite() {
            return Value::Float(x);
        }
    }
    Value::Str(cell.to_string())
}

/// A [`ReadStream`] of rows parsed from a tab-separated body.
pub struct TsvReadStream<R> {
    src: R,
    columns: Rc<[String]>,
    line: String,
    /// Line number of the last line read, header included.
    line_no: u64,
    outlet: Outlet<Row>,
}

impl<R: BufRead> TsvReadStream<R> {
    /// `src` is positioned just after the header.
    pub fn new(src: R, columns: Rc<[String]>) -> Self {
        Self {
            src,
            columns,
            line: String::new(),
            line_no: 1,
            outlet: Outlet::new(),
        }
    }

    fn parse(&self) -> Result<Row, StreamError> {
        let cells: Vec<&str> = split_line(&self.line).collect();
        if cells.len() != self.columns.len() {
            return Err(StreamError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "line {}: expected {} cells, found {}",
                    self.line_no,
                    self.columns.len(),
                    cells.len()
                ),
            )));
        }
        Ok(self
            .columns
            .iter()
            .zip(cells)
            .map(|(name, cell)| (name.as_str(), infer_value(cell)))
            .collect())
    }
}

impl<R: BufRead> ReadStream<Row> for TsvReadStream<R> {
    fn set_handlers(&mut self, handlers: Handlers<Row>) {
        self.outlet.set_handlers(handlers);
    }

    fn demand(&self) -> DemandHandle {
        self.outlet.demand()
    }

    fn drive(&mut self) {
        while self.outlet.ready() {
            // A partial line left by `WouldBlock` is completed by this read.
            match self.src.read_line(&mut self.line) {
                Ok(0) if self.line.is_empty() => {
                    self.outlet.end();
                    return;
                }
                Ok(_) => {
                    self.line_no += 1;
                    let parsed = if self.line.trim_end_matches(['\n', '\r']).is_empty() {
                        None
                    } else {
                        Some(self.parse())
                    };
                    self.line.clear();
                    match parsed {
                        None => {}
                        Some(Ok(row)) => self.outlet.emit(row),
                        Some(Err(e)) => {
                            self.outlet.fail(e);
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    self.outlet.fail(e.into());
                    return;
                }
            }
        }
    }

    fn is_terminated(&self) -> bool {
        self.outlet.is_terminated()
    }
}
