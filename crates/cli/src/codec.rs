//! Binary row codec for spill files.
//!
//! Rows of one table share a header, so only the values are written, in
//! column order:
//!
//! ```text
//! [tag: u8][payload] [tag: u8][payload] ...
//!
//! tag & 0x80  -> null, no payload
//! Bool        -> u8
//! Int         -> i64 BE      Float    -> f64 BE
//! Str         -> u32 BE len + UTF-8 bytes
//! Date        -> i32 BE      DateTime -> i64 BE      Time -> i64 BE
//! ```
use std::rc::Rc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use engine::Codec;
use ordering::{Row, Value, ValueKind};
use stream::BoxError;

pub const NULL_FLAG: u8 = 0x80;

pub fn row_codec(columns: Rc<[String]>) -> Codec<Row> {
    let names = Rc::clone(&columns);
    Codec::new(
        move |row: &Row, out: &mut Vec<u8>| encode_row(&names, row, out),
        move |bytes: &[u8]| decode_row(&columns, bytes),
        Row::approx_size,
    )
}

pub fn encode_row(columns: &[String], row: &Row, out: &mut Vec<u8>) -> Result<(), BoxError> {
    for name in columns {
        encode_value(row.get(name).unwrap_or(&Value::Null), out)?;
    }
    Ok(())
}

fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<(), BoxError> {
    if value.is_null() {
        out.write_u8(NULL_FLAG | ValueKind::Null.tag())?;
        return Ok(());
    }
    out.write_u8(value.kind().tag())?;
    match value {
        Value::Null => {}
        Value::Bool(b) => out.write_u8(u8::from(*b))?,
        Value::Int(i) => out.write_i64::<BigEndian>(*i)?,
        Value::Float(x) => out.write_f64::<BigEndian>(*x)?,
        Value::Str(s) => {
            let len = u32::try_from(s.len())?;
            out.write_u32::<BigEndian>(len)?;
            out.extend_from_slice(s.as_bytes());
        }
        Value::Date(d) => out.write_i32::<BigEndian>(*d)?,
        Value::DateTime(t) => out.write_i64::<BigEndian>(*t)?,
        Value::Time(t) => out.write_i64::<BigEndian>(*t)?,
    }
    Ok(())
}

pub fn decode_row(columns: &[String], mut bytes: &[u8]) -> Result<Row, BoxError> {
    let mut row = Row::with_capacity(columns.len());
    for name in columns {
        let value = decode_value(&mut bytes)?;
        row.push(name.as_str(), value);
    }
    if !bytes.is_empty() {
        return Err(format!("{} trailing bytes after row", bytes.len()).into());
    }
    Ok(row)
}

fn decode_value(bytes: &mut &[u8]) -> Result<Value, BoxError> {
    let tag = bytes.read_u8()?;
    if tag & NULL_FLAG != 0 {
        return Ok(Value::Null);
    }
    let kind = ValueKind::from_tag(tag).ok_or_else(|| format!("unknown value tag {tag}"))?;
    let value = match kind {
        ValueKind::Null => Value::Null,
        ValueKind::Bool => Value::Bool(bytes.read_u8()? != 0),
        ValueKind::Int => Value::Int(bytes.read_i64::<BigEndian>()?),
        ValueKind::Float => Value::Float(bytes.read_f64::<BigEndian>()?),
        ValueKind::Str => {
            let len = bytes.read_u32::<BigEndian>()? as usize;
            if len > bytes.len() {
                return Err(format!(
                    "string of {len} bytes overruns row ({} bytes left)",
                    bytes.len()
                )
                .into());
            }
            let payload: &[u8] = *bytes;
            let (text, rest) = payload.split_at(len);
            *bytes = rest;
            Value::Str(std::str::from_utf8(text)?.to_string())
        }
        ValueKind::Date => Value::Date(bytes.read_i32::<BigEndian>()?),
        ValueKind::DateTime => Value::DateTime(bytes.read_i64::<BigEndian>()?),
        ValueKind::Time => Value::Time(bytes.read_i64::<BigEndian>()?),
    };
    Ok(value)
}
