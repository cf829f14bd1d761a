//! Fortran unformatted sequential records.
//!
//! ```text
//! [i32 n] [n bytes payload] [i32 n]
//! ```
//!
//! The payload width per element is not stored anywhere; it follows from
//! `n / count` once the caller says how many values the record holds.

use log::trace;

use super::record::{ByteCursor, ByteSink, Endian};
use crate::error::DecodeError;

/// Reads consecutive records from a byte stream.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    cursor: ByteCursor<'a>,
    endian: Endian,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8], endian: Endian) -> Self {
        Self {
            cursor: ByteCursor::new(bytes),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor.is_empty()
    }

    /// Peek at the leading marker of the next record without consuming it.
    pub fn peek_marker(&self) -> Result<i32, DecodeError> {
        let mut ahead = self.cursor.clone();
        ahead.read::<i32>(self.endian)
    }

    /// Read one complete record and return its payload.
    pub fn next_record(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.cursor.clone();
        let result = self.read_framed();
        if result.is_err() {
            self.cursor = start;
        }
        result
    }

    fn read_framed(&mut self) -> Result<&'a [u8], DecodeError> {
        let marker = self.cursor.read::<i32>(self.endian)?;
        if marker < 0 {
            return Err(DecodeError::StructuralCountMismatch {
                context: "record length marker",
                declared: i64::from(marker),
                found: 0,
            });
        }
        let payload = self.cursor.take(marker as usize)?;
        let trailer = self.cursor.read::<i32>(self.endian)?;
        if trailer != marker {
            return Err(DecodeError::StructuralCountMismatch {
                context: "record trailing marker",
                declared: i64::from(marker),
                found: i64::from(trailer),
            });
        }
        trace!(
            "record of {marker} bytes ending at offset {}",
            self.cursor.position()
        );
        Ok(payload)
    }

    /// Read a record holding exactly `count` integers of `width` bytes.
    pub fn read_integers(&mut self, count: usize, width: usize) -> Result<Vec<i64>, DecodeError> {
        let payload = self.next_record()?;
        if payload.len() != count * width {
            return Err(DecodeError::StructuralCountMismatch {
                context: "integer record length",
                declared: (count * width) as i64,
                found: payload.len() as i64,
            });
        }
        let mut cursor = ByteCursor::new(payload);
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let value = match width {
                4 => i64::from(cursor.read::<i32>(self.endian)?),
                _ => cursor.read::<i64>(self.endian)?,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Read a record of `count` reals and append them to `out`.
    ///
    /// Single and double precision are told apart by the record length.
    pub fn read_reals_into(&mut self, count: usize, out: &mut Vec<f64>) -> Result<(), DecodeError> {
        let payload = self.next_record()?;
        let width = match count {
            0 if payload.is_empty() => 8,
            0 => 0,
            n if payload.len() == 4 * n => 4,
            n if payload.len() == 8 * n => 8,
            _ => 0,
        };
        if width == 0 {
            return Err(DecodeError::StructuralCountMismatch {
                context: "real record length",
                declared: count as i64,
                found: payload.len() as i64,
            });
        }
        let mut cursor = ByteCursor::new(payload);
        out.reserve(count);
        for _ in 0..count {
            let value = if width == 4 {
                f64::from(cursor.read::<f32>(self.endian)?)
            } else {
                cursor.read::<f64>(self.endian)?
            };
            out.push(value);
        }
        Ok(())
    }

    pub fn read_reals(&mut self, count: usize) -> Result<Vec<f64>, DecodeError> {
        let mut values = Vec::new();
        self.read_reals_into(count, &mut values)?;
        Ok(values)
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Builds a record stream; used by fixtures and the sample generator.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    sink: ByteSink,
}

impl RecordWriter {
    pub fn new(endian: Endian) -> Self {
        Self {
            sink: ByteSink::new(endian),
        }
    }

    /// Frame an already encoded payload.
    pub fn raw(&mut self, payload: &[u8]) -> &mut Self {
        let marker = payload.len() as i32;
        self.sink.put(marker).put_bytes(payload).put(marker);
        self
    }

    pub fn ints32(&mut self, values: &[i32]) -> &mut Self {
        let mut body = ByteSink::new(self.sink.endian());
        for &v in values {
            body.put(v);
        }
        self.raw(&body.into_bytes())
    }

    pub fn ints64(&mut self, values: &[i64]) -> &mut Self {
        let mut body = ByteSink::new(self.sink.endian());
        for &v in values {
            body.put(v);
        }
        self.raw(&body.into_bytes())
    }

    pub fn reals(&mut self, values: &[f64]) -> &mut Self {
        let mut body = ByteSink::new(self.sink.endian());
        for &v in values {
            body.put(v);
        }
        self.raw(&body.into_bytes())
    }

    pub fn reals32(&mut self, values: &[f32]) -> &mut Self {
        let mut body = ByteSink::new(self.sink.endian());
        for &v in values {
            body.put(v);
        }
        self.raw(&body.into_bytes())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.sink.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_framed_integers_and_reals() {
        let mut w = RecordWriter::new(Endian::Little);
        w.ints32(&[3, 7]).reals(&[1.5, -2.0]).reals32(&[0.25]);
        let bytes = w.into_bytes();

        let mut r = RecordReader::new(&bytes, Endian::Little);
        assert_eq!(r.read_integers(2, 4).unwrap(), vec![3, 7]);
        assert_eq!(r.read_reals(2).unwrap(), vec![1.5, -2.0]);
        assert_eq!(r.read_reals(1).unwrap(), vec![0.25]);
        assert!(r.is_at_end());
    }

    #[test]
    fn big_endian_streams() {
        let mut w = RecordWriter::new(Endian::Big);
        w.ints64(&[42]);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..4], &[0, 0, 0, 8]);

        let mut r = RecordReader::new(&bytes, Endian::Big);
        assert_eq!(r.read_integers(1, 8).unwrap(), vec![42]);
    }

    #[test]
    fn trailer_must_match_leader() {
        let mut sink = ByteSink::new(Endian::Little);
        sink.put(4i32).put(1i32).put(8i32);
        let bytes = sink.into_bytes();

        let mut r = RecordReader::new(&bytes, Endian::Little);
        assert!(matches!(
            r.next_record(),
            Err(DecodeError::StructuralCountMismatch {
                context: "record trailing marker",
                declared: 4,
                found: 8
            })
        ));
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn record_length_must_fit_the_element_count() {
        let mut w = RecordWriter::new(Endian::Little);
        w.reals(&[1.0, 2.0, 3.0]);
        let bytes = w.into_bytes();

        let mut r = RecordReader::new(&bytes, Endian::Little);
        assert!(matches!(
            r.read_reals(2),
            Err(DecodeError::StructuralCountMismatch { .. })
        ));
    }

    #[test]
    fn truncated_payload_is_end_of_stream() {
        let mut w = RecordWriter::new(Endian::Little);
        w.reals(&[1.0, 2.0]);
        let mut bytes = w.into_bytes();
        bytes.truncate(bytes.len() - 6);

        let mut r = RecordReader::new(&bytes, Endian::Little);
        assert!(matches!(
            r.next_record(),
            Err(DecodeError::UnexpectedEndOfStream { .. })
        ));
    }
}
