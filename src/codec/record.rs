use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::DecodeError;

// ---------------------------------------------------------------------------
// Endianness and primitive types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// A fixed-width value that can be read from and written to a byte stream.
pub trait Primitive: Sized + Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Decode from exactly `WIDTH` bytes.
    fn decode(bytes: &[u8], endian: Endian) -> Self;

    fn encode(self, endian: Endian, out: &mut Vec<u8>);
}

macro_rules! impl_primitive {
    ($ty:ty, $width:expr, $read:ident, $write:ident) => {
        impl Primitive for $ty {
            const WIDTH: usize = $width;

            fn decode(bytes: &[u8], endian: Endian) -> Self {
                match endian {
                    Endian::Little => LittleEndian::$read(bytes),
                    Endian::Big => BigEndian::$read(bytes),
                }
            }

            fn encode(self, endian: Endian, out: &mut Vec<u8>) {
                let mut buf = [0u8; $width];
                match endian {
                    Endian::Little => LittleEndian::$write(&mut buf, self),
                    Endian::Big => BigEndian::$write(&mut buf, self),
                }
                out.extend_from_slice(&buf);
            }
        }
    };
}

impl_primitive!(i16, 2, read_i16, write_i16);
impl_primitive!(i32, 4, read_i32, write_i32);
impl_primitive!(i64, 8, read_i64, write_i64);
impl_primitive!(u16, 2, read_u16, write_u16);
impl_primitive!(u32, 4, read_u32, write_u32);
impl_primitive!(u64, 8, read_u64, write_u64);
impl_primitive!(f32, 4, read_f32, write_f32);
impl_primitive!(f64, 8, read_f64, write_f64);

// Single bytes have no byte order.
impl Primitive for u8 {
    const WIDTH: usize = 1;

    fn decode(bytes: &[u8], _endian: Endian) -> Self {
        bytes[0]
    }

    fn encode(self, _endian: Endian, out: &mut Vec<u8>) {
        out.push(self);
    }
}

impl Primitive for i8 {
    const WIDTH: usize = 1;

    fn decode(bytes: &[u8], _endian: Endian) -> Self {
        bytes[0] as i8
    }

    fn encode(self, _endian: Endian, out: &mut Vec<u8>) {
        out.push(self as u8);
    }
}

// ---------------------------------------------------------------------------
// ByteCursor – reading
// ---------------------------------------------------------------------------

/// Read position over a borrowed byte buffer.
///
/// Every read either advances by exactly the requested width or fails with
/// [`DecodeError::UnexpectedEndOfStream`] and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(DecodeError::UnexpectedEndOfStream {
                requested: n,
                remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    pub fn read<T: Primitive>(&mut self, endian: Endian) -> Result<T, DecodeError> {
        let bytes = self.take(T::WIDTH)?;
        Ok(T::decode(bytes, endian))
    }

    /// Read a fixed-length character block; trailing blanks and NULs are dropped.
    pub fn read_chars(&mut self, len: usize) -> Result<String, DecodeError> {
        let bytes = self.take(len)?;
        let text = String::from_utf8_lossy(bytes);
        Ok(text.trim_end_matches([' ', '\0']).to_string())
    }
}

// ---------------------------------------------------------------------------
// ByteSink – writing
// ---------------------------------------------------------------------------

/// Growable output buffer producing the layouts [`ByteCursor`] reads.
#[derive(Debug, Clone, Default)]
pub struct ByteSink {
    buf: Vec<u8>,
    endian: Endian,
}

impl ByteSink {
    pub fn new(endian: Endian) -> Self {
        Self {
            buf: Vec::new(),
            endian,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn put<T: Primitive>(&mut self, value: T) -> &mut Self {
        value.encode(self.endian, &mut self.buf);
        self
    }

    /// Write `text` into a block of exactly `len` bytes, blank padded or cut.
    pub fn put_chars(&mut self, text: &str, len: usize) -> &mut Self {
        let bytes = text.as_bytes();
        let n = bytes.len().min(len);
        self.buf.extend_from_slice(&bytes[..n]);
        self.buf.resize(self.buf.len() + (len - n), b' ');
        self
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
