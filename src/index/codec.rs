//! Binary codecs for keys and values.
//!
//! All built-in codecs write big-endian integers. Variable-length codecs
//! prefix the payload with its length.

use std::io::{Read, Write};

use crate::common::{Error, Result};

/// Encodes and decodes one type against a byte stream.
///
/// The size hooks let the B+tree work out a node's encoded size without
/// encoding it: a codec either has a [`fixed_size`](Self::fixed_size), or
/// supports [`estimated_size`](Self::estimated_size), or neither.
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T, out: &mut dyn Write) -> Result<()>;

    fn decode(&self, input: &mut dyn Read) -> Result<T>;

    /// Encoded size shared by every value, if there is one.
    fn fixed_size(&self) -> Option<usize> {
        None
    }

    fn is_estimated_size_supported(&self) -> bool {
        false
    }

    /// Encoded size of `value`. Only meaningful when
    /// [`is_estimated_size_supported`](Self::is_estimated_size_supported)
    /// or [`fixed_size`](Self::fixed_size) says so.
    fn estimated_size(&self, _value: &T) -> usize {
        self.fixed_size().unwrap_or(0)
    }
}

fn read_array<const N: usize>(input: &mut dyn Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    input
        .read_exact(&mut buf)
        .map_err(|e| Error::from(e).eof_as_corruption("encoded value"))?;
    Ok(buf)
}

/// Read exactly `len` bytes. The buffer grows with what the input actually
/// holds, so a corrupt length cannot force a large allocation.
fn read_bytes(input: &mut dyn Read, len: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    Read::take(&mut *input, len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(Error::corruption(format!(
            "encoded value ends early: expected {len} bytes, found {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// `u32` as 4 big-endian bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct U32Codec;

impl Codec<u32> for U32Codec {
    fn encode(&self, value: &u32, out: &mut dyn Write) -> Result<()> {
        out.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn decode(&self, input: &mut dyn Read) -> Result<u32> {
        Ok(u32::from_be_bytes(read_array(input)?))
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(4)
    }
}

/// `i64` as 8 big-endian bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct I64Codec;

impl Codec<i64> for I64Codec {
    fn encode(&self, value: &i64, out: &mut dyn Write) -> Result<()> {
        out.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn decode(&self, input: &mut dyn Read) -> Result<i64> {
        Ok(i64::from_be_bytes(read_array(input)?))
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(8)
    }
}

/// `u64` as 8 big-endian bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct U64Codec;

impl Codec<u64> for U64Codec {
    fn encode(&self, value: &u64, out: &mut dyn Write) -> Result<()> {
        out.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn decode(&self, input: &mut dyn Read) -> Result<u64> {
        Ok(u64::from_be_bytes(read_array(input)?))
    }

    fn fixed_size(&self) -> Option<usize> {
        Some(8)
    }
}

/// UTF-8 string behind a `u16` byte length.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, value: &String, out: &mut dyn Write) -> Result<()> {
        let len = u16::try_from(value.len()).map_err(|_| {
            Error::invalid_argument(format!("string of {} bytes is too long", value.len()))
        })?;
        out.write_all(&len.to_be_bytes())?;
        out.write_all(value.as_bytes())?;
        Ok(())
    }

    fn decode(&self, input: &mut dyn Read) -> Result<String> {
        let len = u16::from_be_bytes(read_array(input)?) as usize;
        let bytes = read_bytes(input, len)?;
        String::from_utf8(bytes).map_err(|e| Error::corruption(format!("invalid UTF-8 key: {e}")))
    }

    fn is_estimated_size_supported(&self) -> bool {
        true
    }

    fn estimated_size(&self, value: &String) -> usize {
        2 + value.len()
    }
}

/// Byte buffer behind an `i32` length.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>, out: &mut dyn Write) -> Result<()> {
        let len = i32::try_from(value.len()).map_err(|_| {
            Error::invalid_argument(format!("buffer of {} bytes is too long", value.len()))
        })?;
        out.write_all(&len.to_be_bytes())?;
        out.write_all(value)?;
        Ok(())
    }

    fn decode(&self, input: &mut dyn Read) -> Result<Vec<u8>> {
        let len = i32::from_be_bytes(read_array(input)?);
        if len < 0 {
            return Err(Error::corruption(format!("negative buffer length {len}")));
        }
        read_bytes(input, len as usize)
    }

    fn is_estimated_size_supported(&self) -> bool {
        true
    }

    fn estimated_size(&self, value: &Vec<u8>) -> usize {
        4 + value.len()
    }
}
