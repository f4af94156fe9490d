//! Wire writer over any `BufMut`.

use super::{encode_varint, make_tag, WireType};
use crate::error::Result;
use bytes::BufMut;

/// Emits tags and payloads into a growable buffer.
///
/// Tags are validated before anything is written, so a rejected field number
/// leaves the buffer untouched.
#[derive(Debug)]
pub struct WireWriter<B> {
    buf: B,
}

impl WireWriter<Vec<u8>> {
    /// Creates a writer over an empty `Vec<u8>`
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }
}

impl Default for WireWriter<Vec<u8>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BufMut> WireWriter<B> {
    /// Wraps an existing buffer
    pub fn with_buffer(buf: B) -> Self {
        Self { buf }
    }

    /// Returns the underlying buffer
    pub fn into_inner(self) -> B {
        self.buf
    }

    /// Returns a reference to the underlying buffer
    pub fn get_ref(&self) -> &B {
        &self.buf
    }

    /// Writes a field tag
    pub fn write_tag(&mut self, number: i32, wire_type: WireType) -> Result<()> {
        let tag = make_tag(number, wire_type)?;
        encode_varint(tag as u64, &mut self.buf);
        Ok(())
    }

    /// Writes a raw varint
    pub fn write_varint(&mut self, value: u64) {
        encode_varint(value, &mut self.buf);
    }

    /// Writes a little-endian 32-bit value
    pub fn write_fixed32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Writes a little-endian 64-bit value
    pub fn write_fixed64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Writes a length prefix followed by `data`
    pub fn write_length_delimited(&mut self, data: &[u8]) {
        self.write_varint(data.len() as u64);
        self.buf.put_slice(data);
    }

    /// Writes bytes verbatim
    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Writes a complete varint field
    pub fn write_varint_field(&mut self, number: i32, value: u64) -> Result<()> {
        self.write_tag(number, WireType::Varint)?;
        self.write_varint(value);
        Ok(())
    }

    /// Writes a complete length-delimited field
    pub fn write_bytes_field(&mut self, number: i32, data: &[u8]) -> Result<()> {
        self.write_tag(number, WireType::Len)?;
        self.write_length_delimited(data);
        Ok(())
    }
}
