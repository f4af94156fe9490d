//! Buffered wire reader with size and recursion guards.

use super::{decode_varint, split_tag, WireType, MAX_VARINT_LEN};
use crate::error::{Error, Result};
use bytes::Bytes;
use std::io::{ErrorKind, Read};
use tracing::trace;

/// Default cap on bytes consumed between two re-arms of the size guard (64 MiB)
pub const DEFAULT_SIZE_LIMIT: u64 = 64 << 20;

/// Default cap on nested message depth
pub const DEFAULT_RECURSION_LIMIT: u32 = 64;

/// Default refill chunk size
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Reads tags and payloads from a byte source.
///
/// Two guards bound the work done on untrusted input:
///
/// - the size guard counts bytes consumed since it was last armed
///   ([`reset_size_counter`](Self::reset_size_counter)); refilling the
///   internal buffer never touches it
/// - the recursion guard counts nested sub-messages and groups
///
/// Length-delimited regions are tracked with [`push_limit`](Self::push_limit)
/// / [`pop_limit`](Self::pop_limit); reading past the innermost limit is a
/// `TruncatedMessage` error.
#[derive(Debug)]
pub struct WireReader<R> {
    source: R,
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
    /// Bytes discarded from the front of `buf` so far
    retired: u64,
    source_done: bool,
    buffer_size: usize,
    limit: Option<u64>,
    size_limit: u64,
    size_base: u64,
    depth: u32,
    recursion_limit: u32,
}

impl<'a> WireReader<&'a [u8]> {
    /// Creates a reader over an in-memory buffer
    pub fn from_slice(data: &'a [u8]) -> Self {
        let buffer_size = data.len().clamp(1, DEFAULT_BUFFER_SIZE);
        Self::with_buffer_size(data, buffer_size)
    }
}

impl<R: Read> WireReader<R> {
    /// Creates a reader with default limits and buffer size
    pub fn new(source: R) -> Self {
        Self::with_buffer_size(source, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a reader that refills in chunks of `buffer_size` bytes
    pub fn with_buffer_size(source: R, buffer_size: usize) -> Self {
        Self {
            source,
            buf: Vec::new(),
            pos: 0,
            filled: 0,
            retired: 0,
            source_done: false,
            buffer_size: buffer_size.max(1),
            limit: None,
            size_limit: DEFAULT_SIZE_LIMIT,
            size_base: 0,
            depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Sets the size limit, returning the previous one
    pub fn set_size_limit(&mut self, limit: u64) -> u64 {
        std::mem::replace(&mut self.size_limit, limit)
    }

    /// Sets the recursion limit, returning the previous one
    pub fn set_recursion_limit(&mut self, limit: u32) -> u32 {
        std::mem::replace(&mut self.recursion_limit, limit)
    }

    /// Returns the configured size limit
    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// Returns the configured recursion limit
    pub fn recursion_limit(&self) -> u32 {
        self.recursion_limit
    }

    /// Re-arms the size guard at the current position.
    ///
    /// Call this at every independent message boundary.
    pub fn reset_size_counter(&mut self) {
        self.size_base = self.position();
    }

    /// Absolute number of bytes consumed from the source
    pub fn position(&self) -> u64 {
        self.retired + self.pos as u64
    }

    /// Bytes consumed since the size guard was last armed
    pub fn bytes_since_reset(&self) -> u64 {
        self.position() - self.size_base
    }

    /// Current nesting depth
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the underlying source
    pub fn into_inner(self) -> R {
        self.source
    }

    /// True at the end of the innermost limit or of the whole source
    pub fn is_at_end(&mut self) -> Result<bool> {
        let position = self.position();
        if self.limit == Some(position) {
            return Ok(true);
        }
        if self.pos < self.filled {
            return Ok(false);
        }
        self.compact();
        if self.read_more()? {
            return Ok(false);
        }
        // The source ran dry inside a length-delimited region
        match self.limit {
            Some(_) => Err(Error::truncated(position)),
            None => Ok(true),
        }
    }

    /// Reads the next tag, or `None` at the end of the current region.
    ///
    /// The tag is validated before it is consumed, so an invalid field number
    /// leaves the reader where it was.
    pub fn read_tag(&mut self) -> Result<Option<(i32, WireType)>> {
        if self.is_at_end()? {
            return Ok(None);
        }
        let offset = self.position();
        let (tag, len) = self.peek_varint()?;
        let (number, wire_type) = split_tag(tag).map_err(|e| match e {
            Error::InvalidWireType { value, .. } => Error::InvalidWireType { value, offset },
            other => other,
        })?;
        self.advance(len)?;
        Ok(Some((number, wire_type)))
    }

    /// Reads a raw varint
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = self.peek_varint()?;
        self.advance(len)?;
        Ok(value)
    }

    /// Reads a little-endian 32-bit value
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    /// Reads a little-endian 64-bit value
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a varint byte count and checks that the region fits the guards
    pub fn read_length(&mut self) -> Result<u64> {
        let offset = self.position();
        let len = self.read_varint()?;
        self.check_span(len)
            .map_err(|e| match e {
                Error::TruncatedMessage { .. } => Error::truncated(offset),
                other => other,
            })?;
        Ok(len)
    }

    /// Reads a length-delimited payload
    pub fn read_length_delimited(&mut self) -> Result<Bytes> {
        let len = self.read_length()?;
        self.read_bytes(len as usize)
    }

    /// Reads exactly `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }

    /// Restricts reading to the next `len` bytes; returns the previous limit
    pub fn push_limit(&mut self, len: u64) -> Result<Option<u64>> {
        self.check_span(len)?;
        let new_limit = self.position() + len;
        Ok(self.limit.replace(new_limit))
    }

    /// Restores a limit returned by [`push_limit`](Self::push_limit)
    pub fn pop_limit(&mut self, previous: Option<u64>) {
        self.limit = previous;
    }

    /// Enters a nested message or group
    pub fn enter_nested(&mut self) -> Result<()> {
        if self.depth >= self.recursion_limit {
            return Err(Error::RecursionLimitExceeded {
                limit: self.recursion_limit,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Leaves a nested message or group
    pub fn exit_nested(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Skips the value of a field whose tag was just read
    pub fn skip_field(&mut self, number: i32, wire_type: WireType) -> Result<()> {
        self.read_raw_value(number, wire_type).map(|_| ())
    }

    /// Reads the value of a field whose tag was just read, exactly as encoded.
    ///
    /// For `Len` the bytes include the length prefix; for `StartGroup` they
    /// run through the matching end-group tag.
    pub fn read_raw_value(&mut self, number: i32, wire_type: WireType) -> Result<Bytes> {
        let mut raw = Vec::new();
        self.copy_raw_value(number, wire_type, &mut raw)?;
        Ok(Bytes::from(raw))
    }

    fn copy_raw_value(&mut self, number: i32, wire_type: WireType, out: &mut Vec<u8>) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                let (_, len) = self.peek_varint()?;
                out.extend_from_slice(self.take(len)?);
            }
            WireType::I64 => out.extend_from_slice(self.take(8)?),
            WireType::I32 => out.extend_from_slice(self.take(4)?),
            WireType::Len => {
                let (_, prefix_len) = self.peek_varint()?;
                out.extend_from_slice(self.peek(prefix_len)?);
                let len = self.read_length()? as usize;
                out.extend_from_slice(self.take(len)?);
            }
            WireType::StartGroup => {
                self.enter_nested()?;
                loop {
                    let offset = self.position();
                    let (tag, tag_len) = self.peek_varint()?;
                    let (inner, inner_type) = split_tag(tag)?;
                    out.extend_from_slice(self.take(tag_len)?);
                    if inner_type == WireType::EndGroup {
                        if inner != number {
                            return Err(Error::InvalidWireType { value: 4, offset });
                        }
                        break;
                    }
                    self.copy_raw_value(inner, inner_type, out)?;
                }
                self.exit_nested();
            }
            WireType::EndGroup => {
                return Err(Error::InvalidWireType {
                    value: 4,
                    offset: self.position(),
                });
            }
        }
        Ok(())
    }

    /// Checks that `len` more bytes fit both the current limit and the size guard
    fn check_span(&self, len: u64) -> Result<()> {
        let end = self.position().saturating_add(len);
        if let Some(limit) = self.limit {
            if end > limit {
                return Err(Error::truncated(limit));
            }
        }
        if end - self.size_base > self.size_limit {
            return Err(Error::SizeLimitExceeded {
                limit: self.size_limit,
            });
        }
        Ok(())
    }

    fn peek_varint(&mut self) -> Result<(u64, usize)> {
        loop {
            let available = self.filled - self.pos;
            match decode_varint(&self.buf[self.pos..self.filled]) {
                Ok(decoded) => return Ok(decoded),
                Err(_) if available < MAX_VARINT_LEN && !self.source_done => {
                    self.compact();
                    self.read_more()?;
                }
                Err(_) if available == 0 => return Err(Error::truncated(self.position())),
                Err(_) => return Err(Error::malformed_varint(self.position())),
            }
        }
    }

    fn peek(&mut self, len: usize) -> Result<&[u8]> {
        self.check_span(len as u64)?;
        self.ensure(len)?;
        Ok(&self.buf[self.pos..self.pos + len])
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        self.check_span(len as u64)?;
        self.ensure(len)?;
        let start = self.pos;
        self.pos += len;
        Ok(&self.buf[start..start + len])
    }

    fn advance(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    fn ensure(&mut self, len: usize) -> Result<()> {
        if self.filled - self.pos >= len {
            return Ok(());
        }
        self.compact();
        while self.filled < len {
            // Grow only as bytes arrive, so a corrupt length cannot force a large allocation
            if self.filled == self.buf.len() {
                let step = (len - self.filled).min(self.buf.len().max(self.buffer_size));
                self.buf.resize(self.filled + step, 0);
            }
            if !self.read_more()? {
                return Err(Error::truncated(self.retired + self.filled as u64));
            }
        }
        Ok(())
    }

    /// Moves unread bytes to the front of the buffer
    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.buf.copy_within(self.pos..self.filled, 0);
        self.filled -= self.pos;
        self.retired += self.pos as u64;
        self.pos = 0;
    }

    /// Pulls one chunk from the source; false once it is exhausted
    fn read_more(&mut self) -> Result<bool> {
        if self.source_done {
            return Ok(false);
        }
        if self.filled == self.buf.len() {
            self.buf.resize(self.filled + self.buffer_size, 0);
        }
        loop {
            match self.source.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    self.source_done = true;
                    return Ok(false);
                }
                Ok(n) => {
                    trace!("refilled {} bytes at offset {}", n, self.retired + self.filled as u64);
                    self.filled += n;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A source that hands out at most `chunk` bytes per read
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_read_tag_and_varint() {
        // Field 1, varint 150
        let data = [0x08, 0x96, 0x01];
        let mut reader = WireReader::from_slice(&data);
        assert_eq!(reader.read_tag().unwrap(), Some((1, WireType::Varint)));
        assert_eq!(reader.read_varint().unwrap(), 150);
        assert_eq!(reader.read_tag().unwrap(), None);
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn test_fixed_values() {
        let data = [0x0D, 0x01, 0x02, 0x03, 0x04, 0x11, 1, 0, 0, 0, 0, 0, 0, 0x80];
        let mut reader = WireReader::from_slice(&data);
        assert_eq!(reader.read_tag().unwrap(), Some((1, WireType::I32)));
        assert_eq!(reader.read_fixed32().unwrap(), 0x0403_0201);
        assert_eq!(reader.read_tag().unwrap(), Some((2, WireType::I64)));
        assert_eq!(reader.read_fixed64().unwrap(), 0x8000_0000_0000_0001);
    }

    #[test]
    fn test_field_number_zero_consumes_nothing() {
        let data = [0x00, 0x01];
        let mut reader = WireReader::from_slice(&data);
        assert!(matches!(
            reader.read_tag(),
            Err(Error::InvalidFieldNumber { number: 0 })
        ));
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_length_delimited() {
        let data = [0x0A, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut reader = WireReader::from_slice(&data);
        assert_eq!(reader.read_tag().unwrap(), Some((1, WireType::Len)));
        assert_eq!(&reader.read_length_delimited().unwrap()[..], b"hello");
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn test_truncated_length_delimited() {
        let data = [0x0A, 0x05, b'h', b'e'];
        let mut reader = WireReader::from_slice(&data);
        reader.read_tag().unwrap();
        assert!(matches!(
            reader.read_length_delimited(),
            Err(Error::TruncatedMessage { .. })
        ));
    }

    #[test]
    fn test_corrupt_length_allocates_only_what_arrives() {
        // Field 1 claims a 60 MiB payload that never follows
        let data = [0x0A, 0x80, 0x80, 0x80, 0x1E];

        let mut reader = WireReader::from_slice(&data);
        reader.read_tag().unwrap();
        assert!(matches!(
            reader.read_length_delimited(),
            Err(Error::TruncatedMessage { offset: 5 })
        ));
        assert!(reader.buf.len() <= data.len());

        let source = Trickle {
            data: &data,
            chunk: 2,
        };
        let mut reader = WireReader::with_buffer_size(source, 16);
        reader.read_tag().unwrap();
        assert!(matches!(
            reader.read_length_delimited(),
            Err(Error::TruncatedMessage { offset: 5 })
        ));
        assert!(reader.buf.len() <= 32);
    }

    #[test]
    fn test_push_limit_bounds_nested_reads() {
        // Outer claims 2 bytes of inner data, inner field tries to read 3
        let data = [0x08, 0x96, 0x01];
        let mut reader = WireReader::from_slice(&data);
        let previous = reader.push_limit(2).unwrap();
        assert_eq!(reader.read_tag().unwrap(), Some((1, WireType::Varint)));
        assert!(matches!(
            reader.read_varint().and_then(|_| reader.read_fixed32()),
            Err(Error::TruncatedMessage { .. })
        ));
        reader.pop_limit(previous);
    }

    #[test]
    fn test_nested_limit_cannot_exceed_outer() {
        let data = [0u8; 16];
        let mut reader = WireReader::from_slice(&data);
        reader.push_limit(4).unwrap();
        assert!(matches!(
            reader.push_limit(5),
            Err(Error::TruncatedMessage { .. })
        ));
    }

    #[test]
    fn test_size_limit_survives_refills() {
        let data = vec![0x08, 0x01].repeat(64);
        let source = Trickle {
            data: &data,
            chunk: 3,
        };
        let mut reader = WireReader::with_buffer_size(source, 4);
        reader.set_size_limit(40);
        let result: Result<()> = (|| {
            while let Some((number, wire_type)) = reader.read_tag()? {
                reader.skip_field(number, wire_type)?;
            }
            Ok(())
        })();
        assert!(matches!(
            result,
            Err(Error::SizeLimitExceeded { limit: 40 })
        ));
    }

    #[test]
    fn test_reset_size_counter_rearms_guard() {
        let data = vec![0x08, 0x01].repeat(64);
        let mut reader = WireReader::with_buffer_size(&data[..], 8);
        reader.set_size_limit(4);
        for _ in 0..64 {
            reader.reset_size_counter();
            let (number, wire_type) = reader.read_tag().unwrap().unwrap();
            reader.skip_field(number, wire_type).unwrap();
        }
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn test_large_payload_across_small_buffer() {
        let payload = vec![0xAB; 10_000];
        let mut data = vec![0x0A];
        super::super::encode_varint(payload.len() as u64, &mut data);
        data.extend_from_slice(&payload);
        let source = Trickle {
            data: &data,
            chunk: 7,
        };
        let mut reader = WireReader::with_buffer_size(source, 16);
        reader.read_tag().unwrap();
        assert_eq!(reader.read_length_delimited().unwrap().len(), 10_000);
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn test_recursion_limit() {
        let mut reader = WireReader::from_slice(&[]);
        reader.set_recursion_limit(2);
        reader.enter_nested().unwrap();
        reader.enter_nested().unwrap();
        assert!(matches!(
            reader.enter_nested(),
            Err(Error::RecursionLimitExceeded { limit: 2 })
        ));
    }

    #[test]
    fn test_raw_group_value() {
        // Group 2 containing field 1 = 5, then end group 2, then field 3 = 1
        let data = [0x13, 0x08, 0x05, 0x14, 0x18, 0x01];
        let mut reader = WireReader::from_slice(&data);
        assert_eq!(reader.read_tag().unwrap(), Some((2, WireType::StartGroup)));
        let raw = reader.read_raw_value(2, WireType::StartGroup).unwrap();
        assert_eq!(&raw[..], &[0x08, 0x05, 0x14]);
        assert_eq!(reader.read_tag().unwrap(), Some((3, WireType::Varint)));
    }

    #[test]
    fn test_mismatched_end_group() {
        let data = [0x13, 0x1C];
        let mut reader = WireReader::from_slice(&data);
        reader.read_tag().unwrap();
        assert!(reader.skip_field(2, WireType::StartGroup).is_err());
    }

    #[test]
    fn test_raw_len_value_keeps_prefix() {
        let data = [0x0A, 0x02, b'h', b'i'];
        let mut reader = WireReader::from_slice(&data);
        reader.read_tag().unwrap();
        let raw = reader.read_raw_value(1, WireType::Len).unwrap();
        assert_eq!(&raw[..], &[0x02, b'h', b'i']);
    }
}
