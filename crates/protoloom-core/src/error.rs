//! Error types for the protoloom-core library.
//!
//! Decode-time failures abort the message being parsed; schema-time failures
//! (`UnresolvedType`, `DuplicateSymbol`, `InvalidDescriptor`) abort graph
//! construction. Unrecognized field numbers are never errors.

use thiserror::Error;

/// Result type alias for protoloom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all protoloom operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A varint ran past 10 bytes or the input ended before its final byte
    #[error("malformed varint at offset {offset}")]
    MalformedVarint {
        /// Byte offset where the varint started
        offset: u64,
    },

    /// Field number outside `1..=2^29-1` or inside the reserved range
    #[error("invalid field number {number}")]
    InvalidFieldNumber {
        /// The rejected field number
        number: i64,
    },

    /// Tag carried a wire type the format does not define
    #[error("invalid wire type {value} at offset {offset}")]
    InvalidWireType {
        /// The raw 3-bit wire type
        value: u8,
        /// Byte offset of the tag
        offset: u64,
    },

    /// Input ended inside a field or a length-delimited region
    #[error("truncated message at offset {offset}")]
    TruncatedMessage {
        /// Byte offset where more input was required
        offset: u64,
    },

    /// Raw bytes for an unknown field hold more than one encoded value
    #[error("raw value of field {number} is followed by {extra} stray bytes")]
    TrailingBytes {
        /// Field number of the unknown field
        number: i32,
        /// Bytes left after the first complete value
        extra: usize,
    },

    /// Bytes consumed since the size guard was armed exceed the limit
    #[error("message exceeds size limit of {limit} bytes")]
    SizeLimitExceeded {
        /// The configured limit
        limit: u64,
    },

    /// Nested message depth exceeds the limit
    #[error("message nesting exceeds recursion limit of {limit}")]
    RecursionLimitExceeded {
        /// The configured limit
        limit: u32,
    },

    /// A string field did not contain valid UTF-8
    #[error("invalid UTF-8 in string field '{field}'")]
    InvalidUtf8 {
        /// Full name of the field
        field: String,
    },

    /// Required fields were missing at build time
    #[error("message '{message}' is missing required fields: {}", missing.join(", "))]
    StructuralValidity {
        /// Full name of the message type being built
        message: String,
        /// Dotted paths of the missing fields
        missing: Vec<String>,
    },

    /// A type reference could not be resolved while linking descriptors
    #[error("unresolved type '{name}' referenced from '{referrer}'")]
    UnresolvedType {
        /// The name as written in the referring descriptor
        name: String,
        /// Full name of the referring element
        referrer: String,
    },

    /// Two descriptors share a fully-qualified name
    #[error("duplicate symbol '{name}'")]
    DuplicateSymbol {
        /// The duplicated name
        name: String,
    },

    /// Descriptor data is structurally invalid
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// A reflective value does not match the field's declared type
    #[error("type mismatch for field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Full name of the field
        field: String,
        /// What the field accepts
        expected: String,
        /// What was supplied
        found: String,
    },

    /// Indexed access past the end of a repeated field
    #[error("index {index} out of range for field '{field}' with {len} elements")]
    IndexOutOfRange {
        /// Full name of the field
        field: String,
        /// Requested index
        index: usize,
        /// Current element count
        len: usize,
    },

    /// An extension was used on a message type it does not extend
    #[error("extension '{extension}' does not extend '{message}'")]
    ExtensionMismatch {
        /// Full name of the extension
        extension: String,
        /// Full name of the message it was used on
        message: String,
    },

    /// Failed to parse an encoded FileDescriptorSet
    #[error("failed to parse descriptor set: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// The underlying byte source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new malformed varint error
    pub fn malformed_varint(offset: u64) -> Self {
        Self::MalformedVarint { offset }
    }

    /// Creates a new invalid field number error
    pub fn invalid_field_number(number: impl Into<i64>) -> Self {
        Self::InvalidFieldNumber {
            number: number.into(),
        }
    }

    /// Creates a new truncated message error
    pub fn truncated(offset: u64) -> Self {
        Self::TruncatedMessage { offset }
    }

    /// Creates a new unresolved type error
    pub fn unresolved_type(name: impl Into<String>, referrer: impl Into<String>) -> Self {
        Self::UnresolvedType {
            name: name.into(),
            referrer: referrer.into(),
        }
    }

    /// Creates a new invalid descriptor error
    pub fn invalid_descriptor(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }

    /// Creates a new type mismatch error
    pub fn type_mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Returns true if this error was raised while decoding wire data
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedVarint { .. }
                | Self::InvalidFieldNumber { .. }
                | Self::InvalidWireType { .. }
                | Self::TruncatedMessage { .. }
                | Self::SizeLimitExceeded { .. }
                | Self::RecursionLimitExceeded { .. }
                | Self::InvalidUtf8 { .. }
                | Self::TrailingBytes { .. }
                | Self::Io(_)
        )
    }
}
