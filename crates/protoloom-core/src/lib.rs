//! # protoloom-core
//!
//! A descriptor-driven runtime for the Protocol Buffers binary wire format.
//!
//! Message types are not generated code: they are described at runtime by a
//! [`DescriptorGraph`] built from a compiled `FileDescriptorSet`, and every
//! message is read and written through that schema.
//!
//! This crate provides:
//! - A bit-exact wire codec with size and recursion guards
//! - A linked, immutable descriptor graph with scoped name resolution
//! - Immutable messages and mutable builders with typed and reflective access
//! - Extension resolution through an explicit registry
//! - Streams of length-prefixed messages
//!
//! ## Architecture
//!
//! - [`wire`]: varints, tags, and the guarded [`WireReader`] / [`WireWriter`]
//! - [`descriptor`]: files, messages, fields, enums, and extensions
//! - [`message`]: [`Message`], [`MessageBuilder`], parsing and serialization
//! - [`extension`]: the [`ExtensionRegistry`] consulted while parsing
//! - [`stream`]: [`MessageStreamReader`], [`MessageStreamWriter`], [`MessageStream`]
//! - [`text`]: text format output
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protoloom_core::{DescriptorGraph, Message, MessageBuilder, ReflectMessage, Value};
//! use std::fs;
//!
//! // A set produced by `protoc --descriptor_set_out --include_imports`
//! let graph = DescriptorGraph::decode(&fs::read("schema.bin")?)?;
//! let person = graph.get_message_by_name("tutorial.Person").unwrap();
//! let name = person.find_field_by_name("name").unwrap();
//!
//! let mut builder = MessageBuilder::new(&person);
//! builder.set(&name, Value::from("Ada"))?;
//! let bytes = builder.build()?.encode_to_vec()?;
//!
//! let parsed = Message::decode(&person, &bytes)?;
//! assert_eq!(parsed.get(&name), Value::from("Ada"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Runtime modes
//!
//! [`RuntimeMode::Full`] keeps unrecognized fields and writes them back out
//! unchanged; [`RuntimeMode::Lite`] drops them while parsing.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod descriptor;
pub mod error;
pub mod extension;
pub mod message;
pub mod stream;
pub mod text;
pub mod value;
pub mod wire;

#[cfg(test)]
mod fixtures;

// Re-export primary types for convenience
pub use descriptor::{
    DescriptorGraph, EnumDescriptor, EnumValueDescriptor, FieldCategory, FieldDescriptor,
    FieldType, FileDescriptor, Label, MessageDescriptor, Syntax,
};
pub use error::{Error, Result};
pub use extension::ExtensionRegistry;
pub use message::{
    DecodeOptions, Message, MessageBuilder, ReflectMessage, RuntimeMode, TypedField,
    UnknownField, UnknownFieldSet,
};
pub use stream::{MessageStream, MessageStreamReader, MessageStreamWriter};
pub use text::to_text;
pub use value::{ProtoValue, Value};
pub use wire::{WireReader, WireType, WireWriter, MAX_FIELD_NUMBER};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
