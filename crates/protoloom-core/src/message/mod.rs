//! Descriptor-driven messages: an immutable [`Message`] and its mutable
//! [`MessageBuilder`].
//!
//! ## Storage
//!
//! Both types wrap the same field store: declared fields keyed by number,
//! extensions keyed by number (alongside their descriptor), and the unknown
//! fields preserved from parsing. A builder owns its store; `build` copies it
//! into a shared snapshot, so later builder mutation never reaches a message
//! that was already built.
//!
//! A singular field whose default is never written to the wire is never
//! stored at its default either: setting, parsing, or merging such a value
//! clears the field. Presence, equality, and serialization therefore agree.
//!
//! ## Maps
//!
//! A `map<K, V>` field is a repeated field of a synthetic entry message.
//! Adding an entry whose key is already present replaces that entry in
//! place, whether the entry arrives from the builder, the wire, or a merge.
//!
//! ## Access
//!
//! - reflective: [`ReflectMessage`] on both types, and the `set`/`add`/
//!   `set_at`/`clear` operations on the builder, all keyed by [`FieldDescriptor`]
//! - typed: [`TypedField`], a field handle checked once against a Rust type

mod decode;
mod encode;
mod typed;
mod unknown;

pub use typed::TypedField;
pub use unknown::{UnknownField, UnknownFieldSet};

use crate::descriptor::{EnumValueDescriptor, FieldDescriptor, MessageDescriptor};
use crate::error::{Error, Result};
use crate::extension::ExtensionRegistry;
use crate::value::Value;
use crate::wire::{WireReader, DEFAULT_BUFFER_SIZE, DEFAULT_RECURSION_LIMIT, DEFAULT_SIZE_LIMIT};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Arc, OnceLock};

/// How much of the input a parse keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeMode {
    /// Preserve unknown fields for lossless re-serialization
    #[default]
    Full,
    /// Discard unknown fields and unregistered extensions
    Lite,
}

/// Configuration for parsing
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Bytes a single message may consume (default: 64 MiB)
    pub size_limit: u64,
    /// Maximum nesting depth of sub-messages and groups (default: 64)
    pub recursion_limit: u32,
    /// Full or lite runtime
    pub mode: RuntimeMode,
    /// Refill chunk size for buffered sources (default: 4096)
    pub buffer_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_SIZE_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            mode: RuntimeMode::Full,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl DecodeOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size limit
    pub fn size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    /// Sets the recursion limit
    pub fn recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Sets the runtime mode
    pub fn mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `mode(RuntimeMode::Lite)`
    pub fn lite(self) -> Self {
        self.mode(RuntimeMode::Lite)
    }

    /// Sets the refill chunk size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Creates a reader over `source` configured with these options
    pub fn reader<R: Read>(&self, source: R) -> WireReader<R> {
        let mut reader = WireReader::with_buffer_size(source, self.buffer_size);
        reader.set_size_limit(self.size_limit);
        reader.set_recursion_limit(self.recursion_limit);
        reader
    }
}

/// Field values shared by builders and messages
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FieldStore {
    fields: BTreeMap<i32, Value>,
    extensions: BTreeMap<i32, (FieldDescriptor, Value)>,
    unknown: UnknownFieldSet,
}

impl FieldStore {
    fn slot(&self, field: &FieldDescriptor) -> Option<&Value> {
        if field.is_extension() {
            self.extensions.get(&field.number()).map(|(_, value)| value)
        } else {
            self.fields.get(&field.number())
        }
    }

    fn slot_mut(&mut self, field: &FieldDescriptor) -> Option<&mut Value> {
        if field.is_extension() {
            self.extensions
                .get_mut(&field.number())
                .map(|(_, value)| value)
        } else {
            self.fields.get_mut(&field.number())
        }
    }

    pub(crate) fn insert(&mut self, field: &FieldDescriptor, value: Value) {
        if omits_default(field, &value) {
            self.take(field);
            return;
        }
        if field.is_extension() {
            self.extensions
                .insert(field.number(), (field.clone(), value));
        } else {
            self.fields.insert(field.number(), value);
        }
    }

    pub(crate) fn take(&mut self, field: &FieldDescriptor) -> Option<Value> {
        if field.is_extension() {
            self.extensions
                .remove(&field.number())
                .map(|(_, value)| value)
        } else {
            self.fields.remove(&field.number())
        }
    }

    /// The element list of a repeated field, created on first use
    pub(crate) fn list_mut(&mut self, field: &FieldDescriptor) -> &mut Vec<Value> {
        if !matches!(self.slot(field), Some(Value::List(_))) {
            self.insert(field, Value::List(Vec::new()));
        }
        match self.slot_mut(field) {
            Some(Value::List(items)) => items,
            _ => unreachable!("list slot was just inserted"),
        }
    }

    /// Appends one element; a map entry replaces the entry with the same key
    pub(crate) fn push_element(&mut self, field: &FieldDescriptor, value: Value) {
        let is_map = field.is_map();
        let items = self.list_mut(field);
        if is_map {
            let key = map_key(&value);
            if let Some(slot) = items.iter_mut().find(|entry| map_key(entry) == key) {
                *slot = value;
                return;
            }
        }
        items.push(value);
    }

    pub(crate) fn unknown_mut(&mut self) -> &mut UnknownFieldSet {
        &mut self.unknown
    }

    fn get(&self, field: &FieldDescriptor) -> Value {
        self.slot(field)
            .cloned()
            .unwrap_or_else(|| field.default_value())
    }

    fn has(&self, field: &FieldDescriptor) -> bool {
        match self.slot(field) {
            Some(Value::List(items)) => !items.is_empty(),
            Some(_) => true,
            None => false,
        }
    }

    fn count(&self, field: &FieldDescriptor) -> usize {
        match self.slot(field) {
            Some(Value::List(items)) => items.len(),
            Some(_) => 1,
            None => 0,
        }
    }

    fn get_at(&self, field: &FieldDescriptor, index: usize) -> Result<Value> {
        let items = match self.slot(field) {
            Some(Value::List(items)) => items.as_slice(),
            _ => &[],
        };
        items.get(index).cloned().ok_or_else(|| Error::IndexOutOfRange {
            field: field.full_name().to_string(),
            index,
            len: items.len(),
        })
    }

    /// Set fields in wire order: declared fields, then extensions, both by number
    fn set_fields(&self, descriptor: &MessageDescriptor) -> Vec<(FieldDescriptor, Value)> {
        let declared = self.fields.iter().filter_map(|(&number, value)| {
            let field = descriptor.find_field_by_number(number)?;
            self.has(&field).then(|| (field, value.clone()))
        });
        let extensions = self
            .extensions
            .values()
            .filter(|(field, _)| self.has(field))
            .map(|(field, value)| (field.clone(), value.clone()));
        declared.chain(extensions).collect()
    }

    /// Merges `other` into `self`.
    ///
    /// Singular scalars are overwritten, lists concatenated (map entries
    /// replaced by key), singular messages merged recursively and unknown
    /// fields appended.
    pub(crate) fn merge(&mut self, descriptor: &MessageDescriptor, other: &FieldStore) {
        for (&number, value) in &other.fields {
            if let Some(field) = descriptor.find_field_by_number(number) {
                self.merge_field(&field, value);
            }
        }
        for (field, value) in other.extensions.values() {
            self.merge_field(field, value);
        }
        self.unknown.extend_from(&other.unknown);
    }

    fn merge_field(&mut self, field: &FieldDescriptor, incoming: &Value) {
        match incoming {
            Value::List(items) => {
                for item in items {
                    self.push_element(field, item.clone());
                }
            }
            Value::Message(other) => {
                let mut store = match self.take(field) {
                    Some(Value::Message(existing)) => existing.into_store(),
                    _ => FieldStore::default(),
                };
                store.merge(other.descriptor(), &other.store);
                let merged = Message::from_store(other.descriptor().clone(), store);
                self.insert(field, Value::Message(merged));
            }
            value => self.insert(field, value.clone()),
        }
    }

    fn collect_missing(&self, descriptor: &MessageDescriptor, prefix: &str, missing: &mut Vec<String>) {
        for field in descriptor.fields() {
            if field.is_required() && !self.has(&field) {
                missing.push(format!("{}{}", prefix, field.name()));
            }
        }

        let declared = self
            .fields
            .iter()
            .filter_map(|(&number, value)| {
                let field = descriptor.find_field_by_number(number)?;
                Some((field.name().to_string(), value))
            });
        let extensions = self
            .extensions
            .values()
            .map(|(field, value)| (format!("[{}]", field.full_name()), value));

        for (name, value) in declared.chain(extensions) {
            match value {
                Value::Message(message) => message.store.collect_missing(
                    message.descriptor(),
                    &format!("{}{}.", prefix, name),
                    missing,
                ),
                Value::List(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if let Value::Message(message) = item {
                            message.store.collect_missing(
                                message.descriptor(),
                                &format!("{}{}[{}].", prefix, name, i),
                                missing,
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Singular non-message fields that are not required are left off the wire
/// at their default, so they are not kept at it either
pub(crate) fn omits_default(field: &FieldDescriptor, value: &Value) -> bool {
    !field.is_required()
        && !field.is_repeated()
        && !matches!(value, Value::Message(_) | Value::List(_))
        && *value == field.default_value()
}

/// Key of a map entry; an unset key reads as its default
fn map_key(entry: &Value) -> Option<Value> {
    let entry = entry.as_message()?;
    let key = entry.descriptor().map_key_field()?;
    Some(entry.get(&key))
}

/// Read access shared by [`Message`] and [`MessageBuilder`]
pub trait ReflectMessage {
    /// Type of this message
    fn descriptor(&self) -> &MessageDescriptor;

    /// Current value of `field`; unset singular fields read as their default
    fn get(&self, field: &FieldDescriptor) -> Value;

    /// True if a singular field is set or a repeated field is non-empty
    fn has(&self, field: &FieldDescriptor) -> bool;

    /// Element count of a repeated field (0 or 1 for singular fields)
    fn count(&self, field: &FieldDescriptor) -> usize;

    /// One element of a repeated field
    fn get_at(&self, field: &FieldDescriptor, index: usize) -> Result<Value>;

    /// Enum value descriptor for the stored number of an enum field.
    ///
    /// `None` for non-enum fields and for numbers an open enum does not declare.
    fn get_enum(&self, field: &FieldDescriptor) -> Option<EnumValueDescriptor>;

    /// Fields preserved verbatim from parsing
    fn unknown_fields(&self) -> &UnknownFieldSet;

    /// Every set field with its value: declared fields then extensions, by number
    fn set_fields(&self) -> Vec<(FieldDescriptor, Value)>;

    /// Value stored under `key` in a map field.
    ///
    /// `None` if the key is absent or `field` is not a map field of this type.
    fn get_map_value(&self, field: &FieldDescriptor, key: &Value) -> Option<Value> {
        if !field.is_map() {
            return None;
        }
        let value_field = field.message_type()?.map_value_field()?;
        match self.get(field) {
            Value::List(entries) => entries
                .iter()
                .find(|entry| map_key(entry).as_ref() == Some(key))
                .and_then(|entry| Some(entry.as_message()?.get(&value_field))),
            _ => None,
        }
    }
}

// Fields of another message type read as absent
macro_rules! impl_reflect_message {
    ($ty:ty) => {
        impl ReflectMessage for $ty {
            fn descriptor(&self) -> &MessageDescriptor {
                &self.descriptor
            }

            fn get(&self, field: &FieldDescriptor) -> Value {
                if !self.owns(field) {
                    return field.default_value();
                }
                self.store().get(field)
            }

            fn has(&self, field: &FieldDescriptor) -> bool {
                self.owns(field) && self.store().has(field)
            }

            fn count(&self, field: &FieldDescriptor) -> usize {
                if !self.owns(field) {
                    return 0;
                }
                self.store().count(field)
            }

            fn get_at(&self, field: &FieldDescriptor, index: usize) -> Result<Value> {
                if !self.owns(field) {
                    return Err(Error::IndexOutOfRange {
                        field: field.full_name().to_string(),
                        index,
                        len: 0,
                    });
                }
                self.store().get_at(field, index)
            }

            fn get_enum(&self, field: &FieldDescriptor) -> Option<EnumValueDescriptor> {
                let enum_type = field.enum_type()?;
                let number = self.get(field).as_enum_number()?;
                enum_type.find_value_by_number(number)
            }

            fn unknown_fields(&self) -> &UnknownFieldSet {
                &self.store().unknown
            }

            fn set_fields(&self) -> Vec<(FieldDescriptor, Value)> {
                self.store().set_fields(&self.descriptor)
            }
        }

        impl $ty {
            fn owns(&self, field: &FieldDescriptor) -> bool {
                field.containing_type() == self.descriptor
            }
        }
    };
}

impl_reflect_message!(Message);
impl_reflect_message!(MessageBuilder);

/// An immutable message snapshot; cheap to clone and share
#[derive(Debug, Clone)]
pub struct Message {
    descriptor: MessageDescriptor,
    store: Arc<FieldStore>,
    /// Serialized size, computed on first use
    encoded_len: Arc<OnceLock<usize>>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && (Arc::ptr_eq(&self.store, &other.store) || self.store == other.store)
    }
}

impl Message {
    /// The message of `descriptor`'s type with no fields set
    pub fn default_instance(descriptor: &MessageDescriptor) -> Message {
        Message {
            descriptor: descriptor.clone(),
            store: Arc::default(),
            encoded_len: Arc::default(),
        }
    }

    pub(crate) fn from_store(descriptor: MessageDescriptor, store: FieldStore) -> Message {
        Message {
            descriptor,
            store: Arc::new(store),
            encoded_len: Arc::default(),
        }
    }

    pub(crate) fn into_store(self) -> FieldStore {
        Arc::try_unwrap(self.store).unwrap_or_else(|shared| (*shared).clone())
    }

    fn store(&self) -> &FieldStore {
        &self.store
    }

    /// Type of this message
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.descriptor
    }

    /// A builder pre-populated with this message's fields
    pub fn to_builder(&self) -> MessageBuilder {
        MessageBuilder {
            descriptor: self.descriptor.clone(),
            store: (*self.store).clone(),
        }
    }

    /// True if every required field is set, recursively
    pub fn is_initialized(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    /// Dotted paths of unset required fields, recursively
    pub fn missing_required_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        self.store
            .collect_missing(&self.descriptor, "", &mut missing);
        missing
    }

    /// Parses one message from `bytes` with default options and no extensions
    pub fn decode(descriptor: &MessageDescriptor, bytes: &[u8]) -> Result<Message> {
        Self::decode_with(
            descriptor,
            bytes,
            ExtensionRegistry::empty(),
            &DecodeOptions::default(),
        )
    }

    /// Parses one message from `bytes`
    pub fn decode_with(
        descriptor: &MessageDescriptor,
        bytes: &[u8],
        registry: &ExtensionRegistry,
        options: &DecodeOptions,
    ) -> Result<Message> {
        let mut reader = options.reader(bytes);
        Self::decode_from(descriptor, &mut reader, registry, options.mode)
    }

    /// Parses one message spanning the rest of the reader's current region
    pub fn decode_from<R: Read>(
        descriptor: &MessageDescriptor,
        reader: &mut WireReader<R>,
        registry: &ExtensionRegistry,
        mode: RuntimeMode,
    ) -> Result<Message> {
        let mut store = FieldStore::default();
        decode::merge_from(&mut store, descriptor, reader, registry, mode)?;
        Ok(Message::from_store(descriptor.clone(), store))
    }

    /// Parses a varint-length-prefixed message
    pub fn decode_length_delimited(
        descriptor: &MessageDescriptor,
        bytes: &[u8],
        registry: &ExtensionRegistry,
        options: &DecodeOptions,
    ) -> Result<Message> {
        let mut reader = options.reader(bytes);
        let len = reader.read_length()?;
        let previous = reader.push_limit(len)?;
        let message = Self::decode_from(descriptor, &mut reader, registry, options.mode)?;
        reader.pop_limit(previous);
        Ok(message)
    }
}

/// Mutable staging area for a message
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    descriptor: MessageDescriptor,
    store: FieldStore,
}

impl MessageBuilder {
    /// Creates an empty builder for `descriptor`'s type
    pub fn new(descriptor: &MessageDescriptor) -> Self {
        Self {
            descriptor: descriptor.clone(),
            store: FieldStore::default(),
        }
    }

    fn store(&self) -> &FieldStore {
        &self.store
    }

    /// Checks that `field` belongs to this message type
    fn check_owner(&self, field: &FieldDescriptor) -> Result<()> {
        if field.containing_type() == self.descriptor {
            return Ok(());
        }
        if field.is_extension() {
            Err(Error::ExtensionMismatch {
                extension: field.full_name().to_string(),
                message: self.descriptor.full_name().to_string(),
            })
        } else {
            Err(Error::type_mismatch(
                field.full_name(),
                format!("a field of '{}'", self.descriptor.full_name()),
                format!("a field of '{}'", field.containing_type().full_name()),
            ))
        }
    }

    fn check_repeated(field: &FieldDescriptor) -> Result<()> {
        if field.is_repeated() {
            Ok(())
        } else {
            Err(Error::type_mismatch(
                field.full_name(),
                "a repeated field",
                "a singular field",
            ))
        }
    }

    /// Replaces the value of `field`; repeated fields take a [`Value::List`].
    ///
    /// Setting a singular field to a default that is never serialized
    /// clears it.
    pub fn set(&mut self, field: &FieldDescriptor, value: Value) -> Result<()> {
        self.check_owner(field)?;
        value.check_field(field)?;
        match value {
            Value::List(entries) if field.is_map() => {
                self.store.take(field);
                for entry in entries {
                    self.store.push_element(field, entry);
                }
            }
            value => self.store.insert(field, value),
        }
        Ok(())
    }

    /// Appends one element to a repeated field
    pub fn add(&mut self, field: &FieldDescriptor, value: Value) -> Result<()> {
        self.check_owner(field)?;
        Self::check_repeated(field)?;
        value.check_element(field)?;
        self.store.push_element(field, value);
        Ok(())
    }

    /// Stores `value` under `key` in a map field, replacing any previous entry
    pub fn insert_map_entry(&mut self, field: &FieldDescriptor, key: Value, value: Value) -> Result<()> {
        self.check_owner(field)?;
        let entry_type = field
            .message_type()
            .filter(|_| field.is_map())
            .ok_or_else(|| {
                Error::type_mismatch(field.full_name(), "a map field", field.field_type().as_str())
            })?;
        let (key_field, value_field) = entry_type
            .map_key_field()
            .zip(entry_type.map_value_field())
            .ok_or_else(|| {
                Error::invalid_descriptor(format!(
                    "map entry '{}' lacks a key or value field",
                    entry_type.full_name()
                ))
            })?;

        let mut entry = MessageBuilder::new(&entry_type);
        entry.set(&key_field, key)?;
        entry.set(&value_field, value)?;
        self.store.push_element(field, Value::Message(entry.build_partial()));
        Ok(())
    }

    /// Replaces one element of a repeated field
    pub fn set_at(&mut self, field: &FieldDescriptor, index: usize, value: Value) -> Result<()> {
        self.check_owner(field)?;
        Self::check_repeated(field)?;
        value.check_element(field)?;
        let items = self.store.list_mut(field);
        let len = items.len();
        let slot = items.get_mut(index).ok_or_else(|| Error::IndexOutOfRange {
            field: field.full_name().to_string(),
            index,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    /// Unsets a field (or empties a repeated field)
    pub fn clear(&mut self, field: &FieldDescriptor) {
        if field.containing_type() == self.descriptor {
            self.store.take(field);
        }
    }

    /// Drops all preserved unknown fields
    pub fn clear_unknown_fields(&mut self) {
        self.store.unknown.clear();
    }

    /// Merges `other` into this builder
    pub fn merge(&mut self, other: &Message) -> Result<()> {
        if other.descriptor != self.descriptor {
            return Err(Error::type_mismatch(
                self.descriptor.full_name(),
                format!("message '{}'", self.descriptor.full_name()),
                format!("message '{}'", other.descriptor.full_name()),
            ));
        }
        self.store.merge(&self.descriptor, &other.store);
        Ok(())
    }

    /// Parses `bytes` and merges the result into this builder
    pub fn merge_from_bytes(
        &mut self,
        bytes: &[u8],
        registry: &ExtensionRegistry,
        options: &DecodeOptions,
    ) -> Result<()> {
        let mut reader = options.reader(bytes);
        // Parse into a scratch store so a failure leaves the builder untouched
        let mut store = self.store.clone();
        decode::merge_from(&mut store, &self.descriptor, &mut reader, registry, options.mode)?;
        self.store = store;
        Ok(())
    }

    /// Produces an immutable message after checking required fields.
    ///
    /// The builder stays usable; its later changes do not affect the result.
    pub fn build(&self) -> Result<Message> {
        let mut missing = Vec::new();
        self.store
            .collect_missing(&self.descriptor, "", &mut missing);
        if !missing.is_empty() {
            return Err(Error::StructuralValidity {
                message: self.descriptor.full_name().to_string(),
                missing,
            });
        }
        Ok(self.build_partial())
    }

    /// Produces an immutable message without checking required fields
    pub fn build_partial(&self) -> Message {
        Message::from_store(self.descriptor.clone(), self.store.clone())
    }
}
