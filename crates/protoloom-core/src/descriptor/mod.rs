//! Descriptor graph: files, messages, fields, enums and extensions.
//!
//! ## Architecture
//!
//! All descriptors of one schema live in a single arena ([`DescriptorGraph`]),
//! built once from a compiled `FileDescriptorSet` and immutable afterwards.
//! The public descriptor types are cheap handles (graph + index), so
//! back-references such as a field's containing type never own anything.
//!
//! Construction runs in two passes (see `build`):
//!
//! 1. register every file, message, enum, field and extension with a stable index
//! 2. link dependencies, type references, extendees and default values

mod build;

use crate::error::{Error, Result};
use crate::message::Message;
use crate::value::Value;
use crate::wire::WireType;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Proto2 syntax
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl Syntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for Syntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(Syntax::Proto2),
            "proto3" => Ok(Syntax::Proto3),
            _ => Err(Error::invalid_descriptor(format!(
                "unsupported syntax '{}'",
                value
            ))),
        }
    }
}

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FieldType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl FieldType {
    /// Wire type used for a single (unpacked) value
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::Uint32
            | FieldType::Uint64
            | FieldType::Sint32
            | FieldType::Sint64
            | FieldType::Bool
            | FieldType::Enum => WireType::Varint,
            FieldType::Fixed64 | FieldType::Sfixed64 | FieldType::Double => WireType::I64,
            FieldType::Fixed32 | FieldType::Sfixed32 | FieldType::Float => WireType::I32,
            FieldType::String | FieldType::Bytes | FieldType::Message => WireType::Len,
            FieldType::Group => WireType::StartGroup,
        }
    }

    /// True for scalar types that may use packed encoding
    pub fn is_packable(&self) -> bool {
        !matches!(
            self,
            FieldType::String | FieldType::Bytes | FieldType::Message | FieldType::Group
        )
    }

    /// Closed category the runtime dispatches value conversion on
    pub fn category(&self) -> FieldCategory {
        match self {
            FieldType::Message | FieldType::Group => FieldCategory::Message,
            FieldType::Enum => FieldCategory::Enum,
            _ => FieldCategory::Primitive,
        }
    }

    /// Name as written in a `.proto` file
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Double => "double",
            FieldType::Float => "float",
            FieldType::Int64 => "int64",
            FieldType::Uint64 => "uint64",
            FieldType::Int32 => "int32",
            FieldType::Fixed64 => "fixed64",
            FieldType::Fixed32 => "fixed32",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Group => "group",
            FieldType::Message => "message",
            FieldType::Bytes => "bytes",
            FieldType::Uint32 => "uint32",
            FieldType::Enum => "enum",
            FieldType::Sfixed32 => "sfixed32",
            FieldType::Sfixed64 => "sfixed64",
            FieldType::Sint32 => "sint32",
            FieldType::Sint64 => "sint64",
        }
    }
}

impl TryFrom<prost_types::field_descriptor_proto::Type> for FieldType {
    type Error = Error;

    fn try_from(value: prost_types::field_descriptor_proto::Type) -> Result<Self> {
        use prost_types::field_descriptor_proto::Type;

        Ok(match value {
            Type::Double => FieldType::Double,
            Type::Float => FieldType::Float,
            Type::Int64 => FieldType::Int64,
            Type::Uint64 => FieldType::Uint64,
            Type::Int32 => FieldType::Int32,
            Type::Fixed64 => FieldType::Fixed64,
            Type::Fixed32 => FieldType::Fixed32,
            Type::Bool => FieldType::Bool,
            Type::String => FieldType::String,
            Type::Group => FieldType::Group,
            Type::Message => FieldType::Message,
            Type::Bytes => FieldType::Bytes,
            Type::Uint32 => FieldType::Uint32,
            Type::Enum => FieldType::Enum,
            Type::Sfixed32 => FieldType::Sfixed32,
            Type::Sfixed64 => FieldType::Sfixed64,
            Type::Sint32 => FieldType::Sint32,
            Type::Sint64 => FieldType::Sint64,
        })
    }
}

/// Field categories: value conversion is keyed off these, never off runtime type identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    /// Numbers, bools, strings and bytes
    Primitive,
    /// Enum value stored as its number
    Enum,
    /// Embedded message or group
    Message,
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Zero or one value
    Optional,
    /// Exactly one value, checked at build time
    Required,
    /// Ordered sequence of values
    Repeated,
}

impl Label {
    /// The label keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Optional => "optional",
            Label::Required => "required",
            Label::Repeated => "repeated",
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GraphInner {
    files: Vec<FileInner>,
    messages: Vec<MessageInner>,
    enums: Vec<EnumInner>,
    fields: Vec<FieldInner>,
    symbols: HashMap<String, Symbol>,
    file_names: HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Package,
    Message(usize),
    Enum(usize),
    EnumValue(usize, usize),
    Field(usize),
}

#[derive(Debug)]
struct FileInner {
    name: String,
    package: String,
    syntax: Syntax,
    dependencies: Vec<usize>,
    public_dependencies: Vec<usize>,
    messages: Vec<usize>,
    enums: Vec<usize>,
    extensions: Vec<usize>,
    options: prost_types::FileOptions,
}

#[derive(Debug)]
struct MessageInner {
    name: String,
    full_name: String,
    file: usize,
    parent: Option<usize>,
    index: usize,
    fields: Vec<usize>,
    /// Field ids sorted by field number
    fields_by_number: Vec<usize>,
    field_numbers: HashMap<i32, usize>,
    field_names: HashMap<String, usize>,
    nested_messages: Vec<usize>,
    nested_enums: Vec<usize>,
    extensions: Vec<usize>,
    extension_ranges: Vec<Range<i32>>,
    options: prost_types::MessageOptions,
}

#[derive(Debug)]
struct EnumInner {
    name: String,
    full_name: String,
    file: usize,
    parent: Option<usize>,
    index: usize,
    values: Vec<EnumValueInner>,
    value_numbers: HashMap<i32, usize>,
    value_names: HashMap<String, usize>,
    options: prost_types::EnumOptions,
}

#[derive(Debug)]
struct EnumValueInner {
    name: String,
    full_name: String,
    number: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeRef {
    Message(usize),
    Enum(usize),
}

#[derive(Debug)]
struct FieldInner {
    name: String,
    full_name: String,
    json_name: String,
    number: i32,
    field_type: FieldType,
    label: Label,
    index: usize,
    file: usize,
    /// Message owning the field, or the extended message for extensions
    containing_type: usize,
    is_extension: bool,
    /// Message that declared an extension; `None` when declared at file level
    extension_scope: Option<usize>,
    type_ref: Option<TypeRef>,
    default_value: Option<Value>,
    has_default: bool,
    packed: bool,
    options: prost_types::FieldOptions,
}

/// An immutable, shareable schema.
///
/// Cloning is cheap; every descriptor handle keeps the graph alive.
#[derive(Clone)]
pub struct DescriptorGraph {
    inner: Arc<GraphInner>,
}

impl fmt::Debug for DescriptorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorGraph")
            .field(
                "files",
                &self.inner.files.iter().map(|f| &f.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PartialEq for DescriptorGraph {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DescriptorGraph {}

impl DescriptorGraph {
    /// All files in registration order
    pub fn files(&self) -> impl ExactSizeIterator<Item = FileDescriptor> + '_ {
        (0..self.inner.files.len()).map(|index| FileDescriptor::new(self.clone(), index))
    }

    /// Finds a file by its path
    pub fn get_file_by_name(&self, name: &str) -> Option<FileDescriptor> {
        let index = *self.inner.file_names.get(name)?;
        Some(FileDescriptor::new(self.clone(), index))
    }

    /// Finds a message by fully-qualified name (no leading dot)
    pub fn get_message_by_name(&self, full_name: &str) -> Option<MessageDescriptor> {
        match self.symbol(full_name)? {
            Symbol::Message(index) => Some(MessageDescriptor::new(self.clone(), index)),
            _ => None,
        }
    }

    /// Finds an enum by fully-qualified name
    pub fn get_enum_by_name(&self, full_name: &str) -> Option<EnumDescriptor> {
        match self.symbol(full_name)? {
            Symbol::Enum(index) => Some(EnumDescriptor::new(self.clone(), index)),
            _ => None,
        }
    }

    /// Finds an extension by fully-qualified name
    pub fn get_extension_by_name(&self, full_name: &str) -> Option<FieldDescriptor> {
        match self.symbol(full_name)? {
            Symbol::Field(index) if self.inner.fields[index].is_extension => {
                Some(FieldDescriptor::new(self.clone(), index))
            }
            _ => None,
        }
    }

    /// Finds a declared field by fully-qualified name
    pub fn get_field_by_name(&self, full_name: &str) -> Option<FieldDescriptor> {
        match self.symbol(full_name)? {
            Symbol::Field(index) if !self.inner.fields[index].is_extension => {
                Some(FieldDescriptor::new(self.clone(), index))
            }
            _ => None,
        }
    }

    /// Finds an enum value by fully-qualified name (scoped like C++: `pkg.VALUE`)
    pub fn get_enum_value_by_name(&self, full_name: &str) -> Option<EnumValueDescriptor> {
        match self.symbol(full_name)? {
            Symbol::EnumValue(enum_index, index) => Some(EnumValueDescriptor {
                parent: EnumDescriptor::new(self.clone(), enum_index),
                index,
            }),
            _ => None,
        }
    }

    /// Every message in the graph, top-level and nested
    pub fn all_messages(&self) -> impl ExactSizeIterator<Item = MessageDescriptor> + '_ {
        (0..self.inner.messages.len()).map(|index| MessageDescriptor::new(self.clone(), index))
    }

    /// Every extension in the graph, file- and message-scoped
    pub fn all_extensions(&self) -> impl Iterator<Item = FieldDescriptor> + '_ {
        self.inner
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.is_extension)
            .map(|(index, _)| FieldDescriptor::new(self.clone(), index))
    }

    fn symbol(&self, full_name: &str) -> Option<Symbol> {
        let name = full_name.strip_prefix('.').unwrap_or(full_name);
        self.inner.symbols.get(name).copied()
    }
}

macro_rules! descriptor_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            graph: DescriptorGraph,
            id: usize,
        }

        impl $name {
            fn new(graph: DescriptorGraph, id: usize) -> Self {
                Self { graph, id }
            }

            /// The graph this descriptor belongs to
            pub fn graph(&self) -> &DescriptorGraph {
                &self.graph
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id && self.graph == other.graph
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                Arc::as_ptr(&self.graph.inner).hash(state);
                self.id.hash(state);
            }
        }
    };
}

descriptor_handle! {
    /// A `.proto` file
    FileDescriptor
}

descriptor_handle! {
    /// A message type
    MessageDescriptor
}

descriptor_handle! {
    /// A declared field or an extension
    FieldDescriptor
}

descriptor_handle! {
    /// An enum type
    EnumDescriptor
}

impl fmt::Debug for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileDescriptor({})", self.name())
    }
}

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageDescriptor({})", self.full_name())
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldDescriptor({} = {})", self.full_name(), self.number())
    }
}

impl fmt::Debug for EnumDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnumDescriptor({})", self.full_name())
    }
}

impl FileDescriptor {
    fn inner(&self) -> &FileInner {
        &self.graph.inner.files[self.id]
    }

    /// Path of the file, e.g. `google/protobuf/unittest.proto`
    pub fn name(&self) -> &str {
        &self.inner().name
    }

    /// Package name, empty when none was declared
    pub fn package(&self) -> &str {
        &self.inner().package
    }

    /// Declared syntax
    pub fn syntax(&self) -> Syntax {
        self.inner().syntax
    }

    /// Position of this file in the graph
    pub fn index(&self) -> usize {
        self.id
    }

    /// Direct dependencies, duplicate-free, in declaration order
    pub fn dependencies(&self) -> Vec<FileDescriptor> {
        self.files(&self.inner().dependencies)
    }

    /// The subset of dependencies re-exported with `import public`
    pub fn public_dependencies(&self) -> Vec<FileDescriptor> {
        self.files(&self.inner().public_dependencies)
    }

    /// Top-level messages
    pub fn messages(&self) -> Vec<MessageDescriptor> {
        messages(&self.graph, &self.inner().messages)
    }

    /// Top-level enums
    pub fn enums(&self) -> Vec<EnumDescriptor> {
        enums(&self.graph, &self.inner().enums)
    }

    /// File-scoped extensions
    pub fn extensions(&self) -> Vec<FieldDescriptor> {
        fields(&self.graph, &self.inner().extensions)
    }

    /// Finds a top-level message by simple name
    pub fn find_message(&self, name: &str) -> Option<MessageDescriptor> {
        self.messages().into_iter().find(|m| m.name() == name)
    }

    /// Finds a top-level enum by simple name
    pub fn find_enum(&self, name: &str) -> Option<EnumDescriptor> {
        self.enums().into_iter().find(|e| e.name() == name)
    }

    /// Finds a file-scoped extension by simple name
    pub fn find_extension(&self, name: &str) -> Option<FieldDescriptor> {
        self.extensions().into_iter().find(|e| e.name() == name)
    }

    /// File options
    pub fn options(&self) -> &prost_types::FileOptions {
        &self.inner().options
    }

    fn files(&self, ids: &[usize]) -> Vec<FileDescriptor> {
        ids.iter()
            .map(|&id| FileDescriptor::new(self.graph.clone(), id))
            .collect()
    }
}

impl MessageDescriptor {
    fn inner(&self) -> &MessageInner {
        &self.graph.inner.messages[self.id]
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.inner().name
    }

    /// Fully-qualified name, e.g. `pkg.Outer.Inner`
    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    /// File that declares this message
    pub fn file(&self) -> FileDescriptor {
        FileDescriptor::new(self.graph.clone(), self.inner().file)
    }

    /// Enclosing message; `None` for top-level messages
    pub fn parent_message(&self) -> Option<MessageDescriptor> {
        self.inner()
            .parent
            .map(|id| MessageDescriptor::new(self.graph.clone(), id))
    }

    /// Position in the owner's (file's or parent's) message list
    pub fn index(&self) -> usize {
        self.inner().index
    }

    /// Declared fields in declaration order
    pub fn fields(&self) -> Vec<FieldDescriptor> {
        fields(&self.graph, &self.inner().fields)
    }

    /// Declared fields sorted by number
    pub fn fields_in_number_order(&self) -> Vec<FieldDescriptor> {
        fields(&self.graph, &self.inner().fields_by_number)
    }

    /// Finds a declared field by name
    pub fn find_field_by_name(&self, name: &str) -> Option<FieldDescriptor> {
        let position = *self.inner().field_names.get(name)?;
        Some(FieldDescriptor::new(
            self.graph.clone(),
            self.inner().fields[position],
        ))
    }

    /// Finds a declared field by number; extensions are never returned
    pub fn find_field_by_number(&self, number: i32) -> Option<FieldDescriptor> {
        let position = *self.inner().field_numbers.get(&number)?;
        Some(FieldDescriptor::new(
            self.graph.clone(),
            self.inner().fields[position],
        ))
    }

    /// Nested message types
    pub fn nested_messages(&self) -> Vec<MessageDescriptor> {
        messages(&self.graph, &self.inner().nested_messages)
    }

    /// Finds a nested message by simple name
    pub fn find_nested_message(&self, name: &str) -> Option<MessageDescriptor> {
        self.nested_messages().into_iter().find(|m| m.name() == name)
    }

    /// Nested enum types
    pub fn nested_enums(&self) -> Vec<EnumDescriptor> {
        enums(&self.graph, &self.inner().nested_enums)
    }

    /// Finds a nested enum by simple name
    pub fn find_nested_enum(&self, name: &str) -> Option<EnumDescriptor> {
        self.nested_enums().into_iter().find(|e| e.name() == name)
    }

    /// Extensions declared inside this message (they may extend other types)
    pub fn extensions(&self) -> Vec<FieldDescriptor> {
        fields(&self.graph, &self.inner().extensions)
    }

    /// Finds an extension declared inside this message by simple name
    pub fn find_extension(&self, name: &str) -> Option<FieldDescriptor> {
        self.extensions().into_iter().find(|e| e.name() == name)
    }

    /// Field-number ranges open to extensions (end exclusive)
    pub fn extension_ranges(&self) -> &[Range<i32>] {
        &self.inner().extension_ranges
    }

    /// True if `number` falls in one of the extension ranges
    pub fn is_extension_number(&self, number: i32) -> bool {
        self.extension_ranges().iter().any(|r| r.contains(&number))
    }

    /// True for the synthetic entry types behind `map<K, V>` fields
    pub fn is_map_entry(&self) -> bool {
        self.options().map_entry.unwrap_or(false)
    }

    /// The `key` field of a map entry type
    pub fn map_key_field(&self) -> Option<FieldDescriptor> {
        self.is_map_entry()
            .then(|| self.find_field_by_number(1))
            .flatten()
    }

    /// The `value` field of a map entry type
    pub fn map_value_field(&self) -> Option<FieldDescriptor> {
        self.is_map_entry()
            .then(|| self.find_field_by_number(2))
            .flatten()
    }

    /// Message options
    pub fn options(&self) -> &prost_types::MessageOptions {
        &self.inner().options
    }

    /// True if any field of this type, transitively, is required
    pub fn has_required_fields(&self) -> bool {
        let mut seen = HashSet::new();
        self.has_required_inner(&mut seen)
    }

    fn has_required_inner(&self, seen: &mut HashSet<usize>) -> bool {
        if !seen.insert(self.id) {
            return false;
        }
        self.fields().iter().any(|field| {
            field.is_required()
                || field
                    .message_type()
                    .map_or(false, |m| m.has_required_inner(seen))
        })
    }
}

impl FieldDescriptor {
    fn inner(&self) -> &FieldInner {
        &self.graph.inner.fields[self.id]
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.inner().name
    }

    /// Fully-qualified name; extensions are named after their declaring scope
    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    /// JSON name (declared or derived lowerCamelCase)
    pub fn json_name(&self) -> &str {
        &self.inner().json_name
    }

    /// Field number
    pub fn number(&self) -> i32 {
        self.inner().number
    }

    /// Declared type
    pub fn field_type(&self) -> FieldType {
        self.inner().field_type
    }

    /// Value conversion category
    pub fn category(&self) -> FieldCategory {
        self.field_type().category()
    }

    /// Cardinality
    pub fn label(&self) -> Label {
        self.inner().label
    }

    /// True for `required` fields
    pub fn is_required(&self) -> bool {
        self.label() == Label::Required
    }

    /// True for `repeated` fields
    pub fn is_repeated(&self) -> bool {
        self.label() == Label::Repeated
    }

    /// True for `map<K, V>` fields: repeated fields of a map entry type
    pub fn is_map(&self) -> bool {
        self.is_repeated()
            && self
                .message_type()
                .map_or(false, |entry| entry.is_map_entry())
    }

    /// True if repeated values are written as one packed run
    pub fn is_packed(&self) -> bool {
        self.inner().packed
    }

    /// Position in the owner's field or extension list
    pub fn index(&self) -> usize {
        self.inner().index
    }

    /// File that declares this field
    pub fn file(&self) -> FileDescriptor {
        FileDescriptor::new(self.graph.clone(), self.inner().file)
    }

    /// The message this field belongs to; for extensions, the extended message
    pub fn containing_type(&self) -> MessageDescriptor {
        MessageDescriptor::new(self.graph.clone(), self.inner().containing_type)
    }

    /// True for extension fields
    pub fn is_extension(&self) -> bool {
        self.inner().is_extension
    }

    /// Message an extension was declared in; `None` for file-scoped
    /// extensions and for ordinary fields
    pub fn extension_scope(&self) -> Option<MessageDescriptor> {
        self.inner()
            .extension_scope
            .map(|id| MessageDescriptor::new(self.graph.clone(), id))
    }

    /// Referenced type of message and group fields
    pub fn message_type(&self) -> Option<MessageDescriptor> {
        match self.inner().type_ref? {
            TypeRef::Message(id) => Some(MessageDescriptor::new(self.graph.clone(), id)),
            TypeRef::Enum(_) => None,
        }
    }

    /// Referenced type of enum fields
    pub fn enum_type(&self) -> Option<EnumDescriptor> {
        match self.inner().type_ref? {
            TypeRef::Enum(id) => Some(EnumDescriptor::new(self.graph.clone(), id)),
            TypeRef::Message(_) => None,
        }
    }

    /// Wire type of one unpacked value
    pub fn wire_type(&self) -> WireType {
        self.field_type().wire_type()
    }

    /// True if the schema declared an explicit default
    pub fn has_default_value(&self) -> bool {
        self.inner().has_default
    }

    /// Value a singular field reads as when unset.
    ///
    /// Repeated fields default to an empty list; message fields to the
    /// empty instance of their type.
    pub fn default_value(&self) -> Value {
        if self.is_repeated() {
            return Value::List(Vec::new());
        }
        match (&self.inner().default_value, self.message_type()) {
            (Some(value), _) => value.clone(),
            (None, Some(message_type)) => Value::Message(Message::default_instance(&message_type)),
            (None, None) => Value::Bool(false),
        }
    }

    /// Field options
    pub fn options(&self) -> &prost_types::FieldOptions {
        &self.inner().options
    }
}

impl EnumDescriptor {
    fn inner(&self) -> &EnumInner {
        &self.graph.inner.enums[self.id]
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.inner().name
    }

    /// Fully-qualified name
    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    /// File that declares this enum
    pub fn file(&self) -> FileDescriptor {
        FileDescriptor::new(self.graph.clone(), self.inner().file)
    }

    /// Enclosing message; `None` for top-level enums
    pub fn parent_message(&self) -> Option<MessageDescriptor> {
        self.inner()
            .parent
            .map(|id| MessageDescriptor::new(self.graph.clone(), id))
    }

    /// Position in the owner's enum list
    pub fn index(&self) -> usize {
        self.inner().index
    }

    /// Values in declaration order (aliases included)
    pub fn values(&self) -> Vec<EnumValueDescriptor> {
        (0..self.inner().values.len())
            .map(|index| EnumValueDescriptor {
                parent: self.clone(),
                index,
            })
            .collect()
    }

    /// Finds a value by name
    pub fn find_value_by_name(&self, name: &str) -> Option<EnumValueDescriptor> {
        let index = *self.inner().value_names.get(name)?;
        Some(EnumValueDescriptor {
            parent: self.clone(),
            index,
        })
    }

    /// Finds a value by number; aliases resolve to the first declared name
    pub fn find_value_by_number(&self, number: i32) -> Option<EnumValueDescriptor> {
        let index = *self.inner().value_numbers.get(&number)?;
        Some(EnumValueDescriptor {
            parent: self.clone(),
            index,
        })
    }

    /// First declared value, the implicit default
    pub fn default_value(&self) -> EnumValueDescriptor {
        EnumValueDescriptor {
            parent: self.clone(),
            index: 0,
        }
    }

    /// Closed enums (proto2) reject numbers they do not declare
    pub fn is_closed(&self) -> bool {
        self.file().syntax() == Syntax::Proto2
    }

    /// Enum options
    pub fn options(&self) -> &prost_types::EnumOptions {
        &self.inner().options
    }
}

/// One named value of an enum
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EnumValueDescriptor {
    parent: EnumDescriptor,
    index: usize,
}

impl fmt::Debug for EnumValueDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnumValueDescriptor({} = {})", self.full_name(), self.number())
    }
}

impl EnumValueDescriptor {
    fn inner(&self) -> &EnumValueInner {
        &self.parent.inner().values[self.index]
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.inner().name
    }

    /// Fully-qualified name (a sibling of the enum, as in C++ scoping)
    pub fn full_name(&self) -> &str {
        &self.inner().full_name
    }

    /// Numeric value
    pub fn number(&self) -> i32 {
        self.inner().number
    }

    /// Position in the enum's value list
    pub fn index(&self) -> usize {
        self.index
    }

    /// The enum this value belongs to
    pub fn parent_enum(&self) -> &EnumDescriptor {
        &self.parent
    }
}

fn messages(graph: &DescriptorGraph, ids: &[usize]) -> Vec<MessageDescriptor> {
    ids.iter()
        .map(|&id| MessageDescriptor::new(graph.clone(), id))
        .collect()
}

fn enums(graph: &DescriptorGraph, ids: &[usize]) -> Vec<EnumDescriptor> {
    ids.iter()
        .map(|&id| EnumDescriptor::new(graph.clone(), id))
        .collect()
}

fn fields(graph: &DescriptorGraph, ids: &[usize]) -> Vec<FieldDescriptor> {
    ids.iter()
        .map(|&id| FieldDescriptor::new(graph.clone(), id))
        .collect()
}
