//! Two-pass construction of a [`DescriptorGraph`] from compiled descriptor protos.

use super::{
    DescriptorGraph, EnumInner, EnumValueInner, FieldInner, FieldType, FileInner, GraphInner,
    Label, MessageInner, Symbol, Syntax, TypeRef,
};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::wire::check_field_number;
use prost::Message as _;
use prost_types::field_descriptor_proto::{Label as ProtoLabel, Type as ProtoType};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    FileDescriptorSet,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

impl DescriptorGraph {
    /// Builds a graph from an encoded `FileDescriptorSet`
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let set = FileDescriptorSet::decode(bytes)?;
        Self::from_file_descriptor_set(set)
    }

    /// Builds a graph from a `FileDescriptorSet`
    pub fn from_file_descriptor_set(set: FileDescriptorSet) -> Result<Self> {
        Self::from_files(set.file)
    }

    /// Builds a graph from file descriptor protos.
    ///
    /// Files may come in any order, but every dependency must be among them.
    pub fn from_files(files: impl IntoIterator<Item = FileDescriptorProto>) -> Result<Self> {
        let protos: Vec<_> = files.into_iter().collect();

        let mut builder = GraphBuilder::default();
        for proto in &protos {
            builder.register_file(proto)?;
        }
        builder.link(&protos)?;

        let inner = builder.inner;
        debug!(
            files = inner.files.len(),
            messages = inner.messages.len(),
            enums = inner.enums.len(),
            fields = inner.fields.len(),
            "built descriptor graph"
        );
        Ok(DescriptorGraph {
            inner: Arc::new(inner),
        })
    }
}

/// Link-pass work recorded for one field or extension
#[derive(Debug)]
struct PendingField {
    field: usize,
    /// Scope relative names are resolved from
    scope: String,
    declared_type: Option<ProtoType>,
    type_name: Option<String>,
    extendee: Option<String>,
    default: Option<String>,
    packed: Option<bool>,
}

#[derive(Debug, Clone, Copy)]
enum FieldOwner {
    Message(usize),
    Extension(Option<usize>),
}

#[derive(Debug, Default)]
struct GraphBuilder {
    inner: GraphInner,
    pending: Vec<PendingField>,
}

impl GraphBuilder {
    fn register_file(&mut self, proto: &FileDescriptorProto) -> Result<()> {
        let name = proto.name().to_string();
        if self.inner.file_names.contains_key(&name) {
            return Err(Error::DuplicateSymbol { name });
        }

        let file = self.inner.files.len();
        let package = proto.package().to_string();
        self.register_package(&package)?;

        self.inner.files.push(FileInner {
            name: name.clone(),
            package: package.clone(),
            syntax: Syntax::try_from(proto.syntax())?,
            dependencies: Vec::new(),
            public_dependencies: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            options: proto.options.clone().unwrap_or_default(),
        });
        self.inner.file_names.insert(name, file);

        for (index, message) in proto.message_type.iter().enumerate() {
            let id = self.register_message(message, file, None, &package, index)?;
            self.inner.files[file].messages.push(id);
        }
        for (index, enum_proto) in proto.enum_type.iter().enumerate() {
            let id = self.register_enum(enum_proto, file, None, &package, index)?;
            self.inner.files[file].enums.push(id);
        }
        for (index, extension) in proto.extension.iter().enumerate() {
            let id = self.register_field(
                extension,
                file,
                FieldOwner::Extension(None),
                &package,
                index,
            )?;
            self.inner.files[file].extensions.push(id);
        }
        Ok(())
    }

    /// Registers `a`, `a.b`, ... for package `a.b.c`; packages may be shared by files
    fn register_package(&mut self, package: &str) -> Result<()> {
        if package.is_empty() {
            return Ok(());
        }
        let mut end = 0;
        for part in package.split('.') {
            end += part.len();
            let prefix = &package[..end];
            match self.inner.symbols.get(prefix) {
                None => {
                    self.inner.symbols.insert(prefix.to_string(), Symbol::Package);
                }
                Some(Symbol::Package) => {}
                Some(_) => {
                    return Err(Error::DuplicateSymbol {
                        name: prefix.to_string(),
                    })
                }
            }
            end += 1;
        }
        Ok(())
    }

    fn add_symbol(&mut self, name: &str, symbol: Symbol) -> Result<()> {
        if self.inner.symbols.contains_key(name) {
            return Err(Error::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        self.inner.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    fn register_message(
        &mut self,
        proto: &DescriptorProto,
        file: usize,
        parent: Option<usize>,
        scope: &str,
        index: usize,
    ) -> Result<usize> {
        let full_name = join_name(scope, proto.name());
        let id = self.inner.messages.len();
        self.add_symbol(&full_name, Symbol::Message(id))?;

        self.inner.messages.push(MessageInner {
            name: proto.name().to_string(),
            full_name: full_name.clone(),
            file,
            parent,
            index,
            fields: Vec::new(),
            fields_by_number: Vec::new(),
            field_numbers: HashMap::new(),
            field_names: HashMap::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            extensions: Vec::new(),
            extension_ranges: proto
                .extension_range
                .iter()
                .map(|range| range.start()..range.end())
                .collect(),
            options: proto.options.clone().unwrap_or_default(),
        });

        for (position, nested) in proto.nested_type.iter().enumerate() {
            let child = self.register_message(nested, file, Some(id), &full_name, position)?;
            self.inner.messages[id].nested_messages.push(child);
        }
        for (position, nested) in proto.enum_type.iter().enumerate() {
            let child = self.register_enum(nested, file, Some(id), &full_name, position)?;
            self.inner.messages[id].nested_enums.push(child);
        }
        for (position, field) in proto.field.iter().enumerate() {
            let field_id =
                self.register_field(field, file, FieldOwner::Message(id), &full_name, position)?;
            let message = &mut self.inner.messages[id];
            if message.field_numbers.insert(field.number(), position).is_some() {
                return Err(Error::invalid_descriptor(format!(
                    "field number {} is used twice in '{}'",
                    field.number(),
                    full_name
                )));
            }
            message
                .field_names
                .insert(field.name().to_string(), position);
            message.fields.push(field_id);
        }
        let message = &mut self.inner.messages[id];
        let mut by_number: Vec<(i32, usize)> = proto
            .field
            .iter()
            .map(|field| field.number())
            .zip(message.fields.iter().copied())
            .collect();
        by_number.sort_unstable_by_key(|&(number, _)| number);
        message.fields_by_number = by_number.into_iter().map(|(_, field_id)| field_id).collect();
        for (position, extension) in proto.extension.iter().enumerate() {
            let field_id = self.register_field(
                extension,
                file,
                FieldOwner::Extension(Some(id)),
                &full_name,
                position,
            )?;
            self.inner.messages[id].extensions.push(field_id);
        }
        Ok(id)
    }

    fn register_enum(
        &mut self,
        proto: &EnumDescriptorProto,
        file: usize,
        parent: Option<usize>,
        scope: &str,
        index: usize,
    ) -> Result<usize> {
        let full_name = join_name(scope, proto.name());
        if proto.value.is_empty() {
            return Err(Error::invalid_descriptor(format!(
                "enum '{}' declares no values",
                full_name
            )));
        }

        let id = self.inner.enums.len();
        self.add_symbol(&full_name, Symbol::Enum(id))?;

        let mut values = Vec::with_capacity(proto.value.len());
        let mut value_numbers = HashMap::new();
        let mut value_names = HashMap::new();
        for (position, value) in proto.value.iter().enumerate() {
            // Enum values are siblings of their enum, C++ style
            let value_name = join_name(scope, value.name());
            self.add_symbol(&value_name, Symbol::EnumValue(id, position))?;
            value_numbers.entry(value.number()).or_insert(position);
            value_names.insert(value.name().to_string(), position);
            values.push(EnumValueInner {
                name: value.name().to_string(),
                full_name: value_name,
                number: value.number(),
            });
        }

        self.inner.enums.push(EnumInner {
            name: proto.name().to_string(),
            full_name,
            file,
            parent,
            index,
            values,
            value_numbers,
            value_names,
            options: proto.options.clone().unwrap_or_default(),
        });
        Ok(id)
    }

    fn register_field(
        &mut self,
        proto: &FieldDescriptorProto,
        file: usize,
        owner: FieldOwner,
        scope: &str,
        index: usize,
    ) -> Result<usize> {
        let full_name = join_name(scope, proto.name());
        let number = proto.number();
        check_field_number(number).map_err(|_| {
            Error::invalid_descriptor(format!(
                "field '{}' has invalid number {}",
                full_name, number
            ))
        })?;

        let id = self.inner.fields.len();
        self.add_symbol(&full_name, Symbol::Field(id))?;

        let label = match proto.label() {
            ProtoLabel::Optional => Label::Optional,
            ProtoLabel::Required => Label::Required,
            ProtoLabel::Repeated => Label::Repeated,
        };
        let declared_type = proto.r#type.map(|_| proto.r#type());
        // Placeholder until the link pass resolves `type_name`
        let field_type = match declared_type {
            Some(ty) => FieldType::try_from(ty)?,
            None => FieldType::Message,
        };

        let (containing_type, is_extension, extension_scope) = match owner {
            FieldOwner::Message(message) => (message, false, None),
            FieldOwner::Extension(scope) => {
                if proto.extendee.is_none() {
                    return Err(Error::invalid_descriptor(format!(
                        "extension '{}' has no extendee",
                        full_name
                    )));
                }
                (0, true, scope)
            }
        };

        self.inner.fields.push(FieldInner {
            name: proto.name().to_string(),
            full_name,
            json_name: proto
                .json_name
                .clone()
                .unwrap_or_else(|| to_json_name(proto.name())),
            number,
            field_type,
            label,
            index,
            file,
            containing_type,
            is_extension,
            extension_scope,
            type_ref: None,
            default_value: None,
            has_default: proto.default_value.is_some(),
            packed: false,
            options: proto.options.clone().unwrap_or_default(),
        });

        self.pending.push(PendingField {
            field: id,
            scope: scope.to_string(),
            declared_type,
            type_name: proto.type_name.clone(),
            extendee: proto.extendee.clone(),
            default: proto.default_value.clone(),
            packed: proto.options.as_ref().and_then(|options| options.packed),
        });
        Ok(id)
    }

    fn link(&mut self, protos: &[FileDescriptorProto]) -> Result<()> {
        for (file, proto) in protos.iter().enumerate() {
            let mut dependencies = Vec::with_capacity(proto.dependency.len());
            for name in &proto.dependency {
                let dep = self.file_id(name, proto.name())?;
                if !dependencies.contains(&dep) {
                    dependencies.push(dep);
                }
            }

            let mut public_dependencies = Vec::new();
            for &position in &proto.public_dependency {
                let name = usize::try_from(position)
                    .ok()
                    .and_then(|position| proto.dependency.get(position))
                    .ok_or_else(|| {
                        Error::invalid_descriptor(format!(
                            "file '{}' has public dependency index {} out of range",
                            proto.name(),
                            position
                        ))
                    })?;
                let dep = self.file_id(name, proto.name())?;
                if !public_dependencies.contains(&dep) {
                    public_dependencies.push(dep);
                }
            }

            let inner = &mut self.inner.files[file];
            inner.dependencies = dependencies;
            inner.public_dependencies = public_dependencies;
        }

        let visible: Vec<HashSet<usize>> = (0..self.inner.files.len())
            .map(|file| self.visible_files(file))
            .collect();

        for pending in std::mem::take(&mut self.pending) {
            let file = self.inner.fields[pending.field].file;
            self.link_field(pending, &visible[file])?;
        }
        Ok(())
    }

    fn file_id(&self, name: &str, referrer: &str) -> Result<usize> {
        self.inner
            .file_names
            .get(name)
            .copied()
            .ok_or_else(|| Error::unresolved_type(name, referrer))
    }

    /// The file itself, its direct dependencies, and everything those re-export publicly
    fn visible_files(&self, file: usize) -> HashSet<usize> {
        let mut visible = HashSet::new();
        visible.insert(file);
        for &dep in &self.inner.files[file].dependencies {
            self.collect_public(dep, &mut visible);
        }
        visible
    }

    fn collect_public(&self, file: usize, visible: &mut HashSet<usize>) {
        if !visible.insert(file) {
            return;
        }
        for &dep in &self.inner.files[file].public_dependencies {
            self.collect_public(dep, visible);
        }
    }

    fn link_field(&mut self, pending: PendingField, visible: &HashSet<usize>) -> Result<()> {
        let referrer = self.inner.fields[pending.field].full_name.clone();

        let mut field_type = self.inner.fields[pending.field].field_type;
        let mut type_ref = None;
        match &pending.type_name {
            Some(type_name) => {
                let symbol = self
                    .resolve(type_name, &pending.scope, visible)
                    .ok_or_else(|| Error::unresolved_type(type_name, &referrer))?;
                let (resolved, inferred) = match symbol {
                    Symbol::Message(id) => (TypeRef::Message(id), FieldType::Message),
                    Symbol::Enum(id) => (TypeRef::Enum(id), FieldType::Enum),
                    _ => return Err(Error::unresolved_type(type_name, &referrer)),
                };
                if pending.declared_type.is_none() {
                    field_type = inferred;
                }
                let consistent = matches!(
                    (field_type, resolved),
                    (FieldType::Message | FieldType::Group, TypeRef::Message(_))
                        | (FieldType::Enum, TypeRef::Enum(_))
                );
                if !consistent {
                    return Err(Error::invalid_descriptor(format!(
                        "field '{}' is declared {} but '{}' is not",
                        referrer,
                        field_type.as_str(),
                        type_name
                    )));
                }
                type_ref = Some(resolved);
            }
            None => {
                if matches!(
                    pending.declared_type,
                    None | Some(ProtoType::Message | ProtoType::Group | ProtoType::Enum)
                ) {
                    return Err(Error::invalid_descriptor(format!(
                        "field '{}' does not name its type",
                        referrer
                    )));
                }
            }
        }

        if let Some(extendee) = &pending.extendee {
            let message = match self.resolve(extendee, &pending.scope, visible) {
                Some(Symbol::Message(id)) => id,
                _ => return Err(Error::unresolved_type(extendee, &referrer)),
            };
            let number = self.inner.fields[pending.field].number;
            let extended = &self.inner.messages[message];
            if !extended.extension_ranges.iter().any(|r| r.contains(&number)) {
                return Err(Error::invalid_descriptor(format!(
                    "extension '{}' uses number {} outside the extension ranges of '{}'",
                    referrer, number, extended.full_name
                )));
            }
            self.inner.fields[pending.field].containing_type = message;
        }

        let label = self.inner.fields[pending.field].label;
        let default_value = match (label, field_type.category(), type_ref) {
            (Label::Repeated, ..) | (_, super::FieldCategory::Message, _) => {
                if pending.default.is_some() {
                    return Err(Error::invalid_descriptor(format!(
                        "field '{}' cannot have a default value",
                        referrer
                    )));
                }
                None
            }
            (_, super::FieldCategory::Enum, Some(TypeRef::Enum(id))) => {
                let enum_inner = &self.inner.enums[id];
                let position = match &pending.default {
                    Some(name) => *enum_inner.value_names.get(name).ok_or_else(|| {
                        Error::invalid_descriptor(format!(
                            "field '{}' defaults to unknown value '{}' of '{}'",
                            referrer, name, enum_inner.full_name
                        ))
                    })?,
                    None => 0,
                };
                Some(Value::EnumNumber(enum_inner.values[position].number))
            }
            _ => Some(match &pending.default {
                Some(text) => parse_default(&referrer, field_type, text)?,
                None => zero_value(field_type),
            }),
        };

        let syntax = self.inner.files[self.inner.fields[pending.field].file].syntax;
        let packed = label == Label::Repeated
            && field_type.is_packable()
            && pending.packed.unwrap_or(syntax == Syntax::Proto3);

        let field = &mut self.inner.fields[pending.field];
        field.field_type = field_type;
        field.type_ref = type_ref;
        field.default_value = default_value;
        field.packed = packed;
        Ok(())
    }

    /// Resolves a type name as written in `scope`.
    ///
    /// Leading-dot names are absolute. Otherwise the first component is
    /// searched from the innermost scope outwards; once it names a message
    /// or package the remainder must resolve under it.
    fn resolve(&self, name: &str, scope: &str, visible: &HashSet<usize>) -> Option<Symbol> {
        if let Some(absolute) = name.strip_prefix('.') {
            return self.lookup_type(absolute, visible);
        }

        let (first, compound) = match name.split_once('.') {
            Some((first, _)) => (first, true),
            None => (name, false),
        };

        let mut scope = scope;
        loop {
            if let Some(symbol) = self.lookup_visible(&join_name(scope, first), visible) {
                if compound {
                    if matches!(symbol, Symbol::Message(_) | Symbol::Package) {
                        return self.lookup_type(&join_name(scope, name), visible);
                    }
                } else if matches!(symbol, Symbol::Message(_) | Symbol::Enum(_)) {
                    return Some(symbol);
                }
            }
            if scope.is_empty() {
                return None;
            }
            scope = scope.rfind('.').map_or("", |dot| &scope[..dot]);
        }
    }

    fn lookup_type(&self, full_name: &str, visible: &HashSet<usize>) -> Option<Symbol> {
        self.lookup_visible(full_name, visible)
            .filter(|symbol| matches!(symbol, Symbol::Message(_) | Symbol::Enum(_)))
    }

    fn lookup_visible(&self, full_name: &str, visible: &HashSet<usize>) -> Option<Symbol> {
        let symbol = *self.inner.symbols.get(full_name)?;
        let file = match symbol {
            Symbol::Package => return Some(symbol),
            Symbol::Message(id) => self.inner.messages[id].file,
            Symbol::Enum(id) | Symbol::EnumValue(id, _) => self.inner.enums[id].file,
            Symbol::Field(id) => self.inner.fields[id].file,
        };
        visible.contains(&file).then_some(symbol)
    }
}

fn join_name(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

/// `foo_bar_baz` -> `fooBarBaz`
fn to_json_name(name: &str) -> String {
    let mut json = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            json.extend(c.to_uppercase());
            upper = false;
        } else {
            json.push(c);
        }
    }
    json
}

fn zero_value(field_type: FieldType) -> Value {
    match field_type {
        FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => Value::I32(0),
        FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => Value::I64(0),
        FieldType::Uint32 | FieldType::Fixed32 => Value::U32(0),
        FieldType::Uint64 | FieldType::Fixed64 => Value::U64(0),
        FieldType::Float => Value::F32(0.0),
        FieldType::Double => Value::F64(0.0),
        FieldType::Bool => Value::Bool(false),
        FieldType::String => Value::String(String::new()),
        FieldType::Bytes => Value::Bytes(bytes::Bytes::new()),
        FieldType::Enum => Value::EnumNumber(0),
        FieldType::Message | FieldType::Group => Value::Bool(false),
    }
}

fn parse_default(field: &str, field_type: FieldType, text: &str) -> Result<Value> {
    let invalid = || {
        Error::invalid_descriptor(format!(
            "field '{}' has invalid default value '{}'",
            field, text
        ))
    };

    Ok(match field_type {
        FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 => {
            Value::I32(text.parse().map_err(|_| invalid())?)
        }
        FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64 => {
            Value::I64(text.parse().map_err(|_| invalid())?)
        }
        FieldType::Uint32 | FieldType::Fixed32 => Value::U32(text.parse().map_err(|_| invalid())?),
        FieldType::Uint64 | FieldType::Fixed64 => Value::U64(text.parse().map_err(|_| invalid())?),
        FieldType::Float => Value::F32(match special_float(text) {
            Some(value) => value as f32,
            None => text.parse().map_err(|_| invalid())?,
        }),
        FieldType::Double => Value::F64(match special_float(text) {
            Some(value) => value,
            None => text.parse().map_err(|_| invalid())?,
        }),
        FieldType::Bool => match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        FieldType::String => Value::String(text.to_string()),
        FieldType::Bytes => Value::Bytes(unescape_c(text).ok_or_else(invalid)?.into()),
        FieldType::Enum | FieldType::Message | FieldType::Group => return Err(invalid()),
    })
}

fn special_float(text: &str) -> Option<f64> {
    match text {
        "inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" => Some(f64::NAN),
        _ => None,
    }
}

/// Reverses C-style escaping as protoc applies it to `bytes` defaults
fn unescape_c(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }

        let escape = *bytes.get(i)?;
        i += 1;
        let decoded = match escape {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'v' => 0x0B,
            b'\\' | b'\'' | b'"' | b'?' => escape,
            b'0'..=b'7' => {
                let mut value = u32::from(escape - b'0');
                for _ in 0..2 {
                    match bytes.get(i) {
                        Some(&digit @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(digit - b'0');
                            i += 1;
                        }
                        _ => break,
                    }
                }
                u8::try_from(value).ok()?
            }
            b'x' | b'X' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match bytes.get(i).and_then(|&d| (d as char).to_digit(16)) {
                        Some(digit) => {
                            value = value * 16 + digit;
                            i += 1;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    return None;
                }
                value as u8
            }
            _ => return None,
        };
        out.push(decoded);
    }

    Some(out)
}
