//! Parsing loop: wire tags into a field store.

use super::{FieldStore, Message, RuntimeMode, UnknownField};
use crate::descriptor::{FieldCategory, FieldDescriptor, FieldType, MessageDescriptor};
use crate::error::{Error, Result};
use crate::extension::ExtensionRegistry;
use crate::value::Value;
use crate::wire::{decode_zigzag32, decode_zigzag64, WireReader, WireType};
use std::io::Read;
use tracing::trace;

struct DecodeContext<'a> {
    registry: &'a ExtensionRegistry,
    mode: RuntimeMode,
}

/// Merges fields read up to the end of the reader's current region into `store`
pub(crate) fn merge_from<R: Read>(
    store: &mut FieldStore,
    descriptor: &MessageDescriptor,
    reader: &mut WireReader<R>,
    registry: &ExtensionRegistry,
    mode: RuntimeMode,
) -> Result<()> {
    let ctx = DecodeContext { registry, mode };
    merge_fields(store, descriptor, reader, &ctx, None)
}

/// Reads fields until the region ends or, inside a group, until its end tag
fn merge_fields<R: Read>(
    store: &mut FieldStore,
    descriptor: &MessageDescriptor,
    reader: &mut WireReader<R>,
    ctx: &DecodeContext<'_>,
    group: Option<i32>,
) -> Result<()> {
    loop {
        let offset = reader.position();
        let (number, wire_type) = match reader.read_tag()? {
            Some(tag) => tag,
            None if group.is_some() => return Err(Error::truncated(reader.position())),
            None => return Ok(()),
        };

        if wire_type == WireType::EndGroup {
            if group == Some(number) {
                return Ok(());
            }
            return Err(Error::InvalidWireType {
                value: WireType::EndGroup as u8,
                offset,
            });
        }

        let field = descriptor
            .find_field_by_number(number)
            .or_else(|| ctx.registry.find_by_number(descriptor, number));

        match field {
            Some(field) if accepts_wire_type(&field, wire_type) => {
                trace!(field = field.full_name(), number, "decoding field");
                read_field(store, &field, wire_type, reader, ctx)?;
            }
            _ => {
                trace!(number, ?wire_type, "unknown field");
                let data = reader.read_raw_value(number, wire_type)?;
                if ctx.mode == RuntimeMode::Full {
                    store
                        .unknown_mut()
                        .push(UnknownField::from_wire(number, wire_type, data));
                }
            }
        }
    }
}

/// Packed runs are accepted for any packable repeated field; group fields
/// also accept length-delimited framing
fn accepts_wire_type(field: &FieldDescriptor, wire_type: WireType) -> bool {
    let field_type = field.field_type();
    wire_type == field.wire_type()
        || (wire_type == WireType::Len
            && (field_type == FieldType::Group
                || (field.is_repeated() && field_type.is_packable())))
}

fn read_field<R: Read>(
    store: &mut FieldStore,
    field: &FieldDescriptor,
    wire_type: WireType,
    reader: &mut WireReader<R>,
    ctx: &DecodeContext<'_>,
) -> Result<()> {
    if field.category() == FieldCategory::Message {
        return read_message_field(store, field, wire_type, reader, ctx);
    }

    if wire_type == WireType::Len && field.field_type().is_packable() {
        let len = reader.read_length()?;
        let previous = reader.push_limit(len)?;
        while !reader.is_at_end()? {
            let value = read_scalar(field, reader)?;
            store_scalar(store, field, value, ctx);
        }
        reader.pop_limit(previous);
        return Ok(());
    }

    let value = read_scalar(field, reader)?;
    store_scalar(store, field, value, ctx);
    Ok(())
}

/// Stores a decoded scalar: lists append, singular fields keep the last value
fn store_scalar(store: &mut FieldStore, field: &FieldDescriptor, value: Value, ctx: &DecodeContext<'_>) {
    if let Value::EnumNumber(number) = value {
        let undeclared = field.enum_type().map_or(false, |enum_type| {
            enum_type.is_closed() && enum_type.find_value_by_number(number).is_none()
        });
        if undeclared {
            // Closed enums keep undeclared numbers out of the field
            if ctx.mode == RuntimeMode::Full {
                store
                    .unknown_mut()
                    .push(UnknownField::varint(field.number(), number as i64 as u64));
            }
            return;
        }
    }

    if field.is_repeated() {
        store.list_mut(field).push(value);
    } else {
        store.insert(field, value);
    }
}

fn read_message_field<R: Read>(
    store: &mut FieldStore,
    field: &FieldDescriptor,
    wire_type: WireType,
    reader: &mut WireReader<R>,
    ctx: &DecodeContext<'_>,
) -> Result<()> {
    let message_type = field.message_type().ok_or_else(|| {
        Error::invalid_descriptor(format!("field '{}' has no message type", field.full_name()))
    })?;

    // A repeated occurrence makes a new element; a singular one merges into what is there
    let mut nested = if field.is_repeated() {
        FieldStore::default()
    } else {
        match store.take(field) {
            Some(Value::Message(existing)) => existing.into_store(),
            _ => FieldStore::default(),
        }
    };

    reader.enter_nested()?;
    if wire_type == WireType::StartGroup {
        merge_fields(&mut nested, &message_type, reader, ctx, Some(field.number()))?;
    } else {
        let len = reader.read_length()?;
        let previous = reader.push_limit(len)?;
        merge_fields(&mut nested, &message_type, reader, ctx, None)?;
        reader.pop_limit(previous);
    }
    reader.exit_nested();

    let value = Value::Message(Message::from_store(message_type, nested));
    if field.is_repeated() {
        store.push_element(field, value);
    } else {
        store.insert(field, value);
    }
    Ok(())
}

fn read_scalar<R: Read>(field: &FieldDescriptor, reader: &mut WireReader<R>) -> Result<Value> {
    Ok(match field.field_type() {
        FieldType::Int32 => Value::I32(reader.read_varint()? as i32),
        FieldType::Int64 => Value::I64(reader.read_varint()? as i64),
        FieldType::Uint32 => Value::U32(reader.read_varint()? as u32),
        FieldType::Uint64 => Value::U64(reader.read_varint()?),
        FieldType::Sint32 => Value::I32(decode_zigzag32(reader.read_varint()? as u32)),
        FieldType::Sint64 => Value::I64(decode_zigzag64(reader.read_varint()?)),
        FieldType::Bool => Value::Bool(reader.read_varint()? != 0),
        FieldType::Enum => Value::EnumNumber(reader.read_varint()? as i32),
        FieldType::Fixed32 => Value::U32(reader.read_fixed32()?),
        FieldType::Sfixed32 => Value::I32(reader.read_fixed32()? as i32),
        FieldType::Float => Value::F32(f32::from_bits(reader.read_fixed32()?)),
        FieldType::Fixed64 => Value::U64(reader.read_fixed64()?),
        FieldType::Sfixed64 => Value::I64(reader.read_fixed64()? as i64),
        FieldType::Double => Value::F64(f64::from_bits(reader.read_fixed64()?)),
        FieldType::String => {
            let bytes = reader.read_length_delimited()?;
            let text = String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8 {
                field: field.full_name().to_string(),
            })?;
            Value::String(text)
        }
        FieldType::Bytes => Value::Bytes(reader.read_length_delimited()?),
        FieldType::Message | FieldType::Group => {
            return Err(Error::type_mismatch(
                field.full_name(),
                "a scalar field",
                "a message field",
            ))
        }
    })
}
