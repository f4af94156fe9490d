//! Protobuf text format output.
//!
//! Fields print in number order, then extensions as `[full.name]`, then
//! unknown fields by number. Enum values print by name when declared;
//! unknown fixed-width values print in hex. Map entries always show both
//! `key` and `value`.

use crate::descriptor::{FieldDescriptor, FieldType};
use crate::message::{Message, ReflectMessage, UnknownField, UnknownFieldSet};
use crate::value::Value;
use crate::wire::{decode_varint, WireReader, WireType};
use std::fmt::{self, Write};

const INDENT: &str = "  ";

/// Renders `message` in text format
pub fn to_text(message: &impl ReflectMessage) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail
    let _ = write_text(message, &mut output);
    output
}

/// Writes `message` in text format to `w`
pub fn write_text(message: &impl ReflectMessage, w: &mut impl Write) -> fmt::Result {
    let mut writer = TextWriter {
        writer: w,
        indent_level: 0,
    };
    writer.write_fields(&message.set_fields(), message.unknown_fields())
}

struct TextWriter<'a, W: Write> {
    writer: &'a mut W,
    indent_level: usize,
}

impl<W: Write> TextWriter<'_, W> {
    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.indent_level {
            self.writer.write_str(INDENT)?;
        }
        Ok(())
    }

    fn write_fields(
        &mut self,
        fields: &[(FieldDescriptor, Value)],
        unknown: &UnknownFieldSet,
    ) -> fmt::Result {
        for (field, value) in fields {
            let name = field_label(field);
            match value {
                Value::List(items) => {
                    for item in items {
                        self.write_field(&name, field, item)?;
                    }
                }
                value => self.write_field(&name, field, value)?,
            }
        }
        for field in unknown {
            self.write_unknown(field)?;
        }
        Ok(())
    }

    fn write_field(&mut self, name: &str, field: &FieldDescriptor, value: &Value) -> fmt::Result {
        self.write_indent()?;
        match value {
            Value::Message(message) => {
                writeln!(self.writer, "{} {{", name)?;
                self.indent();
                if field.is_map() {
                    self.write_map_entry(message)?;
                } else {
                    self.write_fields(&message.set_fields(), message.unknown_fields())?;
                }
                self.dedent();
                self.write_indent()?;
                writeln!(self.writer, "}}")
            }
            value => writeln!(self.writer, "{}: {}", name, format_scalar(field, value)),
        }
    }

    fn write_map_entry(&mut self, entry: &Message) -> fmt::Result {
        for field in entry.descriptor().fields_in_number_order() {
            let value = entry.get(&field);
            self.write_field(field.name(), &field, &value)?;
        }
        Ok(())
    }

    fn write_unknown(&mut self, field: &UnknownField) -> fmt::Result {
        let data = field.data();
        self.write_indent()?;
        match field.wire_type() {
            WireType::Varint => match decode_varint(data) {
                Ok((value, _)) => writeln!(self.writer, "{}: {}", field.number(), value),
                Err(_) => self.write_raw(field.number(), data),
            },
            WireType::I32 => match <[u8; 4]>::try_from(data.as_ref()) {
                Ok(raw) => writeln!(self.writer, "{}: 0x{:08x}", field.number(), u32::from_le_bytes(raw)),
                Err(_) => self.write_raw(field.number(), data),
            },
            WireType::I64 => match <[u8; 8]>::try_from(data.as_ref()) {
                Ok(raw) => writeln!(self.writer, "{}: 0x{:016x}", field.number(), u64::from_le_bytes(raw)),
                Err(_) => self.write_raw(field.number(), data),
            },
            WireType::Len => match decode_varint(data) {
                Ok((_, prefix)) => self.write_raw(field.number(), &data[prefix..]),
                Err(_) => self.write_raw(field.number(), data),
            },
            WireType::StartGroup => match parse_group(data) {
                Some(inner) => {
                    writeln!(self.writer, "{} {{", field.number())?;
                    self.indent();
                    for field in &inner {
                        self.write_unknown(field)?;
                    }
                    self.dedent();
                    self.write_indent()?;
                    writeln!(self.writer, "}}")
                }
                None => self.write_raw(field.number(), data),
            },
            WireType::EndGroup => self.write_raw(field.number(), data),
        }
    }

    fn write_raw(&mut self, number: i32, data: &[u8]) -> fmt::Result {
        writeln!(self.writer, "{}: \"{}\"", number, escape_bytes(data))
    }
}

/// Name as printed: `[full.name]` for extensions, the type name for groups
fn field_label(field: &FieldDescriptor) -> String {
    if field.is_extension() {
        return format!("[{}]", field.full_name());
    }
    match (field.field_type(), field.message_type()) {
        (FieldType::Group, Some(group)) => group.name().to_string(),
        _ => field.name().to_string(),
    }
}

fn format_scalar(field: &FieldDescriptor, value: &Value) -> String {
    match value {
        Value::Bool(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) => format_float(f64::from(*v), v.to_string()),
        Value::F64(v) => format_float(*v, v.to_string()),
        Value::String(v) => format!("\"{}\"", escape_string(v)),
        Value::Bytes(v) => format!("\"{}\"", escape_bytes(v)),
        Value::EnumNumber(n) => field
            .enum_type()
            .and_then(|e| e.find_value_by_number(*n))
            .map(|v| v.name().to_string())
            .unwrap_or_else(|| n.to_string()),
        Value::Message(_) | Value::List(_) => String::new(),
    }
}

fn format_float(v: f64, shortest: String) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        shortest
    }
}

/// Body of an unknown group, through its end-group tag
fn parse_group(data: &[u8]) -> Option<Vec<UnknownField>> {
    let mut reader = WireReader::from_slice(data);
    let mut fields = Vec::new();
    loop {
        match reader.read_tag().ok()?? {
            (_, WireType::EndGroup) => return Some(fields),
            (number, wire_type) => {
                let raw = reader.read_raw_value(number, wire_type).ok()?;
                fields.push(UnknownField::from_wire(number, wire_type, raw));
            }
        }
    }
}

/// Escape a string for text format
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\'' => result.push_str("\\'"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                result.push_str(&format!("\\{:03o}", c as u8));
            }
            _ => result.push(c),
        }
    }
    result
}

/// Escape raw bytes; anything outside printable ASCII is octal
fn escape_bytes(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'\\' => result.push_str("\\\\"),
            b'"' => result.push_str("\\\""),
            b'\'' => result.push_str("\\'"),
            b'\n' => result.push_str("\\n"),
            b'\r' => result.push_str("\\r"),
            b'\t' => result.push_str("\\t"),
            0x20..=0x7e => result.push(b as char),
            _ => result.push_str(&format!("\\{:03o}", b)),
        }
    }
    result
}
