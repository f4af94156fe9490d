//! Serialization: declared fields by number, then unknown fields, then extensions.

use super::{omits_default, FieldStore, Message};
use crate::descriptor::{FieldDescriptor, FieldType, MessageDescriptor};
use crate::error::{Error, Result};
use crate::value::Value;
use crate::wire::{
    encode_varint, encode_zigzag32, encode_zigzag64, encoded_len_varint, tag_len, WireType,
    WireWriter,
};
use bytes::BufMut;

impl Message {
    /// Serializes into `buf`
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut writer = WireWriter::with_buffer(buf);
        encode_store(&self.descriptor, &self.store, &mut writer)
    }

    /// Serializes into a new buffer
    pub fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Serializes with a varint length prefix
    pub fn encode_length_delimited_to_vec(&self) -> Result<Vec<u8>> {
        let len = self.encoded_len();
        let mut buf = Vec::with_capacity(len + encoded_len_varint(len as u64));
        encode_varint(len as u64, &mut buf);
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Exact size of [`encode`](Self::encode)'s output
    pub fn encoded_len(&self) -> usize {
        *self
            .encoded_len
            .get_or_init(|| store_len(&self.descriptor, &self.store))
    }
}

fn encode_store<B: BufMut>(
    descriptor: &MessageDescriptor,
    store: &FieldStore,
    writer: &mut WireWriter<B>,
) -> Result<()> {
    for (&number, value) in &store.fields {
        if let Some(field) = descriptor.find_field_by_number(number) {
            encode_field(&field, value, writer)?;
        }
    }
    store.unknown.encode(writer)?;
    for (field, value) in store.extensions.values() {
        encode_field(field, value, writer)?;
    }
    Ok(())
}

fn store_len(descriptor: &MessageDescriptor, store: &FieldStore) -> usize {
    let declared: usize = store
        .fields
        .iter()
        .filter_map(|(&number, value)| {
            Some(field_len(&descriptor.find_field_by_number(number)?, value))
        })
        .sum();
    let extensions: usize = store
        .extensions
        .values()
        .map(|(field, value)| field_len(field, value))
        .sum();
    declared + store.unknown.encoded_len() + extensions
}

fn encode_field<B: BufMut>(
    field: &FieldDescriptor,
    value: &Value,
    writer: &mut WireWriter<B>,
) -> Result<()> {
    match value {
        Value::List(items) if items.is_empty() => Ok(()),
        Value::List(items) if field.is_packed() => {
            let body: usize = items.iter().map(|item| payload_len(field, item)).sum();
            writer.write_tag(field.number(), WireType::Len)?;
            writer.write_varint(body as u64);
            items
                .iter()
                .try_for_each(|item| encode_payload(field, item, writer))
        }
        Value::List(items) => items
            .iter()
            .try_for_each(|item| encode_element(field, item, writer)),
        value if omits_default(field, value) => Ok(()),
        value => encode_element(field, value, writer),
    }
}

fn field_len(field: &FieldDescriptor, value: &Value) -> usize {
    match value {
        Value::List(items) if items.is_empty() => 0,
        Value::List(items) if field.is_packed() => {
            let body: usize = items.iter().map(|item| payload_len(field, item)).sum();
            tag_len(field.number()) + encoded_len_varint(body as u64) + body
        }
        Value::List(items) => items
            .iter()
            .map(|item| tag_len(field.number()) + payload_len(field, item))
            .sum(),
        value if omits_default(field, value) => 0,
        value => tag_len(field.number()) + payload_len(field, value),
    }
}

/// Groups are written length-delimited like any other message
fn element_wire_type(field: &FieldDescriptor) -> WireType {
    match field.field_type() {
        FieldType::Group => WireType::Len,
        other => other.wire_type(),
    }
}

fn encode_element<B: BufMut>(
    field: &FieldDescriptor,
    value: &Value,
    writer: &mut WireWriter<B>,
) -> Result<()> {
    writer.write_tag(field.number(), element_wire_type(field))?;
    encode_payload(field, value, writer)
}

fn mismatch(field: &FieldDescriptor, value: &Value) -> Error {
    Error::type_mismatch(field.full_name(), field.field_type().as_str(), value.kind_name())
}

/// Varint form of a scalar, `None` for fixed-width and length-delimited types
fn varint_value(field_type: FieldType, value: &Value) -> Option<u64> {
    Some(match (field_type, value) {
        // int32 is sign-extended, so negatives take ten bytes
        (FieldType::Int32, Value::I32(v)) => *v as i64 as u64,
        (FieldType::Int64, Value::I64(v)) => *v as u64,
        (FieldType::Uint32, Value::U32(v)) => u64::from(*v),
        (FieldType::Uint64, Value::U64(v)) => *v,
        (FieldType::Sint32, Value::I32(v)) => u64::from(encode_zigzag32(*v)),
        (FieldType::Sint64, Value::I64(v)) => encode_zigzag64(*v),
        (FieldType::Bool, Value::Bool(v)) => u64::from(*v),
        (FieldType::Enum, Value::EnumNumber(v)) => *v as i64 as u64,
        _ => return None,
    })
}

fn encode_payload<B: BufMut>(
    field: &FieldDescriptor,
    value: &Value,
    writer: &mut WireWriter<B>,
) -> Result<()> {
    if let Some(raw) = varint_value(field.field_type(), value) {
        writer.write_varint(raw);
        return Ok(());
    }
    match (field.field_type(), value) {
        (FieldType::Fixed32, Value::U32(v)) => writer.write_fixed32(*v),
        (FieldType::Sfixed32, Value::I32(v)) => writer.write_fixed32(*v as u32),
        (FieldType::Float, Value::F32(v)) => writer.write_fixed32(v.to_bits()),
        (FieldType::Fixed64, Value::U64(v)) => writer.write_fixed64(*v),
        (FieldType::Sfixed64, Value::I64(v)) => writer.write_fixed64(*v as u64),
        (FieldType::Double, Value::F64(v)) => writer.write_fixed64(v.to_bits()),
        (FieldType::String, Value::String(v)) => writer.write_length_delimited(v.as_bytes()),
        (FieldType::Bytes, Value::Bytes(v)) => writer.write_length_delimited(v),
        (FieldType::Message | FieldType::Group, Value::Message(message)) => {
            writer.write_varint(message.encoded_len() as u64);
            encode_store(&message.descriptor, &message.store, writer)?;
        }
        _ => return Err(mismatch(field, value)),
    }
    Ok(())
}

fn payload_len(field: &FieldDescriptor, value: &Value) -> usize {
    if let Some(raw) = varint_value(field.field_type(), value) {
        return encoded_len_varint(raw);
    }
    match value {
        Value::U32(_) | Value::I32(_) | Value::F32(_) => 4,
        Value::U64(_) | Value::I64(_) | Value::F64(_) => 8,
        Value::String(v) => encoded_len_varint(v.len() as u64) + v.len(),
        Value::Bytes(v) => encoded_len_varint(v.len() as u64) + v.len(),
        Value::Message(message) => {
            let len = message.encoded_len();
            encoded_len_varint(len as u64) + len
        }
        Value::Bool(_) | Value::EnumNumber(_) | Value::List(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionRegistry;
    use crate::fixtures::{self, NestedMessageOracle, TestAllTypesOracle};
    use crate::message::{DecodeOptions, MessageBuilder, ReflectMessage, RuntimeMode};
    use prost::Message as _;
    use pretty_assertions::assert_eq;

    fn all_types() -> MessageDescriptor {
        fixtures::unittest_message(&fixtures::unittest_graph(), "TestAllTypes")
    }

    fn set(builder: &mut MessageBuilder, name: &str, value: Value) {
        let field = builder.descriptor().find_field_by_name(name).unwrap();
        builder.set(&field, value).unwrap();
    }

    fn populated(descriptor: &MessageDescriptor) -> Message {
        let nested_type = descriptor.find_nested_message("NestedMessage").unwrap();
        let mut nested = MessageBuilder::new(&nested_type);
        set(&mut nested, "bb", Value::I32(1500));
        let nested = nested.build().unwrap();

        let mut builder = MessageBuilder::new(descriptor);
        set(&mut builder, "optional_int32", Value::I32(-5));
        set(&mut builder, "optional_int64", Value::I64(i64::MAX));
        set(&mut builder, "optional_uint32", Value::U32(u32::MAX));
        set(&mut builder, "optional_uint64", Value::U64(u64::MAX));
        set(&mut builder, "optional_sint32", Value::I32(i32::MIN));
        set(&mut builder, "optional_sint64", Value::I64(-300));
        set(&mut builder, "optional_fixed32", Value::U32(7));
        set(&mut builder, "optional_fixed64", Value::U64(8));
        set(&mut builder, "optional_sfixed32", Value::I32(-9));
        set(&mut builder, "optional_sfixed64", Value::I64(-10));
        set(&mut builder, "optional_float", Value::F32(1.5));
        set(&mut builder, "optional_double", Value::F64(-2.25));
        set(&mut builder, "optional_bool", Value::Bool(true));
        set(&mut builder, "optional_string", Value::from("héllo"));
        set(&mut builder, "optional_bytes", Value::Bytes(vec![0, 255].into()));
        set(&mut builder, "optional_nested_message", Value::Message(nested.clone()));
        set(&mut builder, "optional_nested_enum", Value::EnumNumber(3));
        set(
            &mut builder,
            "repeated_int32",
            Value::List(vec![Value::I32(1), Value::I32(-1)]),
        );
        set(
            &mut builder,
            "repeated_string",
            Value::List(vec![Value::from("a"), Value::from("b")]),
        );
        set(
            &mut builder,
            "repeated_nested_message",
            Value::List(vec![Value::Message(nested)]),
        );
        set(
            &mut builder,
            "packed_sint64",
            Value::List(vec![Value::I64(-1), Value::I64(0), Value::I64(1 << 40)]),
        );
        builder.build().unwrap()
    }

    #[test]
    fn test_matches_prost_encoding() {
        let message = populated(&all_types());
        let oracle = TestAllTypesOracle {
            optional_int32: Some(-5),
            optional_int64: Some(i64::MAX),
            optional_uint32: Some(u32::MAX),
            optional_uint64: Some(u64::MAX),
            optional_sint32: Some(i32::MIN),
            optional_sint64: Some(-300),
            optional_fixed32: Some(7),
            optional_fixed64: Some(8),
            optional_sfixed32: Some(-9),
            optional_sfixed64: Some(-10),
            optional_float: Some(1.5),
            optional_double: Some(-2.25),
            optional_bool: Some(true),
            optional_string: Some("héllo".to_string()),
            optional_bytes: Some(vec![0, 255]),
            optional_nested_message: Some(NestedMessageOracle { bb: Some(1500) }),
            optional_nested_enum: Some(3),
            repeated_int32: vec![1, -1],
            repeated_string: vec!["a".into(), "b".into()],
            repeated_nested_message: vec![NestedMessageOracle { bb: Some(1500) }],
            packed_sint64: vec![-1, 0, 1 << 40],
        };

        let bytes = message.encode_to_vec().unwrap();
        assert_eq!(bytes, oracle.encode_to_vec());
        assert_eq!(message.encoded_len(), bytes.len());
        assert_eq!(TestAllTypesOracle::decode(bytes.as_slice()).unwrap(), oracle);
    }

    #[test]
    fn test_round_trip() {
        let descriptor = all_types();
        let message = populated(&descriptor);
        let bytes = message.encode_to_vec().unwrap();
        let parsed = Message::decode(&descriptor, &bytes).unwrap();
        assert_eq!(parsed, message);
        for field in descriptor.fields() {
            assert_eq!(parsed.get(&field), message.get(&field), "{}", field.name());
        }
    }

    #[test]
    fn test_fields_written_in_number_order() {
        let graph = fixtures::unittest_graph();
        let orderings = fixtures::unittest_message(&graph, "TestFieldOrderings");
        let mut builder = MessageBuilder::new(&orderings);
        set(&mut builder, "my_float", Value::F32(1.0));
        set(&mut builder, "my_string", Value::from("s"));
        set(&mut builder, "my_int", Value::I64(1));

        let bytes = builder.build().unwrap().encode_to_vec().unwrap();
        // my_int (1), my_string (11), my_float (101)
        assert_eq!(
            bytes,
            vec![0x08, 0x01, 0x5A, 0x01, b's', 0xAD, 0x06, 0x00, 0x00, 0x80, 0x3F]
        );
    }

    #[test]
    fn test_unknown_before_extensions() {
        let graph = fixtures::unittest_graph();
        let extendable = fixtures::unittest_message(&graph, "TestAllExtensions");
        let ext = graph
            .get_extension_by_name("protoloom_unittest.optional_int32_extension")
            .unwrap();

        // Unknown field 5 parsed first
        let mut builder = MessageBuilder::new(&extendable);
        builder
            .merge_from_bytes(&[0x28, 0x07], ExtensionRegistry::empty(), &DecodeOptions::default())
            .unwrap();
        builder.set(&ext, Value::I32(3)).unwrap();

        let bytes = builder.build().unwrap().encode_to_vec().unwrap();
        assert_eq!(bytes, vec![0x28, 0x07, 0x08, 0x03]);
    }

    #[test]
    fn test_defaults_omitted() {
        let descriptor = all_types();
        let mut builder = MessageBuilder::new(&descriptor);
        set(&mut builder, "optional_int32", Value::I32(0));
        set(&mut builder, "default_int32", Value::I32(41));
        set(&mut builder, "default_string", Value::from("hello"));
        let message = builder.build().unwrap();
        assert!(message.encode_to_vec().unwrap().is_empty());
        assert_eq!(message.encoded_len(), 0);

        // A value differing from the declared default is written, even zero
        let mut builder = MessageBuilder::new(&descriptor);
        set(&mut builder, "default_int32", Value::I32(0));
        let bytes = builder.build().unwrap().encode_to_vec().unwrap();
        assert_eq!(bytes, vec![0xE8, 0x03, 0x00]);
    }

    #[test]
    fn test_empty_nested_message_written() {
        let descriptor = all_types();
        let nested_type = descriptor.find_nested_message("NestedMessage").unwrap();
        let mut builder = MessageBuilder::new(&descriptor);
        set(
            &mut builder,
            "optional_nested_message",
            Value::Message(Message::default_instance(&nested_type)),
        );
        let bytes = builder.build().unwrap().encode_to_vec().unwrap();
        assert_eq!(bytes, vec![0x92, 0x01, 0x00]);
    }

    #[test]
    fn test_required_fields_written_at_default() {
        let graph = fixtures::unittest_graph();
        let required = fixtures::unittest_message(&graph, "TestRequired");
        let mut builder = MessageBuilder::new(&required);
        set(&mut builder, "a", Value::I32(0));
        set(&mut builder, "b", Value::I32(0));
        let bytes = builder.build().unwrap().encode_to_vec().unwrap();
        assert_eq!(bytes, vec![0x08, 0x00, 0x18, 0x00]);
    }

    #[test]
    fn test_unknown_fields_round_trip_exactly() {
        let bytes = [
            0x08, 0x01, // optional_int32
            0xC0, 0x3E, 0x96, 0x01, // 1000: varint
            0xDB, 0x3E, 0x08, 0x05, 0xDC, 0x3E, // 1003: group
            0xCA, 0x3E, 0x02, b'h', b'i', // 1001: len
        ];
        let message = Message::decode(&all_types(), &bytes).unwrap();
        assert_eq!(message.encode_to_vec().unwrap(), bytes.to_vec());
        assert_eq!(message.encoded_len(), bytes.len());
    }

    #[test]
    fn test_group_field_written_length_delimited() {
        let bytes = [0x83, 0x01, 0x88, 0x01, 0x05, 0x84, 0x01];
        let descriptor = all_types();
        let message = Message::decode(&descriptor, &bytes).unwrap();
        let written = message.encode_to_vec().unwrap();
        assert_eq!(written, vec![0x82, 0x01, 0x03, 0x88, 0x01, 0x05]);
        assert_eq!(Message::decode(&descriptor, &written).unwrap(), message);
    }

    #[test]
    fn test_lite_parse_strips_unrecognized_fields() {
        let graph = fixtures::unittest_graph();
        let full = fixtures::unittest_message(&graph, "TestAllTypes");
        let lite = graph
            .get_message_by_name("protoloom_unittest_lite.TestAllTypesLite")
            .unwrap();

        let mut builder = MessageBuilder::new(&full);
        set(&mut builder, "optional_int64", Value::I64(5));
        set(&mut builder, "repeated_int32", Value::List(vec![Value::I32(1)]));
        let bytes = builder.build().unwrap().encode_to_vec().unwrap();

        let options = DecodeOptions::new().mode(RuntimeMode::Lite);
        let parsed = Message::decode_with(&lite, &bytes, ExtensionRegistry::empty(), &options)
            .unwrap();
        assert!(parsed.set_fields().is_empty());
        assert!(parsed.encode_to_vec().unwrap().is_empty());

        set(&mut builder, "optional_int32", Value::I32(9));
        let bytes = builder.build().unwrap().encode_to_vec().unwrap();
        let parsed = Message::decode_with(&lite, &bytes, ExtensionRegistry::empty(), &options)
            .unwrap();
        assert_eq!(parsed.encode_to_vec().unwrap(), vec![0x08, 0x09]);
    }

    #[test]
    fn test_proto3_packs_by_default() {
        let graph = fixtures::unittest_graph();
        let proto3 = graph.get_message_by_name("protoloom_proto3.TestProto3").unwrap();
        let mut builder = MessageBuilder::new(&proto3);
        let values = Value::List(vec![Value::I32(1), Value::I32(2)]);
        set(&mut builder, "repeated_int32", values.clone());
        set(&mut builder, "unpacked_int32", values);
        let bytes = builder.build().unwrap().encode_to_vec().unwrap();
        assert_eq!(
            bytes,
            vec![0x12, 0x02, 0x01, 0x02, 0x20, 0x01, 0x20, 0x02]
        );
    }

    #[test]
    fn test_length_delimited() {
        let message = populated(&all_types());
        let framed = message.encode_length_delimited_to_vec().unwrap();
        let parsed = Message::decode_length_delimited(
            message.descriptor(),
            &framed,
            ExtensionRegistry::empty(),
            &DecodeOptions::default(),
        )
        .unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_field_set_to_default_round_trips() {
        let descriptor = all_types();
        let field = descriptor.find_field_by_name("optional_int32").unwrap();
        let mut builder = MessageBuilder::new(&descriptor);
        builder.set(&field, Value::I32(7)).unwrap();
        builder.set(&field, Value::I32(0)).unwrap();
        assert!(!builder.has(&field));

        let message = builder.build().unwrap();
        let bytes = message.encode_to_vec().unwrap();
        assert!(bytes.is_empty());
        assert_eq!(Message::decode(&descriptor, &bytes).unwrap(), message);

        // An explicit default on the wire reads as absent as well
        let parsed = Message::decode(&descriptor, &[0x08, 0x00]).unwrap();
        assert!(!parsed.has(&field));
        assert_eq!(parsed, Message::default_instance(&descriptor));
    }

    #[test]
    fn test_deep_nesting_computes_each_length_once() {
        let graph = fixtures::unittest_graph();
        let recursive = fixtures::unittest_message(&graph, "TestRecursive");
        let a = recursive.find_field_by_name("a").unwrap();
        let i = recursive.find_field_by_name("i").unwrap();

        let mut message = Message::default_instance(&recursive);
        for depth in 0..40 {
            let mut builder = MessageBuilder::new(&recursive);
            builder.set(&a, Value::Message(message)).unwrap();
            builder.set(&i, Value::I32(depth + 1)).unwrap();
            message = builder.build().unwrap();
        }

        let bytes = message.encode_to_vec().unwrap();
        assert_eq!(message.encoded_len.get(), Some(&bytes.len()));
        let inner = message.get(&a);
        let inner = inner.as_message().unwrap();
        assert_eq!(inner.encoded_len.get(), Some(&inner.encoded_len()));
        assert_eq!(Message::decode(&recursive, &bytes).unwrap(), message);
    }
}
