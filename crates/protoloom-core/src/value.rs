//! Runtime field values and their conversion to and from Rust types.

use crate::descriptor::{FieldCategory, FieldDescriptor, FieldType};
use crate::error::{Error, Result};
use crate::message::Message;
use bytes::Bytes;

/// A single field value as stored by the runtime.
///
/// Repeated fields hold a [`Value::List`]; enum fields hold the raw number so
/// that open enums can carry values the schema does not declare.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `bool`
    Bool(bool),
    /// `int32`, `sint32`, `sfixed32`
    I32(i32),
    /// `int64`, `sint64`, `sfixed64`
    I64(i64),
    /// `uint32`, `fixed32`
    U32(u32),
    /// `uint64`, `fixed64`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Bytes),
    /// Enum value number
    EnumNumber(i32),
    /// Embedded message or group
    Message(Message),
    /// Elements of a repeated field
    List(Vec<Value>),
}

impl Value {
    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::EnumNumber(_) => "enum number",
            Value::Message(_) => "message",
            Value::List(_) => "list",
        }
    }

    #[allow(missing_docs)]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::U32(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_enum_number(&self) -> Option<i32> {
        match *self {
            Value::EnumNumber(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Checks that this value can be stored as one element of `field`
    pub(crate) fn check_element(&self, field: &FieldDescriptor) -> Result<()> {
        let accepted = match (field.field_type(), self) {
            (FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32, Value::I32(_))
            | (FieldType::Int64 | FieldType::Sint64 | FieldType::Sfixed64, Value::I64(_))
            | (FieldType::Uint32 | FieldType::Fixed32, Value::U32(_))
            | (FieldType::Uint64 | FieldType::Fixed64, Value::U64(_))
            | (FieldType::Float, Value::F32(_))
            | (FieldType::Double, Value::F64(_))
            | (FieldType::Bool, Value::Bool(_))
            | (FieldType::String, Value::String(_))
            | (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::Enum, Value::EnumNumber(number)) => {
                return match field.enum_type() {
                    Some(enum_type)
                        if enum_type.is_closed()
                            && enum_type.find_value_by_number(*number).is_none() =>
                    {
                        Err(Error::type_mismatch(
                            field.full_name(),
                            format!("a value of enum '{}'", enum_type.full_name()),
                            format!("undeclared number {}", number),
                        ))
                    }
                    _ => Ok(()),
                };
            }
            (FieldType::Message | FieldType::Group, Value::Message(message)) => {
                field.message_type().as_ref() == Some(message.descriptor())
            }
            _ => false,
        };

        if accepted {
            Ok(())
        } else {
            Err(Error::type_mismatch(
                field.full_name(),
                expected_name(field),
                self.kind_name(),
            ))
        }
    }

    /// Checks that this value can replace the whole content of `field`
    pub(crate) fn check_field(&self, field: &FieldDescriptor) -> Result<()> {
        match (field.is_repeated(), self) {
            (true, Value::List(items)) => items.iter().try_for_each(|item| item.check_element(field)),
            (true, other) => Err(Error::type_mismatch(
                field.full_name(),
                "list",
                other.kind_name(),
            )),
            (false, value) => value.check_element(field),
        }
    }
}

fn expected_name(field: &FieldDescriptor) -> String {
    match (field.category(), field.message_type()) {
        (FieldCategory::Message, Some(message_type)) => {
            format!("message '{}'", message_type.full_name())
        }
        _ => field.field_type().as_str().to_string(),
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    Bytes => Bytes,
    Message => Message,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// Rust types that map onto a field's value category.
///
/// This is the conversion layer behind [`TypedField`](crate::TypedField):
/// which declared types a Rust type may stand for is fixed per type, so a
/// typed handle is checked once when it is created.
pub trait ProtoValue: Sized {
    /// True if values of this type can be stored in fields of `field_type`
    fn accepts(field_type: FieldType) -> bool;

    /// Converts into a runtime value for a field of `field_type`
    fn into_value(self, field_type: FieldType) -> Value;

    /// Extracts from a runtime value
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! proto_value {
    ($ty:ty, $variant:ident, $($field_type:ident)|+) => {
        impl ProtoValue for $ty {
            fn accepts(field_type: FieldType) -> bool {
                matches!(field_type, $(FieldType::$field_type)|+)
            }

            fn into_value(self, _field_type: FieldType) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

proto_value!(bool, Bool, Bool);
proto_value!(i64, I64, Int64 | Sint64 | Sfixed64);
proto_value!(u32, U32, Uint32 | Fixed32);
proto_value!(u64, U64, Uint64 | Fixed64);
proto_value!(f32, F32, Float);
proto_value!(f64, F64, Double);
proto_value!(String, String, String);
proto_value!(Bytes, Bytes, Bytes);
proto_value!(Message, Message, Message | Group);

/// `i32` stands for both the 32-bit signed types and enum numbers
impl ProtoValue for i32 {
    fn accepts(field_type: FieldType) -> bool {
        matches!(
            field_type,
            FieldType::Int32 | FieldType::Sint32 | FieldType::Sfixed32 | FieldType::Enum
        )
    }

    fn into_value(self, field_type: FieldType) -> Value {
        match field_type {
            FieldType::Enum => Value::EnumNumber(self),
            _ => Value::I32(self),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match *value {
            Value::I32(v) | Value::EnumNumber(v) => Some(v),
            _ => None,
        }
    }
}
