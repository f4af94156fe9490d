//! Typed field handles over the reflective store.

use super::{MessageBuilder, ReflectMessage};
use crate::descriptor::FieldDescriptor;
use crate::error::{Error, Result};
use crate::value::{ProtoValue, Value};
use std::fmt;
use std::marker::PhantomData;

/// A field (or extension) paired with the Rust type of its values.
///
/// The type is checked against the declared field type once, in
/// [`TypedField::new`]; afterwards reads cannot fail on a category mismatch.
///
/// ```no_run
/// # use protoloom_core::{DescriptorGraph, MessageBuilder, ReflectMessage, TypedField};
/// # fn demo(graph: &DescriptorGraph) -> protoloom_core::Result<()> {
/// let person = graph.get_message_by_name("tutorial.Person").unwrap();
/// let name = TypedField::<String>::new(person.find_field_by_name("name").unwrap())?;
///
/// let mut builder = MessageBuilder::new(&person);
/// name.set(&mut builder, "Ada".to_string())?;
/// assert_eq!(name.get(&builder.build()?)?, "Ada");
/// # Ok(())
/// # }
/// ```
pub struct TypedField<T> {
    field: FieldDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedField<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedField")
            .field("field", &self.field)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: ProtoValue> TypedField<T> {
    /// Wraps `field`, failing if `T` cannot represent its values
    pub fn new(field: FieldDescriptor) -> Result<Self> {
        if !T::accepts(field.field_type()) {
            return Err(Error::type_mismatch(
                field.full_name(),
                field.field_type().as_str(),
                std::any::type_name::<T>(),
            ));
        }
        Ok(Self {
            field,
            _marker: PhantomData,
        })
    }

    /// The underlying descriptor
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.field
    }

    fn extract(&self, value: &Value) -> Result<T> {
        T::from_value(value).ok_or_else(|| {
            Error::type_mismatch(
                self.field.full_name(),
                std::any::type_name::<T>(),
                value.kind_name(),
            )
        })
    }

    fn singular(&self) -> Result<()> {
        if self.field.is_repeated() {
            return Err(Error::type_mismatch(
                self.field.full_name(),
                "a singular field",
                "a repeated field",
            ));
        }
        Ok(())
    }

    /// Value of a singular field, or its default when unset
    pub fn get(&self, message: &impl ReflectMessage) -> Result<T> {
        self.singular()?;
        self.extract(&message.get(&self.field))
    }

    /// All elements of a repeated field
    pub fn get_all(&self, message: &impl ReflectMessage) -> Result<Vec<T>> {
        match message.get(&self.field) {
            Value::List(items) => items.iter().map(|item| self.extract(item)).collect(),
            other => Ok(vec![self.extract(&other)?]),
        }
    }

    /// See [`ReflectMessage::has`]
    pub fn has(&self, message: &impl ReflectMessage) -> bool {
        message.has(&self.field)
    }

    /// See [`ReflectMessage::count`]
    pub fn count(&self, message: &impl ReflectMessage) -> usize {
        message.count(&self.field)
    }

    /// One element of a repeated field
    pub fn get_at(&self, message: &impl ReflectMessage, index: usize) -> Result<T> {
        self.extract(&message.get_at(&self.field, index)?)
    }

    /// Sets a singular field
    pub fn set(&self, builder: &mut MessageBuilder, value: T) -> Result<()> {
        self.singular()?;
        builder.set(&self.field, value.into_value(self.field.field_type()))
    }

    /// Appends to a repeated field
    pub fn add(&self, builder: &mut MessageBuilder, value: T) -> Result<()> {
        builder.add(&self.field, value.into_value(self.field.field_type()))
    }

    /// Replaces one element of a repeated field
    pub fn set_at(&self, builder: &mut MessageBuilder, index: usize, value: T) -> Result<()> {
        builder.set_at(&self.field, index, value.into_value(self.field.field_type()))
    }

    /// Unsets the field
    pub fn clear(&self, builder: &mut MessageBuilder) {
        builder.clear(&self.field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::message::Message;
    use bytes::Bytes;

    #[test]
    fn test_typed_scalars() {
        let graph = fixtures::unittest_graph();
        let descriptor = fixtures::unittest_message(&graph, "TestAllTypes");
        let int64 =
            TypedField::<i64>::new(descriptor.find_field_by_name("optional_sint64").unwrap())
                .unwrap();
        let bytes =
            TypedField::<Bytes>::new(descriptor.find_field_by_name("optional_bytes").unwrap())
                .unwrap();

        let mut builder = MessageBuilder::new(&descriptor);
        int64.set(&mut builder, -42).unwrap();
        bytes.set(&mut builder, Bytes::from_static(b"\x00\x01")).unwrap();
        let message = builder.build().unwrap();

        assert_eq!(int64.get(&message).unwrap(), -42);
        assert_eq!(bytes.get(&message).unwrap(), Bytes::from_static(b"\x00\x01"));
        assert!(int64.has(&message));
    }

    #[test]
    fn test_new_checks_type_once() {
        let graph = fixtures::unittest_graph();
        let descriptor = fixtures::unittest_message(&graph, "TestAllTypes");
        let field = descriptor.find_field_by_name("optional_string").unwrap();
        assert!(matches!(
            TypedField::<i32>::new(field.clone()),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(TypedField::<String>::new(field).is_ok());
    }

    #[test]
    fn test_typed_repeated_and_enum() {
        let graph = fixtures::unittest_graph();
        let descriptor = fixtures::unittest_message(&graph, "TestAllTypes");
        let enums = TypedField::<i32>::new(
            descriptor.find_field_by_name("repeated_nested_enum").unwrap(),
        )
        .unwrap();

        let mut builder = MessageBuilder::new(&descriptor);
        enums.add(&mut builder, 1).unwrap();
        enums.add(&mut builder, 3).unwrap();
        enums.set_at(&mut builder, 0, 2).unwrap();
        assert!(enums.add(&mut builder, 42).is_err());
        assert!(enums.get(&builder).is_err());

        assert_eq!(enums.count(&builder), 2);
        assert_eq!(enums.get_all(&builder).unwrap(), vec![2, 3]);
        assert_eq!(enums.get_at(&builder, 1).unwrap(), 3);
        assert_eq!(
            builder.get_at(enums.descriptor(), 0).unwrap(),
            Value::EnumNumber(2)
        );

        enums.clear(&mut builder);
        assert_eq!(enums.count(&builder), 0);
    }

    #[test]
    fn test_typed_extension() {
        let graph = fixtures::unittest_graph();
        let extendable = fixtures::unittest_message(&graph, "TestAllExtensions");
        let ext = TypedField::<String>::new(
            graph
                .get_extension_by_name("protoloom_unittest.optional_string_extension")
                .unwrap(),
        )
        .unwrap();

        let mut builder = MessageBuilder::new(&extendable);
        assert!(!ext.has(&builder));
        ext.set(&mut builder, "ext".to_string()).unwrap();
        let message = builder.build().unwrap();
        assert_eq!(ext.get(&message).unwrap(), "ext");

        let mut wrong = MessageBuilder::new(&fixtures::unittest_message(&graph, "TestAllTypes"));
        assert!(matches!(
            ext.set(&mut wrong, "x".to_string()),
            Err(Error::ExtensionMismatch { .. })
        ));
    }

    #[test]
    fn test_typed_message_field() {
        let graph = fixtures::unittest_graph();
        let descriptor = fixtures::unittest_message(&graph, "TestAllTypes");
        let nested_type = descriptor.find_nested_message("NestedMessage").unwrap();
        let nested = TypedField::<Message>::new(
            descriptor.find_field_by_name("optional_nested_message").unwrap(),
        )
        .unwrap();
        let bb = TypedField::<i32>::new(nested_type.find_field_by_name("bb").unwrap()).unwrap();

        let mut child = MessageBuilder::new(&nested_type);
        bb.set(&mut child, 9).unwrap();
        let mut builder = MessageBuilder::new(&descriptor);
        nested.set(&mut builder, child.build().unwrap()).unwrap();

        let read = nested.get(&builder).unwrap();
        assert_eq!(bb.get(&read).unwrap(), 9);
    }
}
