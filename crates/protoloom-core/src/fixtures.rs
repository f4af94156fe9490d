//! Unit-test schema shared by the test modules.
//!
//! Built directly from descriptor protos the way `protoc --descriptor_set_out`
//! would emit them, plus prost-derived structs mirroring a few of the messages
//! for checking our wire output against an independent encoder.

use crate::descriptor::{DescriptorGraph, MessageDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    descriptor_proto::ExtensionRange, DescriptorProto, EnumDescriptorProto, EnumOptions,
    EnumValueDescriptorProto, FieldDescriptorProto, FieldOptions, FileDescriptorProto,
    FileDescriptorSet, MessageOptions,
};

pub(crate) const UNITTEST_PACKAGE: &str = "protoloom_unittest";

pub(crate) fn field(name: &str, number: i32, label: Label, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

pub(crate) fn message_field(
    name: &str,
    number: i32,
    label: Label,
    ty: Type,
    type_name: &str,
) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, label, ty)
    }
}

fn with_default(mut field: FieldDescriptorProto, default: &str) -> FieldDescriptorProto {
    field.default_value = Some(default.to_string());
    field
}

fn packed(mut field: FieldDescriptorProto, packed: bool) -> FieldDescriptorProto {
    field.options = Some(FieldOptions {
        packed: Some(packed),
        ..Default::default()
    });
    field
}

fn extension(
    mut field: FieldDescriptorProto,
    extendee: &str,
) -> FieldDescriptorProto {
    field.extendee = Some(extendee.to_string());
    field
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: fields,
        ..Default::default()
    }
}

/// The synthetic entry type `protoc` emits for a `map<K, V>` field
fn map_entry(name: &str, key: FieldDescriptorProto, value: FieldDescriptorProto) -> DescriptorProto {
    let mut entry = message(name, vec![key, value]);
    entry.options = Some(MessageOptions {
        map_entry: Some(true),
        ..Default::default()
    });
    entry
}

fn enumeration(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(*number),
                options: None,
            })
            .collect(),
        ..Default::default()
    }
}

fn file(name: &str, package: &str, syntax: &str) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_string()),
        package: Some(package.to_string()),
        syntax: Some(syntax.to_string()),
        ..Default::default()
    }
}

fn import_public_file() -> FileDescriptorProto {
    let mut file = file(
        "protoloom/unittest_import_public.proto",
        "protoloom_import",
        "proto2",
    );
    file.message_type = vec![message(
        "PublicImportMessage",
        vec![field("e", 1, Label::Optional, Type::Int32)],
    )];
    file
}

fn import_file() -> FileDescriptorProto {
    let mut file = file("protoloom/unittest_import.proto", "protoloom_import", "proto2");
    file.dependency = vec!["protoloom/unittest_import_public.proto".to_string()];
    file.public_dependency = vec![0];
    file.message_type = vec![message(
        "ImportMessage",
        vec![field("d", 1, Label::Optional, Type::Int32)],
    )];
    file.enum_type = vec![enumeration(
        "ImportEnum",
        &[("IMPORT_FOO", 7), ("IMPORT_BAR", 8), ("IMPORT_BAZ", 9)],
    )];
    file
}

fn test_all_types() -> DescriptorProto {
    use Label::{Optional, Repeated};

    let mut all_types = message(
        "TestAllTypes",
        vec![
            field("optional_int32", 1, Optional, Type::Int32),
            field("optional_int64", 2, Optional, Type::Int64),
            field("optional_uint32", 3, Optional, Type::Uint32),
            field("optional_uint64", 4, Optional, Type::Uint64),
            field("optional_sint32", 5, Optional, Type::Sint32),
            field("optional_sint64", 6, Optional, Type::Sint64),
            field("optional_fixed32", 7, Optional, Type::Fixed32),
            field("optional_fixed64", 8, Optional, Type::Fixed64),
            field("optional_sfixed32", 9, Optional, Type::Sfixed32),
            field("optional_sfixed64", 10, Optional, Type::Sfixed64),
            field("optional_float", 11, Optional, Type::Float),
            field("optional_double", 12, Optional, Type::Double),
            field("optional_bool", 13, Optional, Type::Bool),
            field("optional_string", 14, Optional, Type::String),
            field("optional_bytes", 15, Optional, Type::Bytes),
            message_field(
                "optionalgroup",
                16,
                Optional,
                Type::Group,
                ".protoloom_unittest.TestAllTypes.OptionalGroup",
            ),
            message_field("optional_nested_message", 18, Optional, Type::Message, "NestedMessage"),
            message_field(
                "optional_foreign_message",
                19,
                Optional,
                Type::Message,
                ".protoloom_unittest.ForeignMessage",
            ),
            message_field(
                "optional_import_message",
                20,
                Optional,
                Type::Message,
                "protoloom_import.ImportMessage",
            ),
            message_field("optional_nested_enum", 21, Optional, Type::Enum, "NestedEnum"),
            message_field("optional_foreign_enum", 22, Optional, Type::Enum, "ForeignEnum"),
            message_field(
                "optional_public_import_message",
                26,
                Optional,
                Type::Message,
                "protoloom_import.PublicImportMessage",
            ),
            field("repeated_int32", 31, Repeated, Type::Int32),
            field("repeated_string", 44, Repeated, Type::String),
            message_field(
                "repeated_nested_message",
                48,
                Repeated,
                Type::Message,
                ".protoloom_unittest.TestAllTypes.NestedMessage",
            ),
            message_field("repeated_nested_enum", 51, Repeated, Type::Enum, "NestedEnum"),
            with_default(field("default_int32", 61, Optional, Type::Int32), "41"),
            with_default(field("default_string", 74, Optional, Type::String), "hello"),
            with_default(field("default_bytes", 75, Optional, Type::Bytes), "wor\\001d"),
            with_default(
                message_field("default_nested_enum", 81, Optional, Type::Enum, "NestedEnum"),
                "BAR",
            ),
            packed(field("packed_sint64", 90, Repeated, Type::Sint64), true),
        ],
    );
    all_types.nested_type = vec![
        message("NestedMessage", vec![field("bb", 1, Optional, Type::Int32)]),
        message("OptionalGroup", vec![field("a", 17, Optional, Type::Int32)]),
    ];
    all_types.enum_type = vec![enumeration(
        "NestedEnum",
        &[("FOO", 1), ("BAR", 2), ("BAZ", 3), ("NEG", -1)],
    )];
    all_types
}

fn unittest_file() -> FileDescriptorProto {
    use Label::{Optional, Repeated, Required};
    const EXTENDABLE: &str = ".protoloom_unittest.TestAllExtensions";

    let mut file = file("protoloom/unittest.proto", UNITTEST_PACKAGE, "proto2");
    file.dependency = vec!["protoloom/unittest_import.proto".to_string()];

    let mut all_extensions = message("TestAllExtensions", Vec::new());
    all_extensions.extension_range = vec![ExtensionRange {
        start: Some(1),
        end: Some(536_870_912),
        options: None,
    }];

    let mut required = message(
        "TestRequired",
        vec![
            field("a", 1, Required, Type::Int32),
            field("dummy2", 2, Optional, Type::Int32),
            field("b", 3, Required, Type::Int32),
        ],
    );
    required.extension = vec![extension(
        message_field("single", 1000, Optional, Type::Message, "TestRequired"),
        EXTENDABLE,
    )];

    let mut alias = enumeration(
        "TestEnumWithAlias",
        &[("ALIAS_FOO", 1), ("ALIAS_BAR", 2), ("ALIAS_ALT_BAR", 2)],
    );
    alias.options = Some(EnumOptions {
        allow_alias: Some(true),
        ..Default::default()
    });

    let mut maps = message(
        "TestMap",
        vec![
            message_field("map_int32_int32", 1, Repeated, Type::Message, "MapInt32Int32Entry"),
            message_field(
                "map_string_foreign_message",
                2,
                Repeated,
                Type::Message,
                "MapStringForeignMessageEntry",
            ),
        ],
    );
    maps.nested_type = vec![
        map_entry(
            "MapInt32Int32Entry",
            field("key", 1, Optional, Type::Int32),
            field("value", 2, Optional, Type::Int32),
        ),
        map_entry(
            "MapStringForeignMessageEntry",
            field("key", 1, Optional, Type::String),
            message_field("value", 2, Optional, Type::Message, "ForeignMessage"),
        ),
    ];

    file.message_type = vec![
        test_all_types(),
        message("ForeignMessage", vec![field("c", 1, Optional, Type::Int32)]),
        all_extensions,
        required,
        message(
            "TestRequiredForeign",
            vec![
                message_field("optional_message", 1, Optional, Type::Message, "TestRequired"),
                message_field("repeated_message", 2, Repeated, Type::Message, "TestRequired"),
                field("dummy", 3, Optional, Type::Int32),
            ],
        ),
        message(
            "TestRecursive",
            vec![
                message_field("a", 1, Optional, Type::Message, "TestRecursive"),
                field("i", 2, Optional, Type::Int32),
            ],
        ),
        message(
            "TestFieldOrderings",
            vec![
                field("my_string", 11, Optional, Type::String),
                field("my_int", 1, Optional, Type::Int64),
                field("my_float", 101, Optional, Type::Float),
            ],
        ),
        maps,
    ];
    file.enum_type = vec![
        enumeration(
            "ForeignEnum",
            &[("FOREIGN_FOO", 4), ("FOREIGN_BAR", 5), ("FOREIGN_BAZ", 6)],
        ),
        alias,
    ];
    file.extension = vec![
        extension(
            field("optional_int32_extension", 1, Optional, Type::Int32),
            EXTENDABLE,
        ),
        extension(
            field("optional_string_extension", 14, Optional, Type::String),
            EXTENDABLE,
        ),
        extension(
            message_field(
                "optional_foreign_message_extension",
                19,
                Optional,
                Type::Message,
                "ForeignMessage",
            ),
            EXTENDABLE,
        ),
        extension(
            message_field(
                "optional_nested_enum_extension",
                21,
                Optional,
                Type::Enum,
                "TestAllTypes.NestedEnum",
            ),
            EXTENDABLE,
        ),
        extension(
            field("repeated_int32_extension", 31, Repeated, Type::Int32),
            EXTENDABLE,
        ),
    ];
    file
}

fn lite_file() -> FileDescriptorProto {
    let mut file = file(
        "protoloom/unittest_lite.proto",
        "protoloom_unittest_lite",
        "proto2",
    );
    file.message_type = vec![message(
        "TestAllTypesLite",
        vec![
            field("optional_int32", 1, Label::Optional, Type::Int32),
            field("optional_string", 14, Label::Optional, Type::String),
        ],
    )];
    file
}

fn proto3_file() -> FileDescriptorProto {
    use Label::{Optional, Repeated};

    let mut file = file("protoloom/unittest_proto3.proto", "protoloom_proto3", "proto3");
    let mut proto3 = message(
        "TestProto3",
        vec![
            field("optional_int32", 1, Optional, Type::Int32),
            field("repeated_int32", 2, Repeated, Type::Int32),
            message_field("optional_nested_enum", 3, Optional, Type::Enum, "NestedEnum"),
            packed(field("unpacked_int32", 4, Repeated, Type::Int32), false),
            field("optional_string", 5, Optional, Type::String),
        ],
    );
    proto3.enum_type = vec![enumeration(
        "NestedEnum",
        &[("ZERO", 0), ("ONE", 1), ("TWO", 2)],
    )];
    file.message_type = vec![proto3];
    file
}

/// Every fixture file, dependencies first
pub(crate) fn unittest_files() -> Vec<FileDescriptorProto> {
    vec![
        import_public_file(),
        import_file(),
        unittest_file(),
        lite_file(),
        proto3_file(),
    ]
}

pub(crate) fn unittest_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: unittest_files(),
    }
}

pub(crate) fn unittest_graph() -> DescriptorGraph {
    DescriptorGraph::from_files(unittest_files()).expect("fixture schema links")
}

/// Looks up a message of the unit-test package by its relative name
pub(crate) fn unittest_message(graph: &DescriptorGraph, name: &str) -> MessageDescriptor {
    graph
        .get_message_by_name(&format!("{}.{}", UNITTEST_PACKAGE, name))
        .unwrap_or_else(|| panic!("fixture message {} exists", name))
}

/// Independent encoder for `TestAllTypes.NestedMessage`
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct NestedMessageOracle {
    #[prost(int32, optional, tag = "1")]
    pub(crate) bb: Option<i32>,
}

/// Independent encoder for a subset of `TestAllTypes`
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct TestAllTypesOracle {
    #[prost(int32, optional, tag = "1")]
    pub(crate) optional_int32: Option<i32>,
    #[prost(int64, optional, tag = "2")]
    pub(crate) optional_int64: Option<i64>,
    #[prost(uint32, optional, tag = "3")]
    pub(crate) optional_uint32: Option<u32>,
    #[prost(uint64, optional, tag = "4")]
    pub(crate) optional_uint64: Option<u64>,
    #[prost(sint32, optional, tag = "5")]
    pub(crate) optional_sint32: Option<i32>,
    #[prost(sint64, optional, tag = "6")]
    pub(crate) optional_sint64: Option<i64>,
    #[prost(fixed32, optional, tag = "7")]
    pub(crate) optional_fixed32: Option<u32>,
    #[prost(fixed64, optional, tag = "8")]
    pub(crate) optional_fixed64: Option<u64>,
    #[prost(sfixed32, optional, tag = "9")]
    pub(crate) optional_sfixed32: Option<i32>,
    #[prost(sfixed64, optional, tag = "10")]
    pub(crate) optional_sfixed64: Option<i64>,
    #[prost(float, optional, tag = "11")]
    pub(crate) optional_float: Option<f32>,
    #[prost(double, optional, tag = "12")]
    pub(crate) optional_double: Option<f64>,
    #[prost(bool, optional, tag = "13")]
    pub(crate) optional_bool: Option<bool>,
    #[prost(string, optional, tag = "14")]
    pub(crate) optional_string: Option<String>,
    #[prost(bytes = "vec", optional, tag = "15")]
    pub(crate) optional_bytes: Option<Vec<u8>>,
    #[prost(message, optional, tag = "18")]
    pub(crate) optional_nested_message: Option<NestedMessageOracle>,
    #[prost(int32, optional, tag = "21")]
    pub(crate) optional_nested_enum: Option<i32>,
    #[prost(int32, repeated, packed = "false", tag = "31")]
    pub(crate) repeated_int32: Vec<i32>,
    #[prost(string, repeated, tag = "44")]
    pub(crate) repeated_string: Vec<String>,
    #[prost(message, repeated, tag = "48")]
    pub(crate) repeated_nested_message: Vec<NestedMessageOracle>,
    #[prost(sint64, repeated, packed = "true", tag = "90")]
    pub(crate) packed_sint64: Vec<i64>,
}
