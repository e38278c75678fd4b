//! Wire round trips combined with registry-driven coercion

use std::sync::Arc;

use amfgate::amf::{amf0, amf3};
use amfgate::{
    coerce, CodecConfig, CodecContext, DateKind, EncodingMode, EnumSchema, NumberKind, NumberType,
    Record, TypeDescriptor, TypeRegistry, TypeSchema, Value,
};

fn ctx() -> CodecContext {
    CodecContext::new(CodecConfig::default(), Arc::new(TypeRegistry::new()))
}

#[test]
fn big_decimal_survives_both_formats_without_precision_loss() {
    let digits = "123456789012345678901234567890.5";
    let value = Value::BigNumber(amfgate::BigNumber::parse(digits).unwrap());
    let ctx = ctx();

    for encoded in [
        amf0::encode_value(&value, EncodingMode::Legacy, &ctx).unwrap(),
        amf3::encode_value(&value, &ctx).unwrap(),
    ] {
        let decoded = if encoded[0] == 0x02 {
            amf0::decode_value(&encoded, &ctx).unwrap()
        } else {
            amf3::decode_value(&encoded, &ctx).unwrap()
        };
        // Travels as a string; the string short-circuits into the big target
        let desired = TypeDescriptor::Number(NumberType::of(NumberKind::BigDecimal));
        match coerce(&decoded, &desired, &ctx).unwrap() {
            Value::BigNumber(b) => assert_eq!(b.as_str(), digits),
            other => panic!("expected big number, got {other:?}"),
        }
    }
}

#[test]
fn enum_round_trips_through_its_symbolic_name() {
    let ctx = ctx();
    ctx.registry
        .register_enum(EnumSchema::new("com.example.Suit", ["HEARTS", "SPADES"]));

    let value = Value::enumeration("com.example.Suit", "SPADES");
    let encoded = amf3::encode_value(&value, &ctx).unwrap();
    let decoded = amf3::decode_value(&encoded, &ctx).unwrap();
    assert_eq!(decoded, Value::from("SPADES"));

    let desired = TypeDescriptor::Enum("com.example.Suit".into());
    assert_eq!(
        coerce(&decoded, &desired, &ctx).unwrap(),
        Value::enumeration("com.example.Suit", "SPADES")
    );
}

#[test]
fn date_kinds_derive_from_one_wire_value() {
    let ctx = ctx();
    let value = Value::date(1_234_567_890_123.0);
    let encoded = amf3::encode_value(&value, &ctx).unwrap();
    let decoded = amf3::decode_value(&encoded, &ctx).unwrap();

    let day = 86_400_000.0;
    let cases = [
        (DateKind::DateTime, 1_234_567_890_123.0),
        (DateKind::Timestamp, 1_234_567_890_123.0),
        (DateKind::DateOnly, 1_234_567_890_123.0 - 1_234_567_890_123.0 % day),
        (DateKind::TimeOnly, 1_234_567_890_123.0 % day),
    ];
    for (kind, expected) in cases {
        match coerce(&decoded, &TypeDescriptor::Date(kind), &ctx).unwrap() {
            Value::Date(d) => {
                assert_eq!(d.epoch_millis, expected, "{kind:?}");
                assert_eq!(d.kind, kind);
            }
            other => panic!("expected date, got {other:?}"),
        }
    }
}

#[test]
fn typed_record_decodes_onto_registered_schema() {
    let ctx = ctx();
    ctx.registry.register_schema(
        TypeSchema::new("com.example.Pet")
            .member("name", TypeDescriptor::Str)
            .member(
                "age",
                TypeDescriptor::Number(NumberType::of(NumberKind::I32)),
            ),
    );

    let mut record = Record::typed("com.example.Pet");
    record.members.insert("name".into(), Value::from("Zoe"));
    record.members.insert("age".into(), Value::Number(4.0));
    let value = Value::record(record);

    let encoded = amf0::encode_value(&value, EncodingMode::Legacy, &ctx).unwrap();
    let decoded = amf0::decode_value(&encoded, &ctx).unwrap();
    let desired = TypeDescriptor::Record("com.example.Pet".into());

    match coerce(&decoded, &desired, &ctx).unwrap() {
        Value::Record(rc) => {
            let r = rc.borrow();
            assert!(!r.dynamic);
            assert_eq!(r.members.get("name"), Some(&Value::from("Zoe")));
            assert_eq!(r.members.get("age"), Some(&Value::Int(4)));
        }
        other => panic!("expected record, got {other:?}"),
    }
}

#[test]
fn alias_maps_remote_name_to_local_schema() {
    let ctx = ctx();
    ctx.registry
        .register_schema(TypeSchema::new("local.Pet").member("name", TypeDescriptor::Str));
    ctx.registry.register_alias("remote.Pet", "local.Pet");

    let mut record = Record::typed("remote.Pet");
    record.members.insert("name".into(), Value::from("Zoe"));
    let value = Value::record(record);

    let desired = TypeDescriptor::Record("remote.Pet".into());
    match coerce(&value, &desired, &ctx).unwrap() {
        Value::Record(rc) => {
            assert_eq!(rc.borrow().type_name.as_deref(), Some("local.Pet"));
        }
        other => panic!("expected record, got {other:?}"),
    }
}

#[test]
fn legacy_map_config_changes_wire_shape_not_meaning() {
    let mut map = amfgate::OrderedMap::new();
    map.insert("k".into(), Value::Int(7));
    let value = Value::map(map);

    let plain = ctx();
    let mut cfg = CodecConfig::default();
    cfg.legacy_map = true;
    let legacy = CodecContext::new(cfg, Arc::new(TypeRegistry::new()));

    let as_object = amf0::encode_value(&value, EncodingMode::Legacy, &plain).unwrap();
    let as_ecma = amf0::encode_value(&value, EncodingMode::Legacy, &legacy).unwrap();
    assert_eq!(as_object[0], 0x03); // anonymous object
    assert_eq!(as_ecma[0], 0x08); // associative array

    for encoded in [as_object, as_ecma] {
        let decoded = amf0::decode_value(&encoded, &plain).unwrap();
        assert_eq!(decoded.get_member("k"), Some(Value::Number(7.0)));
    }
}

#[test]
fn deep_nesting_is_bounded() {
    let mut cfg = CodecConfig::default();
    cfg.max_object_nest_level = 8;
    let ctx = CodecContext::new(cfg, Arc::new(TypeRegistry::new()));

    let mut value = Value::record(Record::anonymous());
    for _ in 0..20 {
        let mut outer = Record::anonymous();
        outer.members.insert("inner".into(), value);
        value = Value::record(outer);
    }

    assert!(matches!(
        amf0::encode_value(&value, EncodingMode::Legacy, &ctx),
        Err(amfgate::CodecError::NestingTooDeep(8))
    ));
}

#[test]
fn nested_collections_are_bounded() {
    let mut cfg = CodecConfig::default();
    cfg.max_collection_nest_level = 3;
    let ctx = CodecContext::new(cfg, Arc::new(TypeRegistry::new()));

    let mut value = Value::array(vec![Value::Int(1)]);
    for _ in 0..5 {
        value = Value::array(vec![value]);
    }
    let encoded = amf0::encode_value(&value, EncodingMode::Legacy, &ctx).unwrap();

    assert!(matches!(
        amf0::decode_value(&encoded, &ctx),
        Err(amfgate::CodecError::NestingTooDeep(3))
    ));
}

#[test]
fn bytes_round_trip_in_the_modern_format() {
    let ctx = ctx();
    let value = Value::bytes((0u8..64).collect());
    let encoded = amf3::encode_value(&value, &ctx).unwrap();
    match amf3::decode_value(&encoded, &ctx).unwrap() {
        Value::Bytes(rc) => assert_eq!(rc.borrow().len(), 64),
        other => panic!("expected bytes, got {other:?}"),
    }
}
