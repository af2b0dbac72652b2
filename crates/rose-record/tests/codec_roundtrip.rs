use proptest::prelude::*;
use rose_record::{decode_response_fields, encode_request_fields, Record};
use serde_json::Value;

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::from(n)),
        "[a-zA-Z0-9 %._-]{0,12}".prop_map(Value::String),
    ]
}

fn structured() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z_]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn flat_record() -> impl Strategy<Value = Record> {
    prop::collection::btree_map("[A-Z_]{1,10}", structured(), 0..6)
        .prop_map(|m| m.into_iter().collect::<Record>())
}

proptest! {
    #[test]
    fn decode_reverses_encode(record in flat_record()) {
        let wire = encode_request_fields(&record);
        prop_assert!(wire.values().all(|v| !v.is_object() && !v.is_array()));

        let back = decode_response_fields(Value::Object(wire));
        prop_assert_eq!(back, Value::Object(record));
    }

    #[test]
    fn decode_applies_element_wise(records in prop::collection::vec(flat_record(), 0..4)) {
        let wire: Vec<Value> = records
            .iter()
            .map(|r| Value::Object(encode_request_fields(r)))
            .collect();
        let back = decode_response_fields(Value::Array(wire));
        let expected = Value::Array(records.into_iter().map(Value::Object).collect());
        prop_assert_eq!(back, expected);
    }
}
