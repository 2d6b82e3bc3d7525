//! Property tests for the wire format and the array model.

use arraybridge::protocol::{build_frame, read_frame, Header, MessageType, HEADER_SIZE};
use arraybridge::transport::{in_memory_pair, Transport};
use arraybridge::value::{element_count, json, Array, Complex, TypeHint, Value};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ── Framing ──────────────────────────────────────────────────

proptest! {
    /// Any tag and payload survive write → read unchanged.
    #[test]
    fn frame_round_trip(
        tag in any::<u8>(),
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let bytes = build_frame(tag, &payload);
        prop_assert_eq!(bytes.len(), HEADER_SIZE + payload.len());

        let header = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        prop_assert_eq!(header.tag, tag);
        prop_assert_eq!(header.payload_length as usize, payload.len());

        let frame = runtime().block_on(async {
            let (mut left, mut right) = in_memory_pair(8192);
            right.write_all(&bytes).await.unwrap();
            read_frame(&mut left, u32::MAX).await.unwrap()
        });
        prop_assert_eq!(frame.tag, tag);
        prop_assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    /// Every tag byte maps to a message type and back.
    #[test]
    fn message_type_tag_is_stable(tag in any::<u8>()) {
        prop_assert_eq!(MessageType::from_u8(tag).as_u8(), tag);
    }
}

// ── Values ───────────────────────────────────────────────────

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        // quarter steps encode exactly
        (-4000i32..4000).prop_map(|n| Value::from(f64::from(n) * 0.25)),
        "[a-zA-Z0-9 ⍳⍴]{0,6}".prop_map(Value::from),
        (-100i32..100, 1i32..100)
            .prop_map(|(re, im)| Value::Complex(Complex::new(f64::from(re), f64::from(im)))),
    ]
}

fn arb_hint() -> impl Strategy<Value = TypeHint> {
    prop_oneof![Just(TypeHint::Numeric), Just(TypeHint::Character)]
}

fn arb_array(leaf: impl Strategy<Value = Value>) -> impl Strategy<Value = Array> {
    (
        proptest::collection::vec(0usize..4, 0..4),
        proptest::collection::vec(leaf, 1..8),
        arb_hint(),
    )
        .prop_map(|(shape, data, hint)| Array::reshape(shape, data, hint).unwrap())
}

fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            arb_array(inner.clone()).prop_map(Value::Array),
            proptest::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(|entries| {
                Value::Namespace(entries.into_iter().collect())
            }),
        ]
    })
}

proptest! {
    /// decode(encode(v)) encodes to the same bytes.
    #[test]
    fn json_encoding_is_idempotent(value in arb_value()) {
        let once = json::encode(&value).unwrap();
        let decoded = json::decode(&once).unwrap();
        let twice = json::encode(&decoded).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Arrays decode to an equal array.
    #[test]
    fn array_survives_json(array in arb_array(arb_leaf())) {
        let value = Value::Array(array);
        let decoded = json::decode(&json::encode(&value).unwrap()).unwrap();
        prop_assert_eq!(decoded, value);
    }

    /// Splitting along the leading axis partitions the data in order.
    #[test]
    fn split_leading_concatenates_to_original(array in arb_array(arb_leaf())) {
        prop_assume!(array.rank() >= 1);

        let parts = array.split_leading().unwrap();
        prop_assert_eq!(parts.len(), array.shape()[0]);

        let rest = &array.shape()[1..];
        let mut joined = Vec::new();
        for part in &parts {
            prop_assert_eq!(part.shape(), rest);
            prop_assert_eq!(part.len(), element_count(rest).unwrap());
            joined.extend_from_slice(part.data());
        }
        prop_assert_eq!(joined.as_slice(), array.data());
    }

    /// Row-major offsets cover every element exactly once.
    #[test]
    fn flat_index_is_row_major(array in arb_array(arb_leaf())) {
        let strides = array.strides();
        let shape = array.shape().to_vec();
        let mut index = vec![0usize; shape.len()];
        for expected in 0..array.len() {
            let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
            prop_assert_eq!(array.flat_index(&index).unwrap(), offset);
            prop_assert_eq!(offset, expected);

            // odometer increment, last axis fastest
            for axis in (0..shape.len()).rev() {
                index[axis] += 1;
                if index[axis] < shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
    }
}
