//! Wire frame vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use walletlink_core::protocol::frame::{decode_line, decode_payload, Frame};

use vector_loader::load;

#[test]
fn frame_vectors() {
    let files = [
        "response_ok.json",
        "response_crlf.json",
        "push_ok.json",
        "call_ok.json",
        "unknown_type.json",
        "missing_id.json",
        "not_json.json",
    ];

    for f in files {
        let v = load(f);
        let res = decode_line(&v.line);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.code().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let frame = res.expect("expected ok frame");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(frame.kind(), ex["type"].as_str().unwrap(), "vector={}", v.description);
        match frame {
            Frame::Response { id, payload } => {
                assert_eq!(id, ex["id"].as_u64().unwrap(), "vector={}", v.description);
                assert_eq!(decode_payload(&payload).unwrap(), ex["payload"], "vector={}", v.description);
            }
            Frame::Push { payload } => {
                assert_eq!(decode_payload(&payload).unwrap(), ex["payload"], "vector={}", v.description);
            }
            Frame::Call { id, query } => {
                assert_eq!(id, ex["id"].as_u64().unwrap(), "vector={}", v.description);
                assert_eq!(query, ex["query"].as_str().unwrap(), "vector={}", v.description);
            }
        }
    }
}

#[test]
fn malformed_payload_inside_valid_frame() {
    let v = load("response_bad_payload.json");
    let frame = decode_line(&v.line).unwrap();
    let Frame::Response { payload, .. } = frame else {
        panic!("expected response frame");
    };
    let err = decode_payload(&payload).expect_err("payload must not decode");
    assert_eq!(err.code().as_str(), v.expect_error.unwrap().code);
}
