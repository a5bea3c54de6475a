#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use walletlink_bridge::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
bridge:
  call_timeout_msec: 1000 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.bridge.call_timeout_ms, 30_000);
    assert_eq!(cfg.bridge.max_pending, 4096);
    assert!(!cfg.bridge.reprobe_on_failure);
    assert!(cfg.host.addr.is_none());
    assert!(cfg.ops.listen.is_none());
}

#[test]
fn full_config() {
    let ok = r#"
version: 1
bridge:
  call_timeout_ms: 1500
  open_timeout_ms: 200
  max_pending: 16
  reprobe_on_failure: true
  event_buffer: 8
host:
  addr: "127.0.0.1:8082"
  max_frame_bytes: 4096
ops:
  listen: "127.0.0.1:9090"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.bridge.call_timeout().as_millis(), 1500);
    assert!(cfg.bridge.reprobe_on_failure);
    assert_eq!(cfg.host.addr.as_deref(), Some("127.0.0.1:8082"));
}

#[test]
fn rejects_wrong_version() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn rejects_out_of_range_values() {
    for bad in [
        "version: 1\nbridge:\n  call_timeout_ms: 10\n",
        "version: 1\nbridge:\n  max_pending: 0\n",
        "version: 1\nhost:\n  max_frame_bytes: 8\n",
        "version: 1\nops:\n  listen: \"not-an-addr\"\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.code().as_str(), "BAD_REQUEST", "config={bad}");
    }
}
