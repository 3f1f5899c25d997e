#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use ocpp_core::protocol::ResultCode;
use ocpp_gateway::config;
use ocpp_gateway::forwarding::ForwardingResult;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
node:
  id: "LC-1"
forwarding:
  default_resutl: forward # typo should fail
"#;

    let err = config::parse(bad).expect_err("must fail");
    assert_eq!(err.result_code(), ResultCode::GenericError);
    assert!(err.to_string().contains("invalid yaml"), "{err}");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
node:
  id: "LC-1"
"#;
    let cfg = config::parse(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.node.id.as_str(), "LC-1");
    assert!(cfg.node.upstream.is_none());
    assert_eq!(cfg.gateway.max_frame_bytes, 65536);
    assert_eq!(cfg.forwarding.default_result, ForwardingResult::Reject);
    assert_eq!(cfg.forwarding.request_timeout(), Duration::from_secs(30));
    assert_eq!(cfg.forwarding.sweep_interval(), Duration::from_secs(1));
    assert_eq!(cfg.forwarding.max_pending, 4096);
}

#[test]
fn full_config() {
    let ok = r#"
version: 1
gateway:
  listen: "127.0.0.1:9000"
  ping_interval_ms: 10000
  idle_timeout_ms: 30000
  max_frame_bytes: 4096
node:
  id: "LC-1"
  upstream: "CSMS1"
forwarding:
  default_result: forward
  request_timeout_ms: 5000
  sweep_interval_ms: 250
  max_pending: 16
"#;
    let cfg = config::parse(ok).expect("must parse");
    assert_eq!(cfg.gateway.listen_addr().unwrap().port(), 9000);
    assert_eq!(cfg.node.upstream.as_ref().map(|u| u.as_str()), Some("CSMS1"));
    assert_eq!(cfg.forwarding.default_result, ForwardingResult::Forward);
    assert_eq!(cfg.forwarding.request_timeout(), Duration::from_secs(5));
    assert_eq!(cfg.forwarding.max_pending, 16);
}

#[test]
fn node_section_is_required() {
    let err = config::parse("version: 1\n").expect_err("must fail");
    assert!(err.to_string().contains("node"), "{err}");
}

#[test]
fn rejects_bad_values() {
    let cases = [
        "version: 2\nnode: { id: \"LC-1\" }\n",
        "version: 1\nnode: { id: \"  \" }\n",
        "version: 1\nnode: { id: \"LC-1\", upstream: \"LC-1\" }\n",
        "version: 1\nnode: { id: \"LC-1\" }\ngateway: { listen: \"nope\" }\n",
        "version: 1\nnode: { id: \"LC-1\" }\ngateway: { ping_interval_ms: 30000, idle_timeout_ms: 20000 }\n",
        "version: 1\nnode: { id: \"LC-1\" }\nforwarding: { request_timeout_ms: 10 }\n",
        "version: 1\nnode: { id: \"LC-1\" }\nforwarding: { max_pending: 0 }\n",
        "version: 1\nnode: { id: \"LC-1\" }\nforwarding: { default_result: maybe }\n",
    ];
    for yaml in cases {
        assert!(config::parse(yaml).is_err(), "accepted: {yaml}");
    }
}

#[test]
fn yaml_errors_point_at_the_offending_line() {
    let err = config::parse("version: 1\nnode:\n  id: [\n").expect_err("must fail");
    assert!(err.to_string().contains("line"), "{err}");
}

#[test]
fn load_names_the_file() {
    let dir = std::env::temp_dir().join(format!("ocpp-gateway-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("node.yaml");
    std::fs::write(&path, "version: 3\nnode: { id: \"LC-1\" }\n").unwrap();

    let err = config::load(&path).expect_err("version 3 is unsupported");
    let msg = err.to_string();
    assert!(msg.contains("node.yaml"), "{msg}");
    assert!(msg.contains("unsupported config version: 3"), "{msg}");

    let missing = config::load(&dir.join("absent.yaml")).expect_err("missing file");
    assert!(missing.to_string().contains("absent.yaml"), "{missing}");
    std::fs::remove_dir_all(&dir).unwrap();
}
