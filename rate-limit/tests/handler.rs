//! End-to-end tests for the rate-limit handler
//!
//! Drive `run` with an in-memory orchestrator channel, an in-memory rule
//! chain and an in-memory log sink.

use std::io::Cursor;

use ar_rate_limit::controller::FirewallController;
use ar_rate_limit::firewall::memory::{MemoryChain, Op};
use ar_rate_limit::firewall::{RuleAction, RuleSpec};
use ar_rate_limit::input::StreamLines;
use ar_rate_limit::sink::{FileLogSink, MemorySink};
use ar_rate_limit::{handle, run, Options, Outcome};

const ADD_EVENT: &str =
    r#"{"version":1,"command":"add","parameters":{"alert":{"rule":{"level":10},"data":{"srcip":"203.0.113.50"}}}}"#;
const ADDR: &str = "203.0.113.50";

struct Session {
    chain: MemoryChain,
    sink: MemorySink,
    written: String,
    status: u8,
}

fn session(chain: MemoryChain, stdin: impl AsRef<[u8]>) -> Session {
    let sink = MemorySink::new();
    let mut input = StreamLines::new(Cursor::new(stdin.as_ref().to_vec()));
    let mut output = Vec::new();
    let status = run(&mut input, &mut output, &chain, &sink, &Options::default());
    Session {
        chain,
        sink,
        written: String::from_utf8(output).unwrap(),
        status,
    }
}

fn limited(address: &str) -> Vec<RuleSpec> {
    vec![
        RuleSpec::rate_limited_accept("INPUT", address),
        RuleSpec::drop("INPUT", address),
    ]
}

#[test]
fn test_absent_address_is_a_no_op() {
    let s = session(MemoryChain::new(), "{\"command\":\"add\",\"parameters\":{}}\n");

    assert_eq!(s.status, 0);
    assert!(s.chain.calls().is_empty());
    assert!(s.written.is_empty(), "no handshake without an address");
    assert!(s.sink.contains("[!] No IP found. Abort."));
}

#[test]
fn test_handshake_veto() {
    let stdin = format!("{ADD_EVENT}\n{{\"command\":\"abort\"}}\n");
    let s = session(MemoryChain::new(), &stdin);

    assert_eq!(s.status, 0);
    assert!(s.chain.mutations().is_empty());
    assert!(s.chain.calls().is_empty());
    assert!(s.sink.contains("[+] Orchestrator responded: {\"command\":\"abort\"}"));
    assert!(s.sink.contains("[!] Orchestrator aborted action"));
}

#[test]
fn test_handshake_garbage_is_a_veto() {
    let stdin = format!("{ADD_EVENT}\nyes please\n");
    let s = session(MemoryChain::new(), &stdin);

    assert_eq!(s.status, 0);
    assert!(s.chain.calls().is_empty());
    assert!(s.sink.contains("[!] Invalid handshake."));
}

#[test]
fn test_handshake_missing_response_is_a_veto() {
    let s = session(MemoryChain::new(), &format!("{ADD_EVENT}\n"));

    assert_eq!(s.status, 0);
    assert!(s.chain.calls().is_empty());
    assert!(s.sink.contains("[!] Invalid handshake."));
}

#[test]
fn test_handshake_invalid_utf8_is_a_veto() {
    let mut stdin = format!("{ADD_EVENT}\n").into_bytes();
    stdin.extend_from_slice(&[0xff, 0xfe, b'\n']);
    let s = session(MemoryChain::new(), stdin);

    assert_eq!(s.status, 0);
    assert!(s.chain.calls().is_empty());
    assert!(s.sink.contains("[!] Invalid handshake."));
    assert!(!s.sink.contains("channel failure"));
}

#[test]
fn test_invalid_utf8_event_is_malformed() {
    let mut stdin = b"{\"command\":\"delete\",\"parameters\":{\"srcip\":\"".to_vec();
    stdin.extend_from_slice(&[0xff, 0xfe]);
    stdin.extend_from_slice(b"\"}}\n");
    let s = session(MemoryChain::new(), stdin);

    assert_eq!(s.status, 1);
    assert!(s.chain.calls().is_empty());
    assert!(s.sink.contains("[ERROR] JSON parse failure"));
}

#[test]
fn test_handshake_grant_applies_limit() {
    let stdin = format!("{ADD_EVENT}\n{{\"command\":\"continue\"}}\n");
    let s = session(MemoryChain::new(), &stdin);

    assert_eq!(s.status, 0);
    assert_eq!(
        s.chain.mutations(),
        vec![
            (Op::InsertHead, RuleSpec::rate_limited_accept("INPUT", ADDR)),
            (Op::AppendTail, RuleSpec::drop("INPUT", ADDR)),
        ]
    );
    assert_eq!(s.chain.rules(), limited(ADDR));

    let request: serde_json::Value = serde_json::from_str(s.written.trim()).unwrap();
    assert_eq!(
        request,
        serde_json::json!({
            "version": 1,
            "origin": {"name": "rate-limit", "module": "active-response"},
            "command": "check_keys",
            "parameters": {"keys": [ADDR]}
        })
    );
    assert!(s.sink.contains(&format!("[DONE] Completed command add for {ADDR}")));
}

#[test]
fn test_delete_bypasses_handshake() {
    let chain = MemoryChain::with_rules(limited("10.0.0.5"));
    let s = session(
        chain,
        "{\"command\":\"delete\",\"parameters\":{\"srcip\":\"10.0.0.5\"}}\n",
    );

    assert_eq!(s.status, 0);
    assert!(s.written.is_empty(), "delete must not send a handshake");
    assert!(s.chain.rules().is_empty());
    assert_eq!(
        s.chain.mutations(),
        vec![
            (Op::Delete, RuleSpec::rate_limited_accept("INPUT", "10.0.0.5")),
            (Op::Delete, RuleSpec::drop("INPUT", "10.0.0.5")),
        ]
    );
}

#[test]
fn test_delete_without_rules_is_quiet() {
    let s = session(
        MemoryChain::new(),
        "{\"command\":\"delete\",\"parameters\":{\"srcip\":\"10.0.0.5\"}}\n",
    );

    assert_eq!(s.status, 0);
    assert!(s.chain.mutations().is_empty());
    assert!(!s.sink.contains("[ERROR]"));
}

#[test]
fn test_malformed_input_fails() {
    let s = session(MemoryChain::new(), "not-json\n");

    assert_eq!(s.status, 1);
    assert!(s.chain.calls().is_empty());
    assert!(s.written.is_empty());
    assert!(s.sink.contains("[ERROR] JSON parse failure"));
}

#[test]
fn test_empty_input_fails() {
    let s = session(MemoryChain::new(), "");
    assert_eq!(s.status, 1);
    assert!(s.chain.calls().is_empty());
}

#[test]
fn test_unknown_command_touches_nothing() {
    let s = session(
        MemoryChain::new(),
        "{\"command\":\"flush\",\"parameters\":{\"srcip\":\"10.0.0.5\"}}\n",
    );

    assert_eq!(s.status, 0);
    assert!(s.written.is_empty());
    assert!(s.chain.calls().is_empty());
    assert!(s.sink.contains("[DONE] Completed command flush for 10.0.0.5"));
}

#[test]
fn test_backend_failures_do_not_fail_the_process() {
    let chain = MemoryChain::with_rules(limited("10.0.0.5")).rejecting(Op::Delete);
    let s = session(
        chain,
        "{\"command\":\"delete\",\"parameters\":{\"srcip\":\"10.0.0.5\"}}\n",
    );

    assert_eq!(s.status, 0);
    assert_eq!(s.chain.mutations().len(), 2);
    assert!(s.sink.contains("(2 changes, 2 failures)"));
}

#[test]
fn test_handle_reports_outcome() {
    let chain = MemoryChain::new();
    let sink = MemorySink::new();
    let mut input = StreamLines::new(Cursor::new(format!(
        "{ADD_EVENT}\n{{\"command\":\"continue\"}}\n"
    )));
    let mut output = Vec::new();

    let outcome = handle(&mut input, &mut output, &chain, &sink, &Options::default()).unwrap();
    match outcome {
        Outcome::Applied(t) => {
            assert_eq!(t.mutations, 2);
            assert!(t.is_clean());
        }
        other => panic!("expected Applied, got {other:?}"),
    }
}

#[test]
fn test_custom_chain() {
    let chain = MemoryChain::new();
    let sink = MemorySink::new();
    let mut input = StreamLines::new(Cursor::new(
        "{\"command\":\"delete\",\"parameters\":{\"srcip\":\"10.0.0.5\"}}\n",
    ));
    let options = Options {
        chain: "AR_LIMIT".to_string(),
        ..Options::default()
    };

    run(&mut input, &mut Vec::new(), &chain, &sink, &options);
    assert!(chain.calls().iter().all(|(_, rule)| rule.chain == "AR_LIMIT"));
}

#[test]
fn test_apply_is_idempotent() {
    let chain = MemoryChain::new();
    let sink = MemorySink::new();
    let controller = FirewallController::new(&chain, &sink, "INPUT");

    controller.apply(ADDR);
    let once = chain.rules();
    controller.apply(ADDR);

    assert_eq!(chain.rules(), once);
    assert_eq!(chain.rules_for(ADDR), limited(ADDR));
}

#[test]
fn test_remove_is_idempotent() {
    let chain = MemoryChain::with_rules(limited(ADDR));
    let sink = MemorySink::new();
    let controller = FirewallController::new(&chain, &sink, "INPUT");

    controller.remove(ADDR);
    let after_first = chain.mutations().len();
    controller.remove(ADDR);

    assert!(chain.rules_for(ADDR).is_empty());
    assert_eq!(chain.mutations().len(), after_first);
}

#[test]
fn test_apply_then_remove_restores_chain() {
    let before = vec![
        RuleSpec::drop("INPUT", "192.0.2.1"),
        RuleSpec::rate_limited_accept("INPUT", "192.0.2.2"),
    ];
    let chain = MemoryChain::with_rules(before.clone());
    let sink = MemorySink::new();
    let controller = FirewallController::new(&chain, &sink, "INPUT");

    controller.apply(ADDR);
    controller.remove(ADDR);

    assert_eq!(chain.rules(), before);
}

#[test]
fn test_accept_is_evaluated_before_drop() {
    let chain = MemoryChain::with_rules(vec![
        RuleSpec::drop("INPUT", "192.0.2.1"),
        RuleSpec::drop("INPUT", "192.0.2.2"),
    ]);
    let sink = MemorySink::new();
    FirewallController::new(&chain, &sink, "INPUT").apply(ADDR);

    // First rule matching the address decides for traffic within the limit
    let first = chain
        .rules()
        .into_iter()
        .find(|r| r.source == ADDR)
        .unwrap();
    assert!(matches!(
        first.action,
        RuleAction::RateLimitedAccept {
            per_second: 5,
            burst: 10
        }
    ));
    assert_eq!(chain.rules().last(), Some(&RuleSpec::drop("INPUT", ADDR)));
}

#[test]
fn test_addresses_do_not_interfere() {
    let chain = MemoryChain::new();
    let sink = MemorySink::new();
    let controller = FirewallController::new(&chain, &sink, "INPUT");

    controller.apply("192.0.2.10");
    controller.apply("192.0.2.20");
    controller.remove("192.0.2.10");

    assert!(chain.rules_for("192.0.2.10").is_empty());
    assert_eq!(chain.rules_for("192.0.2.20"), limited("192.0.2.20"));
}

#[test]
fn test_file_sink_records_session() {
    let dir = tempfile::TempDir::new().unwrap();
    let sink = FileLogSink::new(dir.path().join("rate-limit.log"));
    let chain = MemoryChain::new();
    let mut input = StreamLines::new(Cursor::new(format!(
        "{ADD_EVENT}\n{{\"command\":\"continue\"}}\n"
    )));

    let status = run(&mut input, &mut Vec::new(), &chain, &sink, &Options::default());
    assert_eq!(status, 0);

    let log = std::fs::read_to_string(sink.path()).unwrap();
    let first = log.lines().next().unwrap();
    assert!(first.ends_with(&format!("[+] Received AR command: add, IP={ADDR}")));
    assert!(log.contains("CMD: "));
    assert!(log.lines().last().unwrap().contains("[DONE] Completed command add"));
}
