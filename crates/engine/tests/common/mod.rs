//! Shared fixture for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use circuit_engine::{
    ChannelSink, NotificationSink, WorkflowConfig, WorkflowEngine, WorkflowEvent,
};
use circuit_storage::InMemoryStorage;
use tokio::sync::mpsc::UnboundedReceiver;

/// Three circuits:
/// - `ordered`: draft(0, approver) -> sign(10, final); no backtracking
/// - `loose`: free flow a(0) / b(1) / c(2, final); backtracking allowed
/// - `open`: ordered x(0) -> y(1) -> z(2) without statuses; backtracking allowed
pub const CONFIG: &str = r#"
[actors]
alice = "manager"
bob = "approver"
carol = 4

[[actions]]
id = "approve-draft"
title = "Approve draft"
kind = "approve"
effects = [{ status_id = "draft-ok", sets_complete = true }]

[[actions]]
id = "reject-draft"
title = "Reject draft"
kind = "reject"
effects = [{ status_id = "draft-ok", sets_complete = false }]

[[actions]]
id = "approve-sign"
title = "Approve signature"
kind = "approve"
effects = [{ status_id = "sign-ok", sets_complete = true }]

[[actions]]
id = "approve-a"
title = "Approve A"
kind = "approve"
effects = [{ status_id = "a-ok", sets_complete = true }]

[[actions]]
id = "approve-everything"
title = "Approve everything"
kind = "approve"
effects = [
    { status_id = "draft-ok", sets_complete = true },
    { status_id = "sign-ok", sets_complete = true },
]

[[circuits]]
id = "ordered"
title = "Ordered approval"
allow_backtrack = false

[[circuits.steps]]
id = "draft"
title = "Draft review"
order_index = 0
responsible_role = "approver"
statuses = [
    { id = "draft-ok", title = "Draft approved" },
    { id = "draft-notes", title = "Notes attached", required = false },
]

[[circuits.steps]]
id = "sign"
title = "Signature"
order_index = 10
final_step = true
statuses = [{ id = "sign-ok", title = "Signed" }]

[[circuits]]
id = "loose"
title = "Free flow"
ordered_flow = false
allow_backtrack = true

[[circuits.steps]]
id = "a"
title = "A"
order_index = 0
statuses = [{ id = "a-ok", title = "A done" }]

[[circuits.steps]]
id = "b"
title = "B"
order_index = 1

[[circuits.steps]]
id = "c"
title = "C"
order_index = 2
final_step = true

[[circuits]]
id = "open"
title = "Open ordered"
allow_backtrack = true

[[circuits.steps]]
id = "x"
title = "X"
order_index = 0

[[circuits.steps]]
id = "y"
title = "Y"
order_index = 1

[[circuits.steps]]
id = "z"
title = "Z"
order_index = 2
"#;

pub fn engine() -> WorkflowEngine<InMemoryStorage> {
    engine_with_events().0
}

pub fn engine_with_events() -> (
    WorkflowEngine<InMemoryStorage>,
    UnboundedReceiver<WorkflowEvent>,
) {
    let (sink, rx) = ChannelSink::new();
    (engine_with_sink(Arc::new(sink)), rx)
}

pub fn engine_with_sink(sink: Arc<dyn NotificationSink>) -> WorkflowEngine<InMemoryStorage> {
    let config = WorkflowConfig::from_toml_str(CONFIG).expect("fixture config parses");
    let registry = config.build_registry().expect("fixture config builds");
    WorkflowEngine::new(
        Arc::new(InMemoryStorage::new()),
        registry,
        Arc::new(config.role_provider()),
    )
    .with_sink(sink)
}

/// Events are delivered on a background task; wait for the next one.
pub async fn next_event(rx: &mut UnboundedReceiver<WorkflowEvent>) -> WorkflowEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event delivered in time")
        .expect("sink still open")
}

pub async fn assert_no_event(rx: &mut UnboundedReceiver<WorkflowEvent>) {
    let pending = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(pending.is_err(), "unexpected event {pending:?}");
}

/// Register `document_id` and assign it to `circuit_id` as alice.
pub async fn assigned(
    engine: &WorkflowEngine<InMemoryStorage>,
    document_id: &str,
    circuit_id: &str,
) {
    engine
        .register_document(document_id, "Test document", "alice")
        .await
        .expect("register");
    engine
        .assign_circuit(document_id, circuit_id, "alice")
        .await
        .expect("assign");
}
