//! Document circuit workflow engine.
//!
//! Documents move through circuits of ordered (or freely reachable) steps.
//! Each step owns statuses that must be completed before the document may
//! leave it; approve/reject actions toggle those statuses, and every change
//! is recorded in an append-only history.
//!
//! [`WorkflowEngine`] is the entry point. It runs each operation as one
//! atomic unit per document against a [`circuit_storage::WorkflowStorage`].

pub mod action;
pub mod config;
mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod identity;
pub mod ledger;
mod locks;
pub mod notify;
pub mod registry;
pub mod transition;
pub mod types;

pub use action::{ProcessRequest, ProcessResult};
pub use config::{ConfigError, WorkflowConfig};
pub use engine::{StepStatusView, WorkflowEngine};
pub use error::{EngineError, ErrorKind};
pub use identity::{IdentityError, RoleProvider, StaticRoleProvider};
pub use notify::{ChannelSink, NotificationSink, NotifyError, TracingSink, WorkflowEvent};
pub use registry::{CircuitRegistry, RegistryError};
pub use transition::TransitionOutcome;
pub use types::{Action, ActionKind, Circuit, Position, Role, Status, StatusEffect, Step};
