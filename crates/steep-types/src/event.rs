//! Structured control-plane events.
//!
//! Every notable lifecycle moment is emitted as an [`Event`] through an
//! [`EventSink`]. The default sink logs through `tracing`; daemon embeddings
//! provide their own sink to forward events into an audit store.

use serde::Serialize;

use crate::{InitMethod, InitState, Lsn, NodeId};

/// A structured event emitted by the control plane.
///
/// Variant names map 1:1 onto dotted event names (`init.started`, …); the
/// dotted form is what sinks and downstream consumers key on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// An initialization operation was dispatched.
    InitStarted {
        node: NodeId,
        source: Option<NodeId>,
        method: InitMethod,
    },
    /// An initialization operation reached `synchronized`.
    InitCompleted {
        node: NodeId,
        elapsed_secs: u64,
        throughput_bps: Option<u64>,
    },
    /// An initialization operation failed.
    InitFailed { node: NodeId, error: String },
    /// An initialization operation was cancelled by the operator.
    InitCancelled { node: NodeId },
    /// A named phase of an operation began.
    PhaseStarted { node: NodeId, phase: String },
    /// A named phase of an operation finished.
    PhaseCompleted { node: NodeId, phase: String },
    /// One table finished its initial copy or transfer.
    TableComplete {
        node: NodeId,
        schema: String,
        table: String,
        rows: u64,
    },
    /// The node's init state changed.
    StateChange {
        node: NodeId,
        from: InitState,
        to: InitState,
    },
    /// Local and peer schema fingerprints differ.
    SchemaMismatchDetected {
        node: NodeId,
        peer: NodeId,
        mismatched_tables: Vec<String>,
    },
    /// Snapshot generation began.
    SnapshotGenerationStarted { node: NodeId, snapshot_id: String },
    /// Snapshot generation finished and the manifest is durable.
    SnapshotGenerationCompleted {
        node: NodeId,
        snapshot_id: String,
        tables: usize,
        total_size_bytes: u64,
    },
    /// The snapshot's consistent-point slot was created.
    SnapshotSlotCreated {
        node: NodeId,
        slot_name: String,
        lsn: Lsn,
    },
    /// The snapshot manifest was written.
    SnapshotManifestWritten {
        node: NodeId,
        snapshot_id: String,
        path: String,
    },
    /// A reinitialization catch-up monitor hit its ceiling.
    ReinitTimeout { node: NodeId, waited_secs: u64 },
}

impl Event {
    /// Dotted event name, stable across releases.
    pub fn name(&self) -> &'static str {
        match self {
            Event::InitStarted { .. } => "init.started",
            Event::InitCompleted { .. } => "init.completed",
            Event::InitFailed { .. } => "init.failed",
            Event::InitCancelled { .. } => "init.cancelled",
            Event::PhaseStarted { .. } => "init.phase_started",
            Event::PhaseCompleted { .. } => "init.phase_completed",
            Event::TableComplete { .. } => "init.table_complete",
            Event::StateChange { .. } => "init.state_change",
            Event::SchemaMismatchDetected { .. } => "schema.mismatch_detected",
            Event::SnapshotGenerationStarted { .. } => "snapshot.generation_started",
            Event::SnapshotGenerationCompleted { .. } => "snapshot.generation_completed",
            Event::SnapshotSlotCreated { .. } => "snapshot.slot_created",
            Event::SnapshotManifestWritten { .. } => "snapshot.manifest_written",
            Event::ReinitTimeout { .. } => "reinit.timeout",
        }
    }

    /// The node this event concerns.
    pub fn node(&self) -> &NodeId {
        match self {
            Event::InitStarted { node, .. }
            | Event::InitCompleted { node, .. }
            | Event::InitFailed { node, .. }
            | Event::InitCancelled { node }
            | Event::PhaseStarted { node, .. }
            | Event::PhaseCompleted { node, .. }
            | Event::TableComplete { node, .. }
            | Event::StateChange { node, .. }
            | Event::SchemaMismatchDetected { node, .. }
            | Event::SnapshotGenerationStarted { node, .. }
            | Event::SnapshotGenerationCompleted { node, .. }
            | Event::SnapshotSlotCreated { node, .. }
            | Event::SnapshotManifestWritten { node, .. }
            | Event::ReinitTimeout { node, .. } => node,
        }
    }
}

/// Consumer of control-plane events.
///
/// Implementations must be cheap and non-blocking; they are called inline
/// from operation tasks.
pub trait EventSink: Send + Sync {
    /// Delivers one event. Must not panic.
    fn emit(&self, event: &Event);
}

/// Default sink: logs every event through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(
            target: "steep::event",
            event = event.name(),
            node = %event.node(),
            %payload,
            "control plane event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_dotted() {
        let ev = Event::InitStarted {
            node: NodeId::new("b"),
            source: Some(NodeId::new("a")),
            method: InitMethod::Snapshot,
        };
        assert_eq!(ev.name(), "init.started");
        assert_eq!(ev.node().as_str(), "b");

        let ev = Event::ReinitTimeout {
            node: NodeId::new("b"),
            waited_secs: 1800,
        };
        assert_eq!(ev.name(), "reinit.timeout");
    }

    #[test]
    fn events_serialize_with_tag() {
        let ev = Event::StateChange {
            node: NodeId::new("b"),
            from: InitState::CatchingUp,
            to: InitState::Synchronized,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"event\":\"state_change\""));
        assert!(json.contains("\"catching_up\""));
    }
}
