//! Topology change notifications

use parking_lot::Mutex;

/// Receives topology changes of one peer (visualisation, metrics, tests)
///
/// Nodes and edges are identified by username. Callbacks run while the
/// peer state is locked and must not call back into the peer.
pub trait TopologyObserver: Send + Sync {
    fn on_node_added(&self, id: &str, capacity: u32);
    fn on_edge_added(&self, a: &str, b: &str);
    fn on_edge_removed(&self, a: &str, b: &str);
}

/// A recorded topology change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    NodeAdded { id: String, capacity: u32 },
    EdgeAdded { a: String, b: String },
    EdgeRemoved { a: String, b: String },
}

/// Observer that keeps every event in memory
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<TopologyEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far
    pub fn events(&self) -> Vec<TopologyEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events
    pub fn take(&self) -> Vec<TopologyEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl TopologyObserver for EventLog {
    fn on_node_added(&self, id: &str, capacity: u32) {
        self.events.lock().push(TopologyEvent::NodeAdded {
            id: id.to_string(),
            capacity,
        });
    }

    fn on_edge_added(&self, a: &str, b: &str) {
        self.events.lock().push(TopologyEvent::EdgeAdded {
            a: a.to_string(),
            b: b.to_string(),
        });
    }

    fn on_edge_removed(&self, a: &str, b: &str) {
        self.events.lock().push(TopologyEvent::EdgeRemoved {
            a: a.to_string(),
            b: b.to_string(),
        });
    }
}
