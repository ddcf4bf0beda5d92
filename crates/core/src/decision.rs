//! The head transition function's output vocabulary.

use crate::trace::HeadTrace;
use paysim_types::NodeId;
use std::time::Duration;

/// Where an applied transition's message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing<M> {
    /// No message leaves the node.
    None,
    /// Point-to-point send.
    SendTo(NodeId, M),
    /// Send to every peer. The sender is excluded; a node that needs its
    /// own copy applies the effect locally in the same transition.
    Multicast(M),
}

/// Outcome of feeding one event to a head node.
///
/// Every variant carries the virtual-time cost of the validation and
/// signing work performed while reaching the verdict; the driver charges it
/// even when the event is rejected or deferred.
#[derive(Debug)]
pub enum Decision<M> {
    /// Structurally inconsistent event. Dropped; the node continues.
    Invalid { cost: Duration, reason: String },
    /// Preconditions not met yet. The event is re-queued at the tail of the
    /// node's inbox; the cost keeps retries from spinning in place.
    Wait { cost: Duration },
    /// The transition committed. State was updated by the handler; `trace`
    /// and `outgoing` take effect once `cost` has been charged.
    Apply {
        cost: Duration,
        trace: Option<HeadTrace>,
        outgoing: Outgoing<M>,
    },
}

impl<M> Decision<M> {
    /// The virtual-time cost of reaching this decision.
    pub fn cost(&self) -> Duration {
        match self {
            Decision::Invalid { cost, .. }
            | Decision::Wait { cost }
            | Decision::Apply { cost, .. } => *cost,
        }
    }

    /// Shorthand for an applied transition without trace output.
    pub fn apply(cost: Duration, outgoing: Outgoing<M>) -> Self {
        Decision::Apply {
            cost,
            trace: None,
            outgoing,
        }
    }
}
