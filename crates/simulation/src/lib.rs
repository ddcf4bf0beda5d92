//! Deterministic virtual-time substrate for the paysim simulators.
//!
//! The simulators are single-threaded and cooperative: actors are
//! synchronous state machines, and a driver owns one event queue keyed by
//! `(virtual time, task id, sequence)`. Nothing here reads the wall clock;
//! virtual time advances only when the queue's head does.
//!
//! - [`EventKey`] / [`Schedule`]: the ordered queue and per-task busy
//!   accounting
//! - [`MuxNet`]: labelled point-to-point endpoints with write/read
//!   bandwidth capacities, link latency, bounded buffers and front-of-queue
//!   re-enqueueing
//! - [`TraceRecorder`]: the append-only `(source, time, event)` stream

mod mux;
mod queue;
mod schedule;
mod trace;

pub use mux::{Delivery, EndpointConfig, EndpointId, MuxNet};
pub use queue::{EventKey, TaskId};
pub use schedule::Schedule;
pub use trace::TraceRecorder;
