//! Head simulation driver.

use crate::state::{leader_mod_n, HeadNode, LeaderFn};
use paysim_core::{
    Decision, HeadEvent, HeadTrace, Outgoing, TraceEntry, TraceEvent, TraceSource, WireMessage,
};
use paysim_simulation::{EndpointConfig, EndpointId, MuxNet, Schedule, TraceRecorder};
use paysim_types::{latency, NodeId, Region, Tx, TxIn, TxRef};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

/// Inbound buffer of a head node's endpoint, in messages.
const NODE_BUFFER: usize = 1_000;

/// Configuration of a head simulation.
#[derive(Debug, Clone)]
pub struct HeadOptions {
    pub parties: u32,
    /// Node regions, cycled when there are more parties than entries.
    pub regions: Vec<Region>,
    /// Per-node outbound capacity, bytes per second.
    pub write_capacity: u64,
    /// Per-node inbound capacity, bytes per second.
    pub read_capacity: u64,
    pub leader: LeaderFn,
}

impl Default for HeadOptions {
    fn default() -> Self {
        Self {
            parties: 3,
            regions: vec![Region::FrankfurtAWS, Region::IrelandAWS, Region::LondonAWS],
            write_capacity: 1_250_000,
            read_capacity: 1_250_000,
            leader: leader_mod_n,
        }
    }
}

/// Counters kept while the head simulation runs.
#[derive(Debug, Default, Clone)]
pub struct HeadStats {
    pub events_processed: u64,
    pub applied: u64,
    pub waits: u64,
    pub invalid: u64,
}

/// Queue payload of the head driver: an event arriving at a node's inbox.
/// Either a network delivery whose transfer completed, a client
/// submission, a snapshot trigger, or a `Wait` retry going to the back of
/// the queue.
#[derive(Debug)]
struct HeadTick<T> {
    from: NodeId,
    event: HeadEvent<T>,
}

/// The genesis output seeded for one party.
pub fn genesis_output(party: NodeId) -> TxIn {
    TxIn::new(TxRef::from_parts(&[b"genesis", &party.to_le_bytes()]), 0)
}

/// Wires `parties` head nodes pairwise and runs the protocol in virtual
/// time. Nodes address each other by id through a central endpoint
/// registry; no node holds a reference to another.
pub struct HeadSimulation<T> {
    nodes: Vec<HeadNode<T>>,
    net: MuxNet<HeadEvent<T>>,
    endpoints: Vec<EndpointId>,
    sched: Schedule<HeadTick<T>>,
    trace: TraceRecorder,
    stats: HeadStats,
}

impl<T: Tx> HeadSimulation<T> {
    pub fn new(opts: HeadOptions) -> Self {
        let parties = opts.parties;
        let genesis: BTreeSet<TxIn> = (0..parties).map(genesis_output).collect();

        let nodes: Vec<HeadNode<T>> = (0..parties)
            .map(|id| HeadNode::new(id, parties, opts.leader, genesis.clone()))
            .collect();

        let mut net = MuxNet::new();
        let endpoints: Vec<EndpointId> = (0..parties)
            .map(|id| {
                net.add_endpoint(EndpointConfig {
                    source: TraceSource::Node(id),
                    write_capacity: opts.write_capacity,
                    read_capacity: opts.read_capacity,
                    out_buffer: NODE_BUFFER,
                    in_buffer: NODE_BUFFER,
                })
            })
            .collect();
        for a in 0..parties {
            for b in (a + 1)..parties {
                let lat = latency(
                    opts.regions[a as usize % opts.regions.len()],
                    opts.regions[b as usize % opts.regions.len()],
                );
                net.connect(endpoints[a as usize], endpoints[b as usize], lat);
            }
        }

        info!(parties, "head simulation wired");
        Self {
            nodes,
            net,
            endpoints,
            sched: Schedule::new(parties as usize),
            trace: TraceRecorder::new(),
            stats: HeadStats::default(),
        }
    }

    /// Submit a client transaction at `node` at virtual time `at`.
    pub fn submit(&mut self, node: NodeId, at: Duration, tx: T) {
        self.sched.push(
            node,
            at,
            HeadTick {
                from: node,
                event: HeadEvent::New { tx },
            },
        );
    }

    /// Trigger a snapshot seal at `node` at virtual time `at`.
    pub fn request_snapshot(&mut self, node: NodeId, at: Duration) {
        self.sched.push(
            node,
            at,
            HeadTick {
                from: node,
                event: HeadEvent::NewSn,
            },
        );
    }

    /// Run until the queue is empty or virtual time passes `bound`.
    ///
    /// The queue drains exactly when the protocol quiesces: `Wait` retries
    /// keep their event alive, so an unsatisfiable precondition runs into
    /// the bound instead of deadlocking silently.
    pub fn run_until(&mut self, bound: Duration) -> &HeadStats {
        while let Some((key, tick)) = self.sched.pop_before(bound) {
            self.step(key.task as NodeId, tick);
        }
        info!(
            events = self.stats.events_processed,
            invalid = self.stats.invalid,
            now = ?self.sched.now(),
            "head simulation finished"
        );
        &self.stats
    }

    fn step(&mut self, node: NodeId, tick: HeadTick<T>) {
        // Endpoint ids mirror node ids, so the inbox keeps sender identity.
        self.net.deliver(
            self.endpoints[node as usize],
            self.endpoints[tick.from as usize],
            tick.event,
        );
        let Some((from, event)) = self.net.recv(self.endpoints[node as usize]) else {
            return;
        };

        let decision = self.nodes[node as usize].handle(from, &event);
        let done = self.sched.charge(node, decision.cost());
        self.stats.events_processed += 1;

        match decision {
            Decision::Invalid { reason, .. } => {
                self.stats.invalid += 1;
                debug!(node, kind = event.kind(), reason, "invalid transition");
                self.trace.record(
                    done,
                    TraceSource::Node(node),
                    TraceEvent::Head(HeadTrace::InvalidTransition { reason }),
                );
            }
            Decision::Wait { .. } => {
                self.stats.waits += 1;
                // Back of the inbox, once the retry cost has elapsed.
                self.sched.push(node, done, HeadTick { from, event });
            }
            Decision::Apply {
                trace, outgoing, ..
            } => {
                self.stats.applied += 1;
                if let Some(head_trace) = trace {
                    self.trace
                        .record(done, TraceSource::Node(node), TraceEvent::Head(head_trace));
                }
                match outgoing {
                    Outgoing::None => {}
                    Outgoing::SendTo(peer, msg) => self.send(done, node, peer, msg),
                    Outgoing::Multicast(msg) => {
                        for peer in 0..self.nodes.len() as NodeId {
                            if peer != node {
                                self.send(done, node, peer, msg.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    fn send(&mut self, at: Duration, from: NodeId, to: NodeId, msg: HeadEvent<T>) {
        let delivery = self.net.send(
            at,
            self.endpoints[from as usize],
            self.endpoints[to as usize],
            &msg,
            &mut self.trace,
        );
        self.sched
            .push(to, delivery.at, HeadTick { from, event: msg });
    }

    pub fn node(&self, id: NodeId) -> &HeadNode<T> {
        &self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[HeadNode<T>] {
        &self.nodes
    }

    pub fn stats(&self) -> &HeadStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        self.sched.now()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.entries()
    }

    /// Assert the per-node structural invariants on every node.
    pub fn check_invariants(&self) {
        for node in &self.nodes {
            node.check_invariants();
        }
    }
}
