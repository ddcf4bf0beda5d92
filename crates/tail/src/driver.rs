//! Tail simulation driver.

use crate::analysis::{analyze, TailReport};
use crate::client::{Next, StepOutput, TailClient};
use crate::config::RunOptions;
use crate::server::{ServerOutput, TailServer};
use paysim_core::{ClientMsg, SimError, TapeEvent, TraceEntry, TraceEvent, TraceSource};
use paysim_simulation::{EndpointConfig, EndpointId, MuxNet, Schedule, TraceRecorder};
use paysim_types::{latency, ClientId, MockTx, Slot};
use std::time::Duration;
use tracing::info;

/// Client endpoint capacity, bytes per second (100 Mbit/s).
const CLIENT_CAPACITY: u64 = 12_500_000;
/// Client endpoint buffer, in messages.
const CLIENT_BUFFER: usize = 1_000;
/// Server endpoint buffer, in messages.
const SERVER_BUFFER: usize = 1_000_000;

/// Queue payloads of the tail driver. The server is task 0; client `c` is
/// task `c`.
#[derive(Debug)]
enum TailTick {
    /// A transfer completed: the message lands in the task's inbox.
    Deliver {
        from: ClientId,
        msg: ClientMsg<MockTx>,
    },
    /// Process the head of the server's inbox (re-enqueued submissions).
    Poll,
    /// A client advances its tape.
    ClientStep,
    /// A client's settlement stall elapsed.
    SettlementDone,
}

/// Wires one server and `n` clients over bandwidth-modelled links and runs
/// a tape to completion.
pub struct TailSimulation {
    server: TailServer<MockTx>,
    clients: Vec<TailClient>,
    net: MuxNet<ClientMsg<MockTx>>,
    server_ep: EndpointId,
    client_eps: Vec<EndpointId>,
    sched: Schedule<TailTick>,
    trace: TraceRecorder,
    opts: RunOptions,
    duration_slots: Slot,
}

impl TailSimulation {
    /// Build a simulation over `tape` for clients `1..=n_clients`.
    pub fn new(tape: Vec<TapeEvent>, n_clients: u32, opts: RunOptions) -> Self {
        let duration_slots = tape.iter().map(|e| e.slot + 1).max().unwrap_or(0);

        let mut net = MuxNet::new();
        let server_ep = net.add_endpoint(EndpointConfig {
            source: TraceSource::Server,
            write_capacity: opts.server.write_capacity,
            read_capacity: opts.server.read_capacity,
            out_buffer: SERVER_BUFFER,
            in_buffer: SERVER_BUFFER,
        });
        let client_eps: Vec<EndpointId> = (1..=n_clients)
            .map(|c| {
                net.add_endpoint(EndpointConfig {
                    source: TraceSource::Client(c),
                    write_capacity: CLIENT_CAPACITY,
                    read_capacity: CLIENT_CAPACITY,
                    out_buffer: CLIENT_BUFFER,
                    in_buffer: CLIENT_BUFFER,
                })
            })
            .collect();
        for c in 1..=n_clients {
            let region = opts.client_regions[(c as usize - 1) % opts.client_regions.len()];
            net.connect(
                server_ep,
                client_eps[c as usize - 1],
                latency(opts.server.region, region),
            );
        }

        let clients: Vec<TailClient> = (1..=n_clients)
            .map(|c| {
                let events: Vec<TapeEvent> =
                    tape.iter().filter(|e| e.client == c).cloned().collect();
                TailClient::new(
                    c,
                    events,
                    opts.payment_window,
                    opts.settlement_delay,
                    opts.slot_length,
                )
            })
            .collect();

        let mut sched = Schedule::new(n_clients as usize + 1);
        for c in 1..=n_clients {
            sched.push(c, Duration::ZERO, TailTick::ClientStep);
        }

        info!(clients = n_clients, duration_slots, "tail simulation wired");
        Self {
            server: TailServer::new(n_clients),
            clients,
            net,
            server_ep,
            client_eps,
            sched,
            trace: TraceRecorder::new(),
            opts,
            duration_slots,
        }
    }

    /// Run until the queue drains or virtual time passes `bound`.
    ///
    /// Unexpected protocol messages abort the run; everything else is
    /// handled locally.
    pub fn run_until(&mut self, bound: Duration) -> Result<(), SimError> {
        while let Some((key, tick)) = self.sched.pop_before(bound) {
            match tick {
                TailTick::Deliver { from, msg } if key.task == 0 => {
                    // Endpoint ids are laid out server-first, so client c
                    // owns endpoint c.
                    self.net.deliver(self.server_ep, from, msg);
                    self.server_step()?;
                }
                TailTick::Deliver { msg, .. } => {
                    self.clients[key.task as usize - 1].on_server_msg(msg)?;
                }
                TailTick::Poll => self.server_step()?,
                TailTick::ClientStep => {
                    let out = self.clients[key.task as usize - 1].step();
                    self.apply_client_output(key.task as ClientId, out);
                }
                TailTick::SettlementDone => {
                    let out = self.clients[key.task as usize - 1].settlement_done();
                    self.apply_client_output(key.task as ClientId, out);
                }
            }
        }
        info!(now = ?self.sched.now(), "tail simulation finished");
        Ok(())
    }

    /// Pop one message off the server's inbox and run the handler.
    fn server_step(&mut self) -> Result<(), SimError> {
        let Some((from_ep, msg)) = self.net.recv(self.server_ep) else {
            return Ok(());
        };
        let from = from_ep as ClientId;
        let ServerOutput {
            cost,
            sends,
            requeue,
            traces,
        } = self.server.handle(from, msg)?;

        let done = self.sched.charge(0, cost);
        for trace in traces {
            self.trace
                .record(done, TraceSource::Server, TraceEvent::Server(trace));
        }
        for (to, msg) in sends {
            let delivery = self.net.send(
                done,
                self.server_ep,
                self.client_eps[to as usize - 1],
                &msg,
                &mut self.trace,
            );
            self.sched
                .push(to, delivery.at, TailTick::Deliver { from: 0, msg });
        }
        // Retried submissions go back to the front of the server's inbox,
        // oldest first, without bandwidth charges.
        for (sender, msg) in requeue.into_iter().rev() {
            self.net
                .reenqueue(self.server_ep, self.client_eps[sender as usize - 1], msg);
            self.sched.push(0, done, TailTick::Poll);
        }
        Ok(())
    }

    fn apply_client_output(&mut self, client: ClientId, out: StepOutput) {
        let now = self.sched.now();
        let StepOutput { sends, trace, next } = out;
        if let Some(client_trace) = trace {
            self.trace.record(
                now,
                TraceSource::Client(client),
                TraceEvent::Client(client_trace),
            );
        }
        for msg in sends {
            let delivery = self.net.send(
                now,
                self.client_eps[client as usize - 1],
                self.server_ep,
                &msg,
                &mut self.trace,
            );
            self.sched
                .push(0, delivery.at, TailTick::Deliver { from: client, msg });
        }
        match next {
            Next::Continue => {
                self.sched.push(client, now, TailTick::ClientStep);
            }
            Next::Sleep(dt) => {
                self.sched.push(client, now + dt, TailTick::ClientStep);
            }
            Next::Settle(dt) => {
                self.sched.push(client, now + dt, TailTick::SettlementDone);
            }
            Next::Idle => {}
        }
    }

    /// Fold the recorded trace into the throughput/usage report.
    pub fn report(&self) -> TailReport {
        analyze(
            self.trace.entries(),
            self.duration_slots,
            self.opts.slot_length,
        )
    }

    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.entries()
    }

    pub fn server(&self) -> &TailServer<MockTx> {
        &self.server
    }

    pub fn client(&self, id: ClientId) -> &TailClient {
        &self.clients[id as usize - 1]
    }

    pub fn now(&self) -> Duration {
        self.sched.now()
    }
}
