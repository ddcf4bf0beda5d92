//! The tail server: a central broker with per-client mailboxes.

use paysim_core::{ClientMsg, ServerTrace, SimError};
use paysim_types::{ClientId, Tx};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;
use tracing::debug;

/// Modelled cost of one registry lookup. Every handler pays it once.
pub const CLIENT_LOOKUP_COST: Duration = Duration::from_micros(500);

/// A client's connection state as the server sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conn {
    Online,
    Offline,
    /// In a settlement stall; deliveries touching this client are parked.
    Blocked,
}

#[derive(Debug)]
struct ClientSlot<T> {
    conn: Conn,
    /// Notifications awaiting an offline client's next `Pull`.
    mailbox: VecDeque<ClientMsg<T>>,
    /// Submissions parked while a settlement involving this sender runs;
    /// drained on this client's `SnapshotEnd`.
    queue: VecDeque<ClientMsg<T>>,
}

impl<T> ClientSlot<T> {
    fn new() -> Self {
        Self {
            conn: Conn::Offline,
            mailbox: VecDeque::new(),
            queue: VecDeque::new(),
        }
    }
}

/// Effects of one server handler invocation.
///
/// `cost` is charged against the server task before any send leaves;
/// `requeue` entries go back to the *front* of the server's inbox without
/// bandwidth charges, oldest first.
#[derive(Debug)]
pub struct ServerOutput<T> {
    pub cost: Duration,
    pub sends: Vec<(ClientId, ClientMsg<T>)>,
    pub requeue: Vec<(ClientId, ClientMsg<T>)>,
    pub traces: Vec<ServerTrace>,
}

impl<T> ServerOutput<T> {
    fn with_cost(cost: Duration) -> Self {
        Self {
            cost,
            sends: Vec::new(),
            requeue: Vec::new(),
            traces: Vec::new(),
        }
    }
}

/// The broker state machine.
///
/// One exclusive registry serialises handler bodies; the driver models that
/// by charging each handler's cost against a single server task.
#[derive(Debug)]
pub struct TailServer<T> {
    registry: BTreeMap<ClientId, ClientSlot<T>>,
}

impl<T: Tx> TailServer<T> {
    /// A server with clients `1..=n`, all initially offline.
    pub fn new(n_clients: u32) -> Self {
        Self {
            registry: (1..=n_clients).map(|c| (c, ClientSlot::new())).collect(),
        }
    }

    /// Handle one inbound `(client, msg)` pair.
    ///
    /// Messages only the server sends (`AckTx`, `NotifyTx`) are fatal here:
    /// a client that emits them is outside the protocol.
    pub fn handle(
        &mut self,
        from: ClientId,
        msg: ClientMsg<T>,
    ) -> Result<ServerOutput<T>, SimError> {
        if !self.registry.contains_key(&from) {
            return Err(SimError::UnknownClient { client: from });
        }
        match msg {
            ClientMsg::NewTx { .. } => self.on_new_tx(from, msg),
            ClientMsg::Pull => self.on_pull(from),
            ClientMsg::Connect => self.on_set_conn(from, Conn::Online),
            ClientMsg::Disconnect => self.on_set_conn(from, Conn::Offline),
            ClientMsg::SnapshotStart => self.on_set_conn(from, Conn::Blocked),
            ClientMsg::SnapshotEnd => self.on_snapshot_end(from),
            other => Err(SimError::UnexpectedServerMsg {
                client: from,
                kind: other.msg_kind(),
            }),
        }
    }

    fn on_new_tx(&mut self, from: ClientId, msg: ClientMsg<T>) -> Result<ServerOutput<T>, SimError> {
        let ClientMsg::NewTx { tx, recipients } = &msg else {
            unreachable!("dispatched on NewTx");
        };
        let mut cost = CLIENT_LOOKUP_COST;
        let _ = tx.validate().run(&mut cost);
        let mut out = ServerOutput::with_cost(cost);

        for recipient in recipients {
            if !self.registry.contains_key(recipient) {
                return Err(SimError::UnknownClient { client: *recipient });
            }
        }

        // A settlement anywhere on the payment path parks the whole
        // submission on the sender's queue; the sender's own SnapshotEnd is
        // the only retry point.
        let blocked = self.conn(from) == Conn::Blocked
            || recipients
                .iter()
                .any(|r| self.registry[r].conn == Conn::Blocked);
        if blocked {
            let slot = self.registry.get_mut(&from).expect("sender registered");
            slot.queue.push_back(msg.clone());
            out.traces.push(ServerTrace::Parked {
                sender: from,
                queue_len: slot.queue.len(),
            });
            debug!(sender = from, "parked submission on blocked path");
            return Ok(out);
        }

        let txref = tx.txref();
        for recipient in recipients {
            let notify = ClientMsg::NotifyTx { tx: tx.clone() };
            let slot = self.registry.get_mut(recipient).expect("checked above");
            match slot.conn {
                Conn::Online => out.sends.push((*recipient, notify)),
                Conn::Offline => {
                    slot.mailbox.push_back(notify);
                    out.traces.push(ServerTrace::StoreInMailbox {
                        client: *recipient,
                        kind: paysim_core::MsgKind::NotifyTx,
                        mailbox_len: slot.mailbox.len(),
                    });
                }
                Conn::Blocked => unreachable!("blocked recipients park the submission"),
            }
        }
        out.sends.push((from, ClientMsg::AckTx { txref }));
        Ok(out)
    }

    fn on_pull(&mut self, from: ClientId) -> Result<ServerOutput<T>, SimError> {
        let mut out = ServerOutput::with_cost(CLIENT_LOOKUP_COST);
        let slot = self.registry.get_mut(&from).expect("checked in handle");
        for notify in slot.mailbox.drain(..) {
            out.sends.push((from, notify));
        }
        Ok(out)
    }

    fn on_set_conn(&mut self, from: ClientId, conn: Conn) -> Result<ServerOutput<T>, SimError> {
        let slot = self.registry.get_mut(&from).expect("checked in handle");
        slot.conn = conn;
        Ok(ServerOutput::with_cost(CLIENT_LOOKUP_COST))
    }

    fn on_snapshot_end(&mut self, from: ClientId) -> Result<ServerOutput<T>, SimError> {
        let mut out = ServerOutput::with_cost(CLIENT_LOOKUP_COST);
        let slot = self.registry.get_mut(&from).expect("checked in handle");
        slot.conn = Conn::Offline;
        let drained: Vec<_> = slot.queue.drain(..).collect();
        if !drained.is_empty() {
            out.traces.push(ServerTrace::Drained {
                client: from,
                count: drained.len(),
            });
        }
        out.requeue = drained.into_iter().map(|msg| (from, msg)).collect();
        Ok(out)
    }

    /// Connection state of a client.
    pub fn conn(&self, client: ClientId) -> Conn {
        self.registry[&client].conn
    }

    /// Pending mailbox length of a client.
    pub fn mailbox_len(&self, client: ClientId) -> usize {
        self.registry[&client].mailbox.len()
    }

    /// Parked submissions of a client.
    pub fn queue_len(&self, client: ClientId) -> usize {
        self.registry[&client].queue.len()
    }
}
