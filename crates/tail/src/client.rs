//! The tail client: a tape-driven sender with a payment window.

use paysim_core::{ClientMsg, ClientTrace, SimError, TapeEvent};
use paysim_types::{Amount, ClientId, MockTx, Slot};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// A client's off-chain balance.
///
/// `current` drifts as payments go out (event loop) and notifications come
/// in (inbound handler); `initial` is the settlement reset point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub initial: Amount,
    pub current: Amount,
}

/// What the driver should do after a client step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Step again immediately (more events at the current slot).
    Continue,
    /// Step again after the delay (slot boundary).
    Sleep(Duration),
    /// Settlement stall: wake `settlement_done` after the delay.
    Settle(Duration),
    /// Tape exhausted; no further wakes.
    Idle,
}

/// Effects of one client step.
#[derive(Debug)]
pub struct StepOutput {
    /// Messages to transmit to the server, in order.
    pub sends: Vec<ClientMsg<MockTx>>,
    pub trace: Option<ClientTrace>,
    pub next: Next,
}

/// Tape-walking client state machine.
///
/// Two concerns share the balance: the event loop subtracts submitted
/// amounts, the inbound handler adds notified ones. Sending is bursty;
/// after a submission the client counts as offline again and reconnects
/// (with a `WakeUp` trace) before its next pull.
#[derive(Debug)]
pub struct TailClient {
    id: ClientId,
    tape: VecDeque<TapeEvent>,
    slot: Slot,
    online: bool,
    pub balance: Balance,
    window: Option<(Amount, Amount)>,
    settlement_delay: u64,
    slot_length: Duration,
}

impl TailClient {
    pub fn new(
        id: ClientId,
        tape: Vec<TapeEvent>,
        window: Option<(Amount, Amount)>,
        settlement_delay: u64,
        slot_length: Duration,
    ) -> Self {
        debug_assert!(tape.iter().all(|e| e.client == id));
        Self {
            id,
            tape: tape.into(),
            slot: 0,
            online: false,
            balance: Balance {
                initial: 0,
                current: 0,
            },
            window,
            settlement_delay,
            slot_length,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn remaining_events(&self) -> usize {
        self.tape.len()
    }

    /// Inbound handler for server messages.
    pub fn on_server_msg(&mut self, msg: ClientMsg<MockTx>) -> Result<(), SimError> {
        match msg {
            ClientMsg::AckTx { .. } => Ok(()),
            ClientMsg::NotifyTx { tx } => {
                self.balance.current += tx.amount();
                Ok(())
            }
            other => Err(SimError::UnexpectedClientMsg {
                client: self.id,
                kind: other.msg_kind(),
            }),
        }
    }

    /// Would submitting `amount` keep the balance inside the payment
    /// window? An unset window always answers yes.
    fn submittable(&self, amount: Amount) -> bool {
        match self.window {
            None => true,
            Some((lower, upper)) => {
                let after = self.balance.current - amount;
                after >= self.balance.initial + lower && after <= self.balance.initial + upper
            }
        }
    }

    /// Advance the event loop by one decision.
    pub fn step(&mut self) -> StepOutput {
        let Some(event) = self.tape.front() else {
            // Tape exhausted; leave the session cleanly.
            let sends = if std::mem::take(&mut self.online) {
                vec![ClientMsg::Disconnect]
            } else {
                Vec::new()
            };
            return StepOutput {
                sends,
                trace: None,
                next: Next::Idle,
            };
        };

        if event.slot > self.slot {
            // Nothing left for this slot; sleep one slot boundary.
            let sends = if std::mem::take(&mut self.online) {
                vec![ClientMsg::Disconnect]
            } else {
                Vec::new()
            };
            self.slot += 1;
            return StepOutput {
                sends,
                trace: None,
                next: Next::Sleep(self.slot_length),
            };
        }

        if let ClientMsg::NewTx { tx, .. } = &event.msg {
            let amount = tx.amount();
            if !self.submittable(amount) {
                // Out of the payment window: stall for settlement and
                // retry this same event afterwards.
                debug!(client = self.id, amount, "payment window exceeded");
                return StepOutput {
                    sends: vec![ClientMsg::SnapshotStart],
                    trace: None,
                    next: Next::Settle(self.slot_length * self.settlement_delay as u32),
                };
            }
            let event = self.tape.pop_front().expect("peeked above");
            self.balance.current -= amount;
            // Bursty send: the client does not stay online between events.
            self.online = false;
            return StepOutput {
                sends: vec![event.msg],
                trace: None,
                next: Next::Continue,
            };
        }

        // Pull (or any other tape event): reconnect first if needed.
        let event = self.tape.pop_front().expect("peeked above");
        let mut sends = Vec::new();
        let mut trace = None;
        if !self.online {
            trace = Some(ClientTrace::WakeUp { slot: self.slot });
            sends.push(ClientMsg::Connect);
            self.online = true;
        }
        sends.push(event.msg);
        StepOutput {
            sends,
            trace,
            next: Next::Continue,
        }
    }

    /// The settlement stall elapsed: reset the balance, release the
    /// server, account the skipped slots, and retry the pending event.
    pub fn settlement_done(&mut self) -> StepOutput {
        self.balance.current = self.balance.initial;
        self.slot += self.settlement_delay;
        StepOutput {
            sends: vec![ClientMsg::SnapshotEnd],
            trace: None,
            next: Next::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysim_core::MsgKind;

    fn pull(slot: Slot, client: ClientId) -> TapeEvent {
        TapeEvent::new(slot, client, ClientMsg::Pull)
    }

    fn new_tx(slot: Slot, client: ClientId, amount: Amount) -> TapeEvent {
        TapeEvent::new(
            slot,
            client,
            ClientMsg::NewTx {
                tx: MockTx::new(client, slot, amount, 256),
                recipients: vec![client + 1],
            },
        )
    }

    #[test]
    fn pull_wakes_up_and_connects() {
        let mut client = TailClient::new(1, vec![pull(0, 1)], None, 5, Duration::from_secs(1));
        let out = client.step();
        assert_eq!(out.trace, Some(ClientTrace::WakeUp { slot: 0 }));
        assert_eq!(out.sends.len(), 2);
        assert_eq!(out.sends[0].msg_kind(), MsgKind::Connect);
        assert_eq!(out.sends[1].msg_kind(), MsgKind::Pull);
        assert_eq!(out.next, Next::Continue);
    }

    #[test]
    fn submission_is_bursty_and_debits_balance() {
        let mut client = TailClient::new(1, vec![new_tx(0, 1, 40)], None, 5, Duration::from_secs(1));
        let out = client.step();
        assert_eq!(out.sends.len(), 1);
        assert_eq!(out.sends[0].msg_kind(), MsgKind::NewTx);
        assert_eq!(client.balance.current, -40);

        // The next pull reconnects: the client went offline after sending.
        let mut client = TailClient::new(
            1,
            vec![new_tx(0, 1, 40), pull(0, 1)],
            None,
            5,
            Duration::from_secs(1),
        );
        client.step();
        let out = client.step();
        assert_eq!(out.sends[0].msg_kind(), MsgKind::Connect);
    }

    #[test]
    fn future_slot_sleeps_one_slot_length() {
        let mut client = TailClient::new(1, vec![pull(2, 1)], None, 5, Duration::from_secs(1));
        let out = client.step();
        assert_eq!(out.next, Next::Sleep(Duration::from_secs(1)));
        assert_eq!(client.slot(), 1);
        assert!(out.sends.is_empty(), "offline client has nothing to say");
    }

    #[test]
    fn leaving_the_window_triggers_settlement() {
        let mut client = TailClient::new(
            1,
            vec![new_tx(0, 1, 10)],
            Some((-100, 100)),
            5,
            Duration::from_secs(1),
        );
        client.balance.current = -95;

        let out = client.step();
        assert_eq!(out.sends[0].msg_kind(), MsgKind::SnapshotStart);
        assert_eq!(out.next, Next::Settle(Duration::from_secs(5)));
        assert_eq!(client.remaining_events(), 1, "event not consumed");

        let out = client.settlement_done();
        assert_eq!(out.sends[0].msg_kind(), MsgKind::SnapshotEnd);
        assert_eq!(client.balance.current, 0);
        assert_eq!(client.slot(), 5);

        // The same submission now fits the window.
        let out = client.step();
        assert_eq!(out.sends[0].msg_kind(), MsgKind::NewTx);
        assert_eq!(client.balance.current, -10);
    }

    #[test]
    fn notifications_credit_the_balance() {
        let mut client = TailClient::new(1, vec![], None, 5, Duration::from_secs(1));
        client
            .on_server_msg(ClientMsg::NotifyTx {
                tx: MockTx::new(2, 0, 30, 256),
            })
            .unwrap();
        assert_eq!(client.balance.current, 30);
    }

    #[test]
    fn client_bound_protocol_only() {
        let mut client = TailClient::new(1, vec![], None, 5, Duration::from_secs(1));
        let err = client.on_server_msg(ClientMsg::Pull).unwrap_err();
        assert_eq!(
            err,
            SimError::UnexpectedClientMsg {
                client: 1,
                kind: MsgKind::Pull
            }
        );
    }

    #[test]
    fn exhausted_tape_disconnects_once() {
        let mut client = TailClient::new(1, vec![pull(0, 1)], None, 5, Duration::from_secs(1));
        client.step();
        let out = client.step();
        assert_eq!(out.sends.len(), 1);
        assert_eq!(out.sends[0].msg_kind(), MsgKind::Disconnect);
        assert_eq!(out.next, Next::Idle);

        let out = client.step();
        assert!(out.sends.is_empty());
        assert_eq!(out.next, Next::Idle);
    }
}
