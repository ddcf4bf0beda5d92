//! The head node state machine.

use paysim_core::{Decision, HeadEvent, HeadTrace, Outgoing, WireMessage};
use paysim_types::crypto::{
    self, AggVerKey, SecretKey, Signature, VerKey,
};
use paysim_types::tx::TX_VALIDATE_COST;
use paysim_types::{NodeId, Snap, SnapN, Tx, TxIn, TxRecord, TxRef};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::trace;

/// Pure leader schedule: which party seals snapshot `n`.
pub type LeaderFn = fn(SnapN, u32) -> NodeId;

/// The default round-robin schedule, `n mod parties`.
pub fn leader_mod_n(n: SnapN, parties: u32) -> NodeId {
    n.0.rem_euclid(parties as i64) as NodeId
}

/// Per-party protocol state.
///
/// The `_sig` fields track everything this party has signed; the `_conf`
/// fields track what carries an aggregate signature. `snap_n_conf` never
/// exceeds `snap_n_sig`, and both only grow.
#[derive(Debug, Clone)]
pub struct HeadState<T> {
    pub snap_n_sig: SnapN,
    pub snap_n_conf: SnapN,
    pub utxo_sig: BTreeSet<TxIn>,
    pub utxo_conf: BTreeSet<TxIn>,
    pub snap_sig: Snap,
    pub snap_conf: Snap,
    pub txs_sig: BTreeMap<TxRef, TxRecord<T>>,
    pub txs_conf: BTreeMap<TxRef, TxRecord<T>>,
}

impl<T> HeadState<T> {
    fn new(genesis_utxo: BTreeSet<TxIn>) -> Self {
        Self {
            snap_n_sig: SnapN::NONE,
            snap_n_conf: SnapN::NONE,
            utxo_sig: genesis_utxo.clone(),
            utxo_conf: genesis_utxo.clone(),
            snap_sig: Snap::genesis(genesis_utxo.clone()),
            snap_conf: Snap::genesis(genesis_utxo),
            txs_sig: BTreeMap::new(),
            txs_conf: BTreeMap::new(),
        }
    }
}

/// One party of the head protocol.
///
/// `handle` is the transition function: it inspects guards first and
/// mutates state only when the event applies, so a `Wait` or `Invalid`
/// verdict leaves the node exactly as it was (apart from the virtual time
/// spent deciding).
#[derive(Debug)]
pub struct HeadNode<T> {
    id: NodeId,
    sk: SecretKey,
    vks: Vec<VerKey>,
    avk: AggVerKey,
    leader: LeaderFn,
    state: HeadState<T>,
}

impl<T: Tx> HeadNode<T> {
    pub fn new(id: NodeId, parties: u32, leader: LeaderFn, genesis_utxo: BTreeSet<TxIn>) -> Self {
        Self {
            id,
            sk: SecretKey::new(id),
            vks: (0..parties).map(|p| VerKey { party: p }).collect(),
            avk: AggVerKey::for_parties(parties),
            leader,
            state: HeadState::new(genesis_utxo),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> &HeadState<T> {
        &self.state
    }

    fn parties(&self) -> u32 {
        self.vks.len() as u32
    }

    /// Which party seals snapshot `n`.
    pub fn leader_for(&self, n: SnapN) -> NodeId {
        (self.leader)(n, self.parties())
    }

    /// Feed one event to the state machine.
    pub fn handle(&mut self, from: NodeId, event: &HeadEvent<T>) -> Decision<HeadEvent<T>> {
        trace!(node = self.id, from, kind = event.kind(), "head event");
        match event {
            HeadEvent::New { tx } => self.on_new(tx),
            HeadEvent::SigReqTx { tx } => self.on_sig_req_tx(from, tx),
            HeadEvent::SigAckTx { txref, sig } => self.on_sig_ack_tx(*txref, *sig),
            HeadEvent::SigConfTx { txref, agg } => self.on_sig_conf_tx(*txref, agg),
            HeadEvent::NewSn => self.on_new_snapshot(),
            HeadEvent::SigReqSn { n, included } => self.on_sig_req_sn(from, *n, included),
            HeadEvent::SigAckSn { n, sig } => self.on_sig_ack_sn(*n, *sig),
            HeadEvent::SigConfSn { n, agg } => self.on_sig_conf_sn(*n, agg),
        }
    }

    // ─── Transactions ───

    fn on_new(&mut self, tx: &T) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        let valid = tx.validate().run(&mut cost);
        if !valid {
            return invalid(cost, "submitted tx failed validation");
        }
        let txref = tx.txref();
        if self.state.txs_sig.contains_key(&txref) {
            return invalid(cost, "duplicate tx submission");
        }
        if !tx.inputs().is_subset(&self.state.utxo_sig) {
            return Decision::Wait { cost };
        }

        let deps = self.deps_of(tx);
        let sig = crypto::sign(&self.sk, tx).run(&mut cost);
        let mut record = TxRecord::new(self.id, tx.clone(), deps);
        record.sigs.insert(self.id, sig);
        self.apply_tx_to_utxo_sig(tx);
        self.state.txs_sig.insert(txref, record);

        Decision::apply(cost, Outgoing::Multicast(HeadEvent::SigReqTx { tx: tx.clone() }))
    }

    fn on_sig_req_tx(&mut self, from: NodeId, tx: &T) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        let valid = tx.validate().run(&mut cost);
        if !valid {
            return invalid(cost, "signing request for invalid tx");
        }
        let txref = tx.txref();
        if self.state.txs_sig.contains_key(&txref) {
            return invalid(cost, "signing request for known tx");
        }
        if !tx.inputs().is_subset(&self.state.utxo_sig) {
            return Decision::Wait { cost };
        }

        let deps = self.deps_of(tx);
        let sig = crypto::sign(&self.sk, tx).run(&mut cost);
        let mut record = TxRecord::new(from, tx.clone(), deps);
        record.sigs.insert(self.id, sig);
        self.apply_tx_to_utxo_sig(tx);
        self.state.txs_sig.insert(txref, record);

        Decision::apply(
            cost,
            Outgoing::SendTo(from, HeadEvent::SigAckTx { txref, sig }),
        )
    }

    fn on_sig_ack_tx(&mut self, txref: TxRef, sig: Signature) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        let Some(vk) = self.vks.get(sig.signer as usize).copied() else {
            return invalid(TX_VALIDATE_COST, "ack signed by unknown party");
        };
        if !self.state.txs_sig.contains_key(&txref) {
            // The request round trip outran our own bookkeeping; retry.
            return Decision::Wait {
                cost: TX_VALIDATE_COST,
            };
        }
        if self.state.txs_sig[&txref].agg.is_some() {
            return invalid(TX_VALIDATE_COST, "ack for already confirmed tx");
        }
        let ok = crypto::verify_tx_sig(&vk, &txref, &sig).run(&mut cost);
        if !ok {
            return invalid(cost, "ack signature does not verify");
        }

        let record = self.state.txs_sig.get_mut(&txref).expect("checked above");
        record.sigs.insert(sig.signer, sig);
        if record.sigs.len() < self.vks.len() {
            return Decision::apply(cost, Outgoing::None);
        }

        let agg = crypto::aggregate_tx(record.sigs.values(), &txref).run(&mut cost);
        record.agg = Some(agg.clone());
        self.confirm_tx(txref);
        Decision::Apply {
            cost,
            trace: Some(HeadTrace::TxConfirmed { txref }),
            outgoing: Outgoing::Multicast(HeadEvent::SigConfTx { txref, agg }),
        }
    }

    fn on_sig_conf_tx(
        &mut self,
        txref: TxRef,
        agg: &crypto::AggSignature,
    ) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        if !self.state.txs_sig.contains_key(&txref) {
            // Confirmation can overtake the signing request on a fast link.
            return Decision::Wait {
                cost: TX_VALIDATE_COST,
            };
        }
        if self.state.txs_conf.contains_key(&txref) {
            return invalid(TX_VALIDATE_COST, "confirmation for already confirmed tx");
        }
        let ok = crypto::verify_tx(&self.avk, &txref, agg).run(&mut cost);
        if !ok {
            return invalid(cost, "aggregate tx signature does not verify");
        }

        let record = self.state.txs_sig.get_mut(&txref).expect("checked above");
        record.sigs = agg.members().map(|s| (s.signer, s)).collect();
        record.agg = Some(agg.clone());
        self.confirm_tx(txref);
        Decision::Apply {
            cost,
            trace: Some(HeadTrace::TxConfirmed { txref }),
            outgoing: Outgoing::None,
        }
    }

    // ─── Snapshots ───

    fn on_new_snapshot(&mut self) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        let n = self.state.snap_n_sig.next();
        if self.leader_for(n) != self.id {
            return invalid(TX_VALIDATE_COST, "not the leader for the next snapshot");
        }
        // Seal only once every signed tx has been confirmed, and only when
        // there is something to cover.
        let all_confirmed = self
            .state
            .txs_sig
            .keys()
            .all(|r| self.state.txs_conf.contains_key(r));
        if !all_confirmed || self.state.txs_conf.is_empty() {
            return Decision::Wait {
                cost: TX_VALIDATE_COST,
            };
        }

        let included: BTreeSet<TxRef> = self
            .state
            .txs_conf
            .keys()
            .filter(|r| !self.state.snap_conf.included.contains(*r))
            .copied()
            .collect();
        let sig = crypto::sign_snap(&self.sk, n, &included).run(&mut cost);

        self.state.snap_n_sig = n;
        self.state.snap_sig = Snap {
            n,
            utxo: self.state.utxo_conf.clone(),
            included: included.clone(),
            sigs: BTreeMap::from([(self.id, sig)]),
            agg: None,
        };

        Decision::apply(
            cost,
            Outgoing::Multicast(HeadEvent::SigReqSn {
                n,
                included: included.into_iter().collect(),
            }),
        )
    }

    fn on_sig_req_sn(
        &mut self,
        from: NodeId,
        n: SnapN,
        included: &[TxRef],
    ) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        if from != self.leader_for(n) {
            return invalid(TX_VALIDATE_COST, "snapshot request from non-leader");
        }
        let expected = self.state.snap_n_sig.next();
        if n < expected {
            return invalid(TX_VALIDATE_COST, "snapshot request for a signed number");
        }
        if n > expected {
            // An earlier snapshot round has not reached us yet.
            return Decision::Wait {
                cost: TX_VALIDATE_COST,
            };
        }
        if !included
            .iter()
            .all(|r| self.state.txs_conf.contains_key(r))
        {
            // Some covered tx is still in its signing round locally.
            return Decision::Wait {
                cost: TX_VALIDATE_COST,
            };
        }

        let included: BTreeSet<TxRef> = included.iter().copied().collect();
        let sig = crypto::sign_snap(&self.sk, n, &included).run(&mut cost);

        self.state.snap_n_sig = n;
        self.state.snap_sig = Snap {
            n,
            utxo: self.state.utxo_conf.clone(),
            included,
            sigs: BTreeMap::from([(self.id, sig)]),
            agg: None,
        };

        Decision::apply(
            cost,
            Outgoing::SendTo(from, HeadEvent::SigAckSn { n, sig }),
        )
    }

    fn on_sig_ack_sn(&mut self, n: SnapN, sig: Signature) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        let Some(vk) = self.vks.get(sig.signer as usize).copied() else {
            return invalid(TX_VALIDATE_COST, "snapshot ack from unknown party");
        };
        if n != self.state.snap_n_sig || self.state.snap_sig.n != n {
            if n > self.state.snap_n_sig {
                return Decision::Wait {
                    cost: TX_VALIDATE_COST,
                };
            }
            return invalid(TX_VALIDATE_COST, "snapshot ack for a stale number");
        }
        if self.state.snap_sig.agg.is_some() {
            return invalid(TX_VALIDATE_COST, "ack for already confirmed snapshot");
        }

        let ok =
            crypto::verify_snap_sig(&vk, n, &self.state.snap_sig.included, &sig).run(&mut cost);
        if !ok {
            return invalid(cost, "snapshot ack signature does not verify");
        }

        self.state.snap_sig.sigs.insert(sig.signer, sig);
        if self.state.snap_sig.sigs.len() < self.vks.len() {
            return Decision::apply(cost, Outgoing::None);
        }

        let agg = crypto::aggregate_snap(
            self.state.snap_sig.sigs.values(),
            n,
            &self.state.snap_sig.included,
        )
        .run(&mut cost);
        self.confirm_snapshot(agg.clone());
        Decision::Apply {
            cost,
            trace: Some(HeadTrace::SnapConfirmed { n }),
            outgoing: Outgoing::Multicast(HeadEvent::SigConfSn { n, agg }),
        }
    }

    fn on_sig_conf_sn(&mut self, n: SnapN, agg: &crypto::AggSignature) -> Decision<HeadEvent<T>> {
        let mut cost = Duration::ZERO;
        let expected = self.state.snap_n_conf.next();
        if n < expected {
            return invalid(TX_VALIDATE_COST, "snapshot confirmation for a past number");
        }
        if n > expected || self.state.snap_sig.n != n {
            // Our own signing round for `n` has not finished yet.
            return Decision::Wait {
                cost: TX_VALIDATE_COST,
            };
        }

        let ok = crypto::verify_snap(&self.avk, n, &self.state.snap_sig.included, agg)
            .run(&mut cost);
        if !ok {
            return invalid(cost, "aggregate snapshot signature does not verify");
        }

        self.confirm_snapshot(agg.clone());
        Decision::Apply {
            cost,
            trace: Some(HeadTrace::SnapConfirmed { n }),
            outgoing: Outgoing::None,
        }
    }

    // ─── State updates ───

    /// References of known transactions whose outputs `tx` consumes.
    fn deps_of(&self, tx: &T) -> BTreeSet<TxRef> {
        self.state
            .txs_sig
            .values()
            .filter(|rec| rec.tx.outputs().iter().any(|o| tx.inputs().contains(o)))
            .map(|rec| rec.tx.txref())
            .collect()
    }

    fn apply_tx_to_utxo_sig(&mut self, tx: &T) {
        for spent in tx.inputs() {
            self.state.utxo_sig.remove(spent);
        }
        self.state.utxo_sig.extend(tx.outputs().iter().copied());
    }

    /// Copy a fully signed record into the confirmed view and settle the
    /// confirmed UTxO.
    fn confirm_tx(&mut self, txref: TxRef) {
        let record = self.state.txs_sig.get(&txref).expect("record exists");
        debug_assert!(record.agg.is_some());
        for spent in record.tx.inputs() {
            self.state.utxo_conf.remove(spent);
        }
        self.state
            .utxo_conf
            .extend(record.tx.outputs().iter().copied());
        self.state.txs_conf.insert(txref, record.clone());
    }

    /// Commit the signed snapshot as confirmed and prune the transactions
    /// it subsumes.
    fn confirm_snapshot(&mut self, agg: crypto::AggSignature) {
        let n = self.state.snap_sig.n;
        debug_assert_eq!(n, self.state.snap_n_conf.next());
        self.state.snap_sig.sigs = agg.members().map(|s| (s.signer, s)).collect();
        self.state.snap_sig.agg = Some(agg);
        self.state.snap_conf = self.state.snap_sig.clone();
        self.state.snap_n_conf = n;
        for txref in self.state.snap_conf.included.clone() {
            self.state.txs_conf.remove(&txref);
            self.state.txs_sig.remove(&txref);
        }
    }

    /// Structural invariants of the confirmed state, checked by tests and
    /// the drivers.
    pub fn check_invariants(&self) {
        assert!(self.state.snap_n_conf <= self.state.snap_n_sig);
        for (txref, rec) in &self.state.txs_conf {
            assert!(
                self.state.txs_sig.contains_key(txref),
                "confirmed tx missing from signed view"
            );
            assert_eq!(rec.sigs.len(), self.vks.len());
            let agg = rec.agg.as_ref().expect("confirmed tx carries aggregate");
            assert!(*crypto::verify_tx(&self.avk, txref, agg).peek());
        }
        if let Some(agg) = &self.state.snap_conf.agg {
            assert_eq!(self.state.snap_conf.sigs.len(), self.vks.len());
            assert!(*crypto::verify_snap(
                &self.avk,
                self.state.snap_conf.n,
                &self.state.snap_conf.included,
                agg
            )
            .peek());
        }
    }
}

fn invalid<M>(cost: Duration, reason: &str) -> Decision<M> {
    Decision::Invalid {
        cost,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paysim_types::MockTx;

    fn genesis_input(node: NodeId) -> TxIn {
        TxIn::new(TxRef::from_parts(&[b"genesis", &node.to_le_bytes()]), 0)
    }

    fn three_nodes() -> Vec<HeadNode<MockTx>> {
        let genesis: BTreeSet<TxIn> = (0..3).map(genesis_input).collect();
        (0..3)
            .map(|id| HeadNode::new(id, 3, leader_mod_n, genesis.clone()))
            .collect()
    }

    fn spend_genesis(node: NodeId) -> MockTx {
        MockTx::with_utxo(
            node,
            0,
            10,
            256,
            BTreeSet::from([genesis_input(node)]),
            1,
        )
    }

    #[test]
    fn new_tx_multicasts_signing_request() {
        let mut nodes = three_nodes();
        let tx = spend_genesis(0);
        let decision = nodes[0].handle(0, &HeadEvent::New { tx: tx.clone() });
        match decision {
            Decision::Apply { outgoing, .. } => {
                assert!(matches!(outgoing, Outgoing::Multicast(HeadEvent::SigReqTx { .. })));
            }
            other => panic!("expected Apply, got {other:?}"),
        }
        let state = nodes[0].state();
        assert!(state.txs_sig.contains_key(&tx.txref()));
        assert!(!state.utxo_sig.contains(&genesis_input(0)));
    }

    #[test]
    fn missing_inputs_defer_the_event() {
        let mut nodes = three_nodes();
        // Spends an output that no known tx produced.
        let tx = MockTx::with_utxo(
            0,
            0,
            10,
            256,
            BTreeSet::from([TxIn::new(TxRef::from_bytes(b"unknown"), 0)]),
            1,
        );
        let decision = nodes[0].handle(0, &HeadEvent::New { tx });
        assert!(matches!(decision, Decision::Wait { .. }));
    }

    #[test]
    fn full_ack_set_confirms_and_multicasts() {
        let mut nodes = three_nodes();
        let tx = spend_genesis(0);
        let txref = tx.txref();

        nodes[0].handle(0, &HeadEvent::New { tx: tx.clone() });
        // Peers sign and ack back to the issuer.
        let mut acks = Vec::new();
        for peer in 1..3u32 {
            let decision = nodes[peer as usize].handle(0, &HeadEvent::SigReqTx { tx: tx.clone() });
            match decision {
                Decision::Apply {
                    outgoing: Outgoing::SendTo(to, HeadEvent::SigAckTx { txref: r, sig }),
                    ..
                } => {
                    assert_eq!(to, 0);
                    assert_eq!(r, txref);
                    acks.push(sig);
                }
                other => panic!("expected ack, got {other:?}"),
            }
        }

        let first = nodes[0].handle(1, &HeadEvent::SigAckTx { txref, sig: acks[0] });
        assert!(matches!(
            first,
            Decision::Apply {
                outgoing: Outgoing::None,
                ..
            }
        ));

        let second = nodes[0].handle(2, &HeadEvent::SigAckTx { txref, sig: acks[1] });
        match second {
            Decision::Apply {
                trace, outgoing, ..
            } => {
                assert_eq!(trace, Some(HeadTrace::TxConfirmed { txref }));
                assert!(matches!(outgoing, Outgoing::Multicast(HeadEvent::SigConfTx { .. })));
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
        assert!(nodes[0].state().txs_conf.contains_key(&txref));
        nodes[0].check_invariants();
    }

    #[test]
    fn forged_ack_is_invalid() {
        let mut nodes = three_nodes();
        let tx = spend_genesis(0);
        let txref = tx.txref();
        nodes[0].handle(0, &HeadEvent::New { tx: tx.clone() });

        // A signature over a different tx does not verify for this one.
        let other = spend_genesis(1);
        let forged = crypto::sign_tx(&SecretKey::new(1), &other.txref())
            .into_parts()
            .0;
        let decision = nodes[0].handle(1, &HeadEvent::SigAckTx { txref, sig: forged });
        assert!(matches!(decision, Decision::Invalid { .. }));
        assert!(!nodes[0].state().txs_conf.contains_key(&txref));
    }

    #[test]
    fn non_leader_cannot_seal() {
        let mut nodes = three_nodes();
        let decision = nodes[1].handle(1, &HeadEvent::NewSn);
        assert!(matches!(decision, Decision::Invalid { .. }));
    }

    #[test]
    fn leader_waits_until_signed_txs_confirm() {
        let mut nodes = three_nodes();
        let tx = spend_genesis(0);
        nodes[0].handle(0, &HeadEvent::New { tx });
        // tx signed but not confirmed: the seal must wait.
        let decision = nodes[0].handle(0, &HeadEvent::NewSn);
        assert!(matches!(decision, Decision::Wait { .. }));
    }

    #[test]
    fn stale_snapshot_confirmation_is_invalid() {
        let mut nodes = three_nodes();
        let agg = crypto::aggregate_snap(
            std::iter::empty::<&Signature>(),
            SnapN(-1),
            &BTreeSet::new(),
        )
        .into_parts()
        .0;
        let decision = nodes[0].handle(1, &HeadEvent::SigConfSn { n: SnapN(-1), agg });
        assert!(matches!(decision, Decision::Invalid { .. }));
    }
}
