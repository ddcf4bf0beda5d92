//! Transaction abstraction and the mock instance used by both simulators.

use crate::{Amount, ClientId, DelayedComp, Slot, TxRef};
use std::collections::BTreeSet;
use std::time::Duration;

/// Fixed virtual-time cost of validating a [`MockTx`].
pub const TX_VALIDATE_COST: Duration = Duration::from_micros(400);

/// An unspent output pointer: `(producing tx, output index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxIn {
    pub txref: TxRef,
    pub index: u16,
}

impl TxIn {
    pub fn new(txref: TxRef, index: u16) -> Self {
        Self { txref, index }
    }
}

/// The transaction interface the protocol models require.
///
/// Implementations are immutable value types with a total order (used to
/// keep multi-node iteration deterministic). Validation work is modelled,
/// not performed: `validate` returns a [`DelayedComp`] whose cost the
/// simulation charges against the validating task.
pub trait Tx: Clone + Ord + std::fmt::Debug {
    /// Content-addressed reference of this transaction.
    fn txref(&self) -> TxRef;

    /// Outputs this transaction consumes.
    fn inputs(&self) -> &BTreeSet<TxIn>;

    /// Outputs this transaction produces.
    fn outputs(&self) -> &BTreeSet<TxIn>;

    /// Modelled byte size of the transaction body.
    fn size(&self) -> u64;

    /// Structural validation with its modelled CPU cost.
    fn validate(&self) -> DelayedComp<bool>;
}

/// Mock transaction: a sized payment of `amount` from `client` at `slot`.
///
/// The reference is a content hash of `(client, slot, amount)`, so replaying
/// the same tape reproduces the same references. Validation always succeeds
/// after the fixed [`TX_VALIDATE_COST`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTx {
    txref: TxRef,
    size: u64,
    amount: Amount,
    inputs: BTreeSet<TxIn>,
    outputs: BTreeSet<TxIn>,
}

impl MockTx {
    /// Build a mock payment. Outputs default to a single output `(ref, 0)`;
    /// `inputs` is empty, which suits the tail model where settlement is
    /// tracked through balances rather than UTxO.
    pub fn new(client: ClientId, slot: Slot, amount: Amount, size: u64) -> Self {
        let txref = TxRef::from_parts(&[
            &client.to_le_bytes(),
            &slot.to_le_bytes(),
            &amount.to_le_bytes(),
        ]);
        let outputs = BTreeSet::from([TxIn::new(txref, 0)]);
        Self {
            txref,
            size,
            amount,
            inputs: BTreeSet::new(),
            outputs,
        }
    }

    /// Build a mock transaction that spends explicit inputs and produces
    /// `n_outputs` fresh outputs. Used by the head simulation, where the
    /// UTxO set is tracked explicitly.
    pub fn with_utxo(
        client: ClientId,
        slot: Slot,
        amount: Amount,
        size: u64,
        inputs: BTreeSet<TxIn>,
        n_outputs: u16,
    ) -> Self {
        let mut tx = Self::new(client, slot, amount, size);
        tx.inputs = inputs;
        tx.outputs = (0..n_outputs).map(|i| TxIn::new(tx.txref, i)).collect();
        tx
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }
}

impl PartialOrd for MockTx {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MockTx {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.txref.cmp(&other.txref)
    }
}

impl Tx for MockTx {
    fn txref(&self) -> TxRef {
        self.txref
    }

    fn inputs(&self) -> &BTreeSet<TxIn> {
        &self.inputs
    }

    fn outputs(&self) -> &BTreeSet<TxIn> {
        &self.outputs
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn validate(&self) -> DelayedComp<bool> {
        DelayedComp::new(true, TX_VALIDATE_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_are_content_addressed() {
        let a = MockTx::new(1, 9, 40, 256);
        let b = MockTx::new(1, 9, 40, 512);
        let c = MockTx::new(1, 9, 41, 256);
        // Size does not participate in the content hash.
        assert_eq!(a.txref(), b.txref());
        assert_ne!(a.txref(), c.txref());
    }

    #[test]
    fn validation_charges_fixed_cost() {
        let tx = MockTx::new(2, 1, 10, 300);
        let (ok, cost) = tx.validate().into_parts();
        assert!(ok);
        assert_eq!(cost, TX_VALIDATE_COST);
    }

    #[test]
    fn utxo_variant_wires_outputs_to_own_ref() {
        let genesis = TxIn::new(TxRef::from_bytes(b"genesis"), 0);
        let tx = MockTx::with_utxo(1, 0, 5, 200, BTreeSet::from([genesis]), 2);
        assert_eq!(tx.outputs().len(), 2);
        assert!(tx.outputs().iter().all(|o| o.txref == tx.txref()));
        assert!(tx.inputs().contains(&genesis));
    }
}
