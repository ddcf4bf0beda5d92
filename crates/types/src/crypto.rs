//! Modelled signature schemes for the head protocol.
//!
//! Signatures here are opaque stand-ins: a signature records which party
//! signed which message digest, and verification is a structural check.
//! What the model does carry faithfully is *cost*: every operation returns
//! a [`DelayedComp`] with the fixed virtual-time price of the real
//! primitive, so the simulation charges CPU work where a production node
//! would spend it.

use crate::snap::SnapN;
use crate::{DelayedComp, NodeId, Tx, TxRef};
use std::collections::BTreeSet;
use std::time::Duration;

/// Cost of producing one signature.
pub const SIGN_COST: Duration = Duration::from_micros(250);
/// Cost of verifying one signature.
pub const VERIFY_COST: Duration = Duration::from_micros(150);
/// Cost of folding one signature into an aggregate.
pub const AGGREGATE_COST_PER_SIG: Duration = Duration::from_micros(20);
/// Cost of verifying an aggregate signature.
pub const VERIFY_AGG_COST: Duration = Duration::from_micros(300);

/// Domain tag for transaction signatures.
const DOMAIN_TX: &[u8] = b"PAYSIM_TX";
/// Domain tag for snapshot signatures.
const DOMAIN_SNAP: &[u8] = b"PAYSIM_SNAP";

/// A party's secret key. Opaque; only its owner index matters to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretKey {
    party: NodeId,
}

/// A party's verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VerKey {
    pub party: NodeId,
}

/// A single signature over a domain-tagged message digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    pub signer: NodeId,
    digest: TxRef,
}

/// Aggregate verification key over a set of parties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggVerKey {
    pub parties: BTreeSet<NodeId>,
}

/// Aggregate signature: one signature from every party in `signers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggSignature {
    pub signers: BTreeSet<NodeId>,
    digest: TxRef,
}

impl SecretKey {
    pub fn new(party: NodeId) -> Self {
        Self { party }
    }

    pub fn ver_key(&self) -> VerKey {
        VerKey { party: self.party }
    }
}

impl AggVerKey {
    /// Aggregate key for parties `0..n`.
    pub fn for_parties(n: u32) -> Self {
        Self {
            parties: (0..n).collect(),
        }
    }
}

impl AggSignature {
    /// The constituent signatures. The modelled aggregate keeps its member
    /// set, so a verified aggregate can refill a local signature set the
    /// way the per-party acknowledgements originally built it.
    pub fn members(&self) -> impl Iterator<Item = Signature> + '_ {
        self.signers.iter().map(|&signer| Signature {
            signer,
            digest: self.digest,
        })
    }
}

fn tx_digest(txref: &TxRef) -> TxRef {
    TxRef::from_parts(&[DOMAIN_TX, txref.as_bytes()])
}

fn snap_digest(n: SnapN, included: &BTreeSet<TxRef>) -> TxRef {
    let mut parts: Vec<&[u8]> = vec![DOMAIN_SNAP];
    let n_bytes = n.0.to_le_bytes();
    parts.push(&n_bytes);
    for txref in included {
        parts.push(txref.as_bytes());
    }
    TxRef::from_parts(&parts)
}

/// Sign a transaction reference.
pub fn sign_tx(sk: &SecretKey, txref: &TxRef) -> DelayedComp<Signature> {
    DelayedComp::new(
        Signature {
            signer: sk.party,
            digest: tx_digest(txref),
        },
        SIGN_COST,
    )
}

/// Verify a single transaction signature against the signer's key.
pub fn verify_tx_sig(vk: &VerKey, txref: &TxRef, sig: &Signature) -> DelayedComp<bool> {
    let valid = sig.signer == vk.party && sig.digest == tx_digest(txref);
    DelayedComp::new(valid, VERIFY_COST)
}

/// Aggregate a full set of transaction signatures.
pub fn aggregate_tx<'a>(
    sigs: impl IntoIterator<Item = &'a Signature>,
    txref: &TxRef,
) -> DelayedComp<AggSignature> {
    let signers: BTreeSet<NodeId> = sigs.into_iter().map(|s| s.signer).collect();
    let cost = AGGREGATE_COST_PER_SIG * signers.len() as u32;
    DelayedComp::new(
        AggSignature {
            signers,
            digest: tx_digest(txref),
        },
        cost,
    )
}

/// Verify an aggregate transaction signature against the aggregate key.
pub fn verify_tx(avk: &AggVerKey, txref: &TxRef, agg: &AggSignature) -> DelayedComp<bool> {
    let valid = agg.signers == avk.parties && agg.digest == tx_digest(txref);
    DelayedComp::new(valid, VERIFY_AGG_COST)
}

/// Sign a snapshot, identified by its number and included tx set.
pub fn sign_snap(
    sk: &SecretKey,
    n: SnapN,
    included: &BTreeSet<TxRef>,
) -> DelayedComp<Signature> {
    DelayedComp::new(
        Signature {
            signer: sk.party,
            digest: snap_digest(n, included),
        },
        SIGN_COST,
    )
}

/// Verify a single snapshot signature.
pub fn verify_snap_sig(
    vk: &VerKey,
    n: SnapN,
    included: &BTreeSet<TxRef>,
    sig: &Signature,
) -> DelayedComp<bool> {
    let valid = sig.signer == vk.party && sig.digest == snap_digest(n, included);
    DelayedComp::new(valid, VERIFY_COST)
}

/// Aggregate a full set of snapshot signatures.
pub fn aggregate_snap<'a>(
    sigs: impl IntoIterator<Item = &'a Signature>,
    n: SnapN,
    included: &BTreeSet<TxRef>,
) -> DelayedComp<AggSignature> {
    let signers: BTreeSet<NodeId> = sigs.into_iter().map(|s| s.signer).collect();
    let cost = AGGREGATE_COST_PER_SIG * signers.len() as u32;
    DelayedComp::new(
        AggSignature {
            signers,
            digest: snap_digest(n, included),
        },
        cost,
    )
}

/// Verify an aggregate snapshot signature.
pub fn verify_snap(
    avk: &AggVerKey,
    n: SnapN,
    included: &BTreeSet<TxRef>,
    agg: &AggSignature,
) -> DelayedComp<bool> {
    let valid = agg.signers == avk.parties && agg.digest == snap_digest(n, included);
    DelayedComp::new(valid, VERIFY_AGG_COST)
}

/// Convenience: sign a whole transaction (its reference).
pub fn sign<T: Tx>(sk: &SecretKey, tx: &T) -> DelayedComp<Signature> {
    sign_tx(sk, &tx.txref())
}
