//! Opaque transaction references backed by Blake3 content hashes.

use std::fmt;

/// A 32-byte opaque transaction reference.
///
/// References are content hashes: the same `(client, slot, amount)` triple
/// always produces the same reference. Safe to use as a map key; ordering is
/// lexicographic over the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxRef([u8; 32]);

impl TxRef {
    /// Size of a reference in bytes, as encoded on the wire.
    pub const BYTES: usize = 32;

    /// Zero reference (all bytes 0x00).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Hash arbitrary bytes into a reference.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let hash = blake3::hash(bytes);
        Self(*hash.as_bytes())
    }

    /// Hash multiple byte slices into a reference.
    pub fn from_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Raw bytes of the reference.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex chars are enough to tell references apart in traces.
        write!(
            f,
            "TxRef({:02x}{:02x}{:02x}{:02x})",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
