//! The read-only transaction view that scripts are verified against.
//!
//! Decoding transactions from the wire is left to the caller. This only holds what signature
//! hashing and lock time checks need, plus the few consensus encodings that signature preimages
//! are built from.

use alloc::vec::Vec;

use crate::script;

/// Setting `sequence` to this value for every input in a transaction disables `lock_time`.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// If this flag is set, `TxIn::sequence` is NOT interpreted as a relative lock time
/// ([BIP68](https://github.com/bitcoin/bips/blob/master/bip-0068.mediawiki)).
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// If `TxIn::sequence` encodes a relative lock time and this flag is set, the relative lock time
/// has units of 512 seconds, otherwise it specifies blocks with a granularity of 1.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// If `TxIn::sequence` encodes a relative lock time, this mask is applied to extract that lock
/// time from the sequence field.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Threshold for `Transaction::lock_time`: below this value it is interpreted as block number,
/// otherwise as UNIX timestamp.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// A reference to an output of a previous transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutPoint {
    /// The id of the transaction holding the output, in internal byte order.
    pub txid: [u8; 32],
    /// The index of the output.
    pub vout: u32,
}

impl OutPoint {
    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.txid);
        out.extend_from_slice(&self.vout.to_le_bytes());
    }
}

/// A transaction input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    /// The output being spent.
    pub prevout: OutPoint,
    /// The legacy unlocking script.
    pub script_sig: script::Code,
    /// The sequence number, which also carries BIP68 relative lock times.
    pub sequence: u32,
    /// The witness stack, bottom first. Empty for non-witness spends.
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    /// A final input never blocks the transaction on `lock_time`.
    pub fn is_final(&self) -> bool {
        self.sequence == SEQUENCE_FINAL
    }
}

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    /// The amount, in satoshis.
    pub value: i64,
    /// The locking script.
    pub script_pubkey: script::Code,
}

impl TxOut {
    /// The placeholder legacy `SIGHASH_SINGLE` substitutes for outputs before the signed one.
    pub(crate) fn null() -> Self {
        TxOut {
            value: -1,
            script_pubkey: script::Code::default(),
        }
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_bytes(out, &self.script_pubkey.0);
    }
}

/// A transaction, as far as script verification needs to see it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// The transaction version. Relative lock times need version 2 or later.
    pub version: i32,
    /// The inputs, in order.
    pub inputs: Vec<TxIn>,
    /// The outputs, in order.
    pub outputs: Vec<TxOut>,
    /// The absolute lock time.
    pub lock_time: u32,
}

impl Transaction {
    /// Whether any input carries a witness.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }
}

/// Append the variable-length integer encoding used for lengths and counts.
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n.to_le_bytes()[0]),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&n.to_le_bytes()[..2]);
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&n.to_le_bytes()[..4]);
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Append a length-prefixed byte string.
pub(crate) fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// The size of a witness stack as it is serialized in a transaction.
pub(crate) fn witness_serialized_size(witness: &[Vec<u8>]) -> usize {
    let mut buf = Vec::new();
    write_compact_size(&mut buf, witness.len() as u64);
    witness.iter().for_each(|item| write_bytes(&mut buf, item));
    buf.len()
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::{witness_serialized_size, write_compact_size, TxIn, SEQUENCE_FINAL};
    use crate::{script, testing};

    #[test]
    fn compact_size_boundaries() {
        let encode = |n| {
            let mut buf = Vec::new();
            write_compact_size(&mut buf, n);
            buf
        };
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(0xfc), [0xfc]);
        assert_eq!(encode(0xfd), [0xfd, 0xfd, 0x00]);
        assert_eq!(encode(0xffff), [0xfd, 0xff, 0xff]);
        assert_eq!(encode(0x1_0000), [0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(
            encode(0x1_0000_0000),
            [0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn witness_size_counts_prefixes() {
        assert_eq!(witness_serialized_size(&[]), 1);
        assert_eq!(witness_serialized_size(&[vec![0; 64]]), 66);
        assert_eq!(witness_serialized_size(&[vec![], vec![0; 300]]), 1 + 1 + 3 + 300);
    }

    #[test]
    fn finality() {
        let mut input = TxIn {
            prevout: testing::SPENDING_TX.inputs[0].prevout,
            script_sig: script::Code::default(),
            sequence: SEQUENCE_FINAL,
            witness: vec![],
        };
        assert!(input.is_final());
        input.sequence -= 1;
        assert!(!input.is_final());
        assert!(!testing::SPENDING_TX.has_witness());
    }
}
