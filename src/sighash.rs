//! Signature hashes: the digest each signature commits to.
//!
//! Three algorithms exist. Legacy scripts re-serialize a modified copy of the transaction, segwit v0
//! scripts use the [BIP143](https://github.com/bitcoin/bips/blob/master/bip-0143.mediawiki) layout
//! and taproot uses the tagged
//! [BIP341](https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki) layout. The latter two
//! share per-transaction hashes, computed once in [`PrecomputedTransactionData`].

use alloc::vec::Vec;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
    interpreter::{ExecutionContext, SigVersion},
    opcode::{push_value::LargeValue, Operation},
    script,
    signature::{HashType, SignedOutputs},
    taproot,
    tx::{self, Transaction, TxOut},
};

/// Errors from the taproot signature hash. Legacy and segwit v0 hashes can’t fail.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("hash type {0:#04x} is not defined for taproot")]
    InvalidHashType(u8),

    #[error("SIGHASH_SINGLE with no output at input index {0}")]
    SingleWithoutOutput(usize),

    #[error("input index {index} is out of range for a transaction with {inputs} inputs")]
    InputIndex { index: usize, inputs: usize },

    #[error("taproot signature hashes need every spent output")]
    MissingSpentOutputs,
}

/// The digest legacy `SIGHASH_SINGLE` signs when there is no output at the input’s index: the
/// number one, as a little-endian 256-bit integer.
pub const SINGLE_WITHOUT_OUTPUT: [u8; 32] = {
    let mut hash = [0; 32];
    hash[0] = 1;
    hash
};

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn sha256d(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// The hashes BIP341 adds, which depend on every output the transaction spends.
#[derive(Clone, Debug, PartialEq, Eq)]
struct SpentOutputHashes {
    amounts: [u8; 32],
    scripts: [u8; 32],
    outputs: Vec<TxOut>,
}

/// Hashes over the whole transaction, shared by every input’s segwit signature checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecomputedTransactionData {
    prevouts: [u8; 32],
    sequences: [u8; 32],
    outputs: [u8; 32],
    spent: Option<SpentOutputHashes>,
}

impl PrecomputedTransactionData {
    /// Hash the transaction. `spent_outputs`, if provided, must line up with the inputs; only then
    /// can taproot signatures be hashed.
    pub fn new(tx: &Transaction, spent_outputs: Option<&[TxOut]>) -> Self {
        let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
        let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
        for input in &tx.inputs {
            input.prevout.write(&mut prevouts);
            sequences.extend_from_slice(&input.sequence.to_le_bytes());
        }
        let mut outputs = Vec::new();
        for output in &tx.outputs {
            output.write(&mut outputs);
        }

        let spent = spent_outputs
            .filter(|spent| spent.len() == tx.inputs.len())
            .map(|spent| {
                let mut amounts = Vec::with_capacity(spent.len() * 8);
                let mut scripts = Vec::new();
                for output in spent {
                    amounts.extend_from_slice(&output.value.to_le_bytes());
                    tx::write_bytes(&mut scripts, &output.script_pubkey.0);
                }
                SpentOutputHashes {
                    amounts: sha256(&amounts),
                    scripts: sha256(&scripts),
                    outputs: spent.to_vec(),
                }
            });

        PrecomputedTransactionData {
            prevouts: sha256(&prevouts),
            sequences: sha256(&sequences),
            outputs: sha256(&outputs),
            spent,
        }
    }

    /// Whether taproot signatures can be hashed with this data.
    pub fn has_spent_outputs(&self) -> bool {
        self.spent.is_some()
    }
}

/// Write `script_code` with every `OP_CODESEPARATOR` removed. Parsing stops at a truncated push,
/// keeping only what was read before it, including the push’s opcode and length bytes.
fn write_script_code_without_separators(out: &mut Vec<u8>, script_code: &[u8]) {
    let separator = Operation::OP_CODESEPARATOR.encode();
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut pc = 0;
    while pc < script_code.len() {
        let (res, rem) = crate::opcode::PossiblyBad::parse(&script_code[pc..]);
        match res {
            Err(crate::opcode::Error::Read { .. }) => {
                pc = truncated_read_end(script_code, pc);
                break;
            }
            _ => {
                let next = script_code.len() - rem.len();
                if script_code[pc] == separator && next == pc + 1 {
                    chunks.push(&script_code[chunk_start..pc]);
                    chunk_start = next;
                }
                pc = next;
            }
        }
    }
    chunks.push(&script_code[chunk_start..pc]);

    let separators = chunks.len() - 1;
    tx::write_compact_size(out, (script_code.len() - separators) as u64);
    chunks.iter().for_each(|chunk| out.extend_from_slice(chunk));
}

/// Where a failed read of the push at `pc` leaves off: past the opcode, and past the length bytes
/// when all of them were available.
fn truncated_read_end(script: &[u8], pc: usize) -> usize {
    let available = script.len() - pc - 1;
    let length_bytes = match script[pc] {
        LargeValue::PUSHDATA1_BYTE => 1,
        LargeValue::PUSHDATA2_BYTE => 2,
        LargeValue::PUSHDATA4_BYTE => 4,
        _ => 0,
    };
    pc + 1 + if length_bytes <= available { length_bytes } else { 0 }
}

/// The legacy signature hash, used by bare and P2SH scripts.
///
/// `script_code` is the executing script from the last `OP_CODESEPARATOR` on, with the signature
/// already removed.
pub fn legacy(
    tx: &Transaction,
    input_index: usize,
    script_code: &script::Code,
    hash_type: HashType,
) -> [u8; 32] {
    let signed_outputs = hash_type.signed_outputs();
    if tx.inputs.len() <= input_index
        || (signed_outputs == SignedOutputs::Single && tx.outputs.len() <= input_index)
    {
        return SINGLE_WITHOUT_OUTPUT;
    }

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&tx.version.to_le_bytes());

    let signed_inputs: Vec<usize> = if hash_type.anyone_can_pay() {
        vec![input_index]
    } else {
        (0..tx.inputs.len()).collect()
    };
    tx::write_compact_size(&mut preimage, signed_inputs.len() as u64);
    for i in signed_inputs {
        let input = &tx.inputs[i];
        input.prevout.write(&mut preimage);
        if i == input_index {
            write_script_code_without_separators(&mut preimage, &script_code.0);
        } else {
            tx::write_compact_size(&mut preimage, 0);
        }
        let sequence = if i != input_index && signed_outputs != SignedOutputs::All {
            0
        } else {
            input.sequence
        };
        preimage.extend_from_slice(&sequence.to_le_bytes());
    }

    match signed_outputs {
        SignedOutputs::None => tx::write_compact_size(&mut preimage, 0),
        SignedOutputs::Single => {
            tx::write_compact_size(&mut preimage, (input_index + 1) as u64);
            for i in 0..=input_index {
                if i == input_index {
                    tx.outputs[i].write(&mut preimage)
                } else {
                    TxOut::null().write(&mut preimage)
                }
            }
        }
        SignedOutputs::All => {
            tx::write_compact_size(&mut preimage, tx.outputs.len() as u64);
            tx.outputs.iter().for_each(|o| o.write(&mut preimage));
        }
    }

    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&u32::from(hash_type.raw()).to_le_bytes());
    sha256d(&preimage)
}

/// The BIP143 signature hash, used by witness v0 scripts.
pub fn segwit_v0(
    tx: &Transaction,
    precomputed: &PrecomputedTransactionData,
    input_index: usize,
    script_code: &script::Code,
    amount: i64,
    hash_type: HashType,
) -> Result<[u8; 32], Error> {
    let input = tx.inputs.get(input_index).ok_or(Error::InputIndex {
        index: input_index,
        inputs: tx.inputs.len(),
    })?;
    let signed_outputs = hash_type.signed_outputs();

    let hash_prevouts = if hash_type.anyone_can_pay() {
        [0; 32]
    } else {
        sha256(&precomputed.prevouts)
    };
    let hash_sequence = if !hash_type.anyone_can_pay() && signed_outputs == SignedOutputs::All {
        sha256(&precomputed.sequences)
    } else {
        [0; 32]
    };
    let hash_outputs = match signed_outputs {
        SignedOutputs::All => sha256(&precomputed.outputs),
        SignedOutputs::Single => tx.outputs.get(input_index).map_or([0; 32], |output| {
            let mut bytes = Vec::new();
            output.write(&mut bytes);
            sha256d(&bytes)
        }),
        SignedOutputs::None => [0; 32],
    };

    let mut preimage = Vec::with_capacity(156 + script_code.0.len());
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequence);
    input.prevout.write(&mut preimage);
    tx::write_bytes(&mut preimage, &script_code.0);
    preimage.extend_from_slice(&amount.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&u32::from(hash_type.raw()).to_le_bytes());
    Ok(sha256d(&preimage))
}

/// The BIP341 signature hash, for key path spends and (with the BIP342 extension) tapscripts.
pub fn taproot(
    tx: &Transaction,
    precomputed: &PrecomputedTransactionData,
    input_index: usize,
    hash_type: HashType,
    context: &ExecutionContext,
) -> Result<[u8; 32], Error> {
    let input = tx.inputs.get(input_index).ok_or(Error::InputIndex {
        index: input_index,
        inputs: tx.inputs.len(),
    })?;
    let spent = precomputed
        .spent
        .as_ref()
        .ok_or(Error::MissingSpentOutputs)?;
    if !hash_type.is_valid_for_taproot() {
        return Err(Error::InvalidHashType(hash_type.raw()));
    }
    let is_tapscript = context.sig_version == SigVersion::Tapscript;
    let signed_outputs = hash_type.signed_outputs();

    let mut engine = taproot::tagged_engine("TapSighash");
    // epoch
    engine.update([0]);
    engine.update([hash_type.raw()]);
    engine.update(tx.version.to_le_bytes());
    engine.update(tx.lock_time.to_le_bytes());
    if !hash_type.anyone_can_pay() {
        engine.update(precomputed.prevouts);
        engine.update(spent.amounts);
        engine.update(spent.scripts);
        engine.update(precomputed.sequences);
    }
    if signed_outputs == SignedOutputs::All {
        engine.update(precomputed.outputs);
    }

    let spend_type = (u8::from(is_tapscript) << 1) | u8::from(context.annex_hash.is_some());
    engine.update([spend_type]);
    if hash_type.anyone_can_pay() {
        let mut bytes = Vec::new();
        input.prevout.write(&mut bytes);
        spent.outputs[input_index].write(&mut bytes);
        bytes.extend_from_slice(&input.sequence.to_le_bytes());
        engine.update(bytes);
    } else {
        engine.update(
            u32::try_from(input_index)
                .map_err(|_| Error::InputIndex {
                    index: input_index,
                    inputs: tx.inputs.len(),
                })?
                .to_le_bytes(),
        );
    }
    if let Some(annex_hash) = context.annex_hash {
        engine.update(annex_hash);
    }
    if signed_outputs == SignedOutputs::Single {
        let output = tx
            .outputs
            .get(input_index)
            .ok_or(Error::SingleWithoutOutput(input_index))?;
        let mut bytes = Vec::new();
        output.write(&mut bytes);
        engine.update(sha256(&bytes));
    }
    if is_tapscript {
        engine.update(context.tapleaf_hash.unwrap_or_default());
        // key version
        engine.update([0]);
        engine.update(context.codesep_pos.to_le_bytes());
    }
    Ok(engine.finalize().into())
}
