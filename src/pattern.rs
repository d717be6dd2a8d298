//! Reusable bits of scripts, to avoid writing hex strings.
//!
//! Bitcoin Script doesn’t have a real type system, but many of these are annotated with some
//! indication of the type. Being scripts with holes, the types are more complicated than those
//! listed with the opcodes. Here’s the decoder ring:
//!
//! * `Bool`, `PubKey`, `Signature`, and other capitalized WordsSmashedTogether – a individual stack
//!   value, with a particular shape
//! * `[]` – a comma-separated sequence of stack values
//! * `+` – a concatenation of stack sequences (useful with type variables that represent sequences)
//! * `*` – repetition `n*Signature` is a sequence of `n` Signature`s
//! * `->` – input on the left, output on the right
//! * `∪` – a union of stack sequences (in negative position, this is “existential”, and “universal”
//!   in positive position)
//! * `💥` – terminates evaluation, if followed by `?`, it _may_ terminate evaluation
//! * `_` – any type, each occurrence can represent a different type

use alloc::vec::Vec;

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::{
    op,
    opcode::PushValue,
    pv,
    Opcode::{self, PushValue as Push},
};

/// `RIPEMD160(SHA256(data))`, the hash used by P2PKH, P2SH and P2WPKH.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// Produce a minimal `PushValue` that encodes the provided number.
pub fn push_num(n: i64) -> PushValue {
    pv::push_num(n)
}

/// Creates a `PushValue` from a 20-byte value (basically, RipeMD160 and other hashes).
pub fn push_160b_hash(hash: &[u8; 20]) -> PushValue {
    pv::push_value(hash).expect("20 is a valid data size")
}

/// Creates a `PushValue` from a 32-byte value (basically, SHA-256 and other hashes).
pub fn push_256b_hash(hash: &[u8; 32]) -> PushValue {
    pv::push_value(hash).expect("32 is a valid data size")
}

// abstractions

/// Holds the two branches of a conditional, without the condition.
///
/// type: `(thn ∪ els) + [Bool] -> (thn ∪ els)`
pub fn branch(thn: &[Opcode], els: &[Opcode]) -> Vec<Opcode> {
    [&[op::IF], thn, &[op::ELSE], els, &[op::ENDIF]].concat()
}

/// Like `branch`, but also holds the conditional.
///
/// Example: `if_else(&size_check(20, false), &[], &[op::RETURN])`
pub fn if_else(cond: &[Opcode], thn: &[Opcode], els: &[Opcode]) -> Vec<Opcode> {
    [cond, &branch(thn, els)].concat()
}

/// Performs a `sig_count`-of-`pks.len()` multisig.
///
/// if `verify`
///   type: `[_] + sig_count*Signature -> 💥?`
///   type: `[_] + sig_count*Signature -> [Bool]`
pub fn check_multisig(sig_count: u8, pks: &[&[u8]], verify: bool) -> Vec<Opcode> {
    [
        &[Push(push_num(sig_count.into()))],
        &pks.iter()
            .map(|pk| Push(pv::push_value(pk).expect("each pubkey is no more than 65 bytes")))
            .collect::<Vec<Opcode>>()[..],
        &[
            Push(push_num(
                i64::try_from(pks.len()).expect("Should not be more than 20 pubkeys"),
            )),
            if verify {
                op::CHECKMULTISIGVERIFY
            } else {
                op::CHECKMULTISIG
            },
        ],
    ]
    .concat()
}

/// A `k`-of-`keys.len()` tapscript multisig, built from `OP_CHECKSIGADD`.
///
/// type: `(keys.len())*Signature -> [Bool]`, signatures in reverse key order, empty for keys that
/// don’t sign
pub fn checksigadd_multisig(k: u32, keys: &[[u8; 32]]) -> Vec<Opcode> {
    keys.iter()
        .enumerate()
        .flat_map(|(i, key)| {
            [
                Push(push_256b_hash(key)),
                if i == 0 {
                    op::CHECKSIG
                } else {
                    op::CHECKSIGADD
                },
            ]
        })
        .chain([Push(push_num(k.into())), op::NUMEQUAL])
        .collect()
}

/// Checks equality against some constant value.
///
/// if `verify`
///   type: `[_] -> 💥?`
///   type: `[_] -> [Bool]`
pub fn equals(expected: PushValue, verify: bool) -> [Opcode; 2] {
    [
        Push(expected),
        if verify { op::EQUALVERIFY } else { op::EQUAL },
    ]
}

/// Checks a signature against the provided pubkey.
///
/// if `verify`
///   type: `[Signature] -> 💥?`
///   type: `[Signature] -> [Bool]`
pub fn check_sig(pubkey: &[u8], verify: bool) -> [Opcode; 2] {
    [
        Push(pv::push_value(pubkey).expect("each pubkey is no more than 65 bytes")),
        if verify {
            op::CHECKSIGVERIFY
        } else {
            op::CHECKSIG
        },
    ]
}

/// Checks that the top of the stack has exactly the expected size.
///
/// if `verify`
///   type: `[a] -> [a] + 💥?`
///   type: `[a] -> [a, Bool]`
pub fn size_check(expected: u32, verify: bool) -> Vec<Opcode> {
    [&[op::SIZE], &equals(push_num(expected.into()), verify)[..]].concat()
}

/// “CLTV”
///
/// type: `[] -> [] + 💥?`
pub fn check_lock_time_verify(lt: u32) -> [Opcode; 3] {
    [
        Push(push_num(lt.into())),
        op::CHECKLOCKTIMEVERIFY,
        op::DROP,
    ]
}

/// “CSV”
///
/// type: `[] -> [] + 💥?`
pub fn check_sequence_verify(sequence: u32) -> [Opcode; 3] {
    [
        Push(push_num(sequence.into())),
        op::CHECKSEQUENCEVERIFY,
        op::DROP,
    ]
}

/// P2PK
///
/// type: `[Signature] -> [Bool]`
pub fn pay_to_pubkey(pubkey: &[u8]) -> [Opcode; 2] {
    check_sig(pubkey, false)
}

/// P2PKH, given the hash of the key.
///
/// type: `[Signature, PubKey] -> [Bool] ∪  💥`
pub fn pay_to_pubkey_hash_of(hash: &[u8; 20]) -> Vec<Opcode> {
    [
        &[op::DUP, op::HASH160],
        &equals(push_160b_hash(hash), true)[..],
        &[op::CHECKSIG],
    ]
    .concat()
}

/// P2PKH
///
/// type: `[Signature, PubKey] -> [Bool] ∪  💥`
pub fn pay_to_pubkey_hash(pk: &[u8]) -> Vec<Opcode> {
    pay_to_pubkey_hash_of(&hash160(pk))
}

/// P2SH
///
/// type: `[_] -> [Bool]`
pub fn pay_to_script_hash(redeem_script: &[u8]) -> [Opcode; 3] {
    [
        op::HASH160,
        Push(push_160b_hash(&hash160(redeem_script))),
        op::EQUAL,
    ]
}

/// A witness program of any version. `program` must be 2 to 40 bytes to be recognised as one.
pub fn witness_program(version: u8, program: &[u8]) -> Option<[Opcode; 2]> {
    let version = match version {
        0 => op::_0,
        1..=16 => Push(push_num(version.into())),
        _ => return None,
    };
    pv::push_value(program).map(|program| [version, Push(program)])
}

/// P2WPKH
pub fn pay_to_witness_pubkey_hash(pk: &[u8]) -> [Opcode; 2] {
    [op::_0, Push(push_160b_hash(&hash160(pk)))]
}

/// P2WSH
pub fn pay_to_witness_script_hash(witness_script: &[u8]) -> [Opcode; 2] {
    [op::_0, Push(push_256b_hash(&Sha256::digest(witness_script).into()))]
}

/// P2TR, given the tweaked output key.
pub fn pay_to_taproot(output_key: &[u8; 32]) -> [Opcode; 2] {
    [op::_1, Push(push_256b_hash(output_key))]
}

/// An unspendable output carrying data.
pub fn null_data(data: &[u8]) -> Option<[Opcode; 2]> {
    pv::push_value(data).map(|data| [op::RETURN, Push(data)])
}

/// Hash160 HTLC: the sender can reclaim after `lt`, the recipient can claim with the preimage.
///
/// type: `[Signature, Bool] ∪ [Signature, Preimage, Bool] -> [Bool] ∪ 💥`
pub fn hash160_htlc(
    lt: u32,
    sender_pk: &[u8],
    recipient_hash: &[u8; 20],
    recipient_pk: &[u8],
) -> Vec<Opcode> {
    branch(
        &[
            &check_lock_time_verify(lt)[..],
            &check_sig(sender_pk, false)[..],
        ]
        .concat(),
        &[
            &[op::HASH160],
            &equals(push_160b_hash(recipient_hash), true)[..],
            &check_sig(recipient_pk, false)[..],
        ]
        .concat(),
    )
}

/// A key that can spend immediately, or a second key after a relative delay.
pub fn relative_timelock(primary_pk: &[u8], delay: u32, backup_pk: &[u8]) -> Vec<Opcode> {
    if_else(
        &[],
        &pay_to_pubkey(primary_pk),
        &[
            &check_sequence_verify(delay)[..],
            &pay_to_pubkey(backup_pk)[..],
        ]
        .concat(),
    )
}
