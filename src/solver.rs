//! Solvers for detecting known script kinds.

use alloc::vec::Vec;

use bounded_vec::BoundedVec;

use crate::{
    external::pubkey::PubKey,
    op,
    opcode::{
        push_value::{LargeValue::PushdataBytelength, SmallValue},
        Evaluable, PushValue,
    },
    script::{self, witness::ANCHOR_PROGRAM, Code},
    Opcode,
};

/// An encoded public key of a valid size.
pub type PubKeyBytes = BoundedVec<u8, { PubKey::COMPRESSED_SIZE }, { PubKey::SIZE }>;

fn pub_key_bytes(bytes: &[u8]) -> Option<PubKeyBytes> {
    PubKey(bytes)
        .is_valid()
        .then(|| bytes.to_vec().try_into().expect("bounds checked"))
}

/// Parses a [`script::PubKey`] or [`script::Redeem`] and detects standard scripts.
///
/// If successful, returns the script kind, and any relevant properties parsed from the
/// script. For example, for a P2SH script, the result will contain the script hash; for
/// P2PKH it will contain the key hash, etc.
///
/// Returns `None` if the script is non-standard.
pub fn standard(script_code: &script::Component<Opcode>) -> Option<ScriptKind> {
    match &script_code.0[..] {
        // Witness programs, which push a version and then 2 to 40 bytes directly.
        [Opcode::PushValue(PushValue::SmallValue(version)), Opcode::PushValue(PushValue::LargeValue(PushdataBytelength(program)))]
            if *version != SmallValue::OP_1NEGATE && (2..=40).contains(&program.len()) =>
        {
            let program = program.as_slice();
            match (version.to_num(), program.len()) {
                (0, 20) => program
                    .try_into()
                    .ok()
                    .map(|hash| ScriptKind::WitnessV0KeyHash { hash }),
                (0, 32) => program
                    .try_into()
                    .ok()
                    .map(|hash| ScriptKind::WitnessV0ScriptHash { hash }),
                // Version 0 programs of any other length can never be spent.
                (0, _) => None,
                (1, 32) => program
                    .try_into()
                    .ok()
                    .map(|output_key| ScriptKind::WitnessV1Taproot { output_key }),
                (1, _) if program == ANCHOR_PROGRAM => Some(ScriptKind::Anchor),
                (version, _) => u8::try_from(version)
                    .ok()
                    .map(|version| ScriptKind::WitnessUnknown {
                        version,
                        program: program.to_vec(),
                    }),
            }
        }

        // Pay-to-Script-Hash (P2SH)
        [op::HASH160, Opcode::PushValue(PushValue::LargeValue(PushdataBytelength(v))), op::EQUAL] => {
            v.as_slice()
                .try_into()
                .ok()
                .map(|hash| ScriptKind::ScriptHash { hash })
        }

        // Pay-to-Public-Key-Hash (P2PKH)
        [op::DUP, op::HASH160, Opcode::PushValue(PushValue::LargeValue(PushdataBytelength(v))), op::EQUALVERIFY, op::CHECKSIG] => {
            v.as_slice()
                .try_into()
                .ok()
                .map(|hash| ScriptKind::PubKeyHash { hash })
        }

        // Provably prunable, data-carrying output.
        //
        // So long as everything after the `OP_RETURN` is a push, we don't care what exactly is
        // in the script.
        [op::RETURN, rest @ ..] => rest
            .iter()
            .map(|op| op.extract_push_value().ok().cloned())
            .collect::<Option<_>>()
            .map(|data| ScriptKind::NullData { data }),

        // Pay-to-Public-Key (P2PK)
        [Opcode::PushValue(PushValue::LargeValue(PushdataBytelength(v))), op::CHECKSIG] => {
            pub_key_bytes(v.as_slice()).map(|data| ScriptKind::PubKey { data })
        }

        // Pay-to-Multi-Signature (P2MS)
        [Opcode::PushValue(PushValue::SmallValue(required)), pubkeys @ .., Opcode::PushValue(PushValue::SmallValue(keys)), op::CHECKMULTISIG] =>
        {
            match (u8::try_from(required.to_num()), u8::try_from(keys.to_num())) {
                (Ok(required @ 1..=16), Ok(keys @ 1..=16)) => {
                    // The remaining opcodes must be pushes of validly sized pubkeys.
                    let pubkeys = pubkeys
                        .iter()
                        .map(|op| match op {
                            Opcode::PushValue(data) => pub_key_bytes(&data.value()),
                            _ => None,
                        })
                        .collect::<Option<Vec<_>>>();

                    pubkeys.and_then(|pubkeys| {
                        (pubkeys.len() == usize::from(keys) && required <= keys)
                            .then_some(ScriptKind::MultiSig { required, pubkeys })
                    })
                }

                // Non-standard
                _ => None,
            }
        }

        // Non-standard
        _ => None,
    }
}

/// Like [`standard`], but starting from the serialized script. Scripts that don’t parse, or
/// that contain opcodes that can never be evaluated, are non-standard.
pub fn classify(script: &Code) -> Option<ScriptKind> {
    script::Component::parse(script)
        .ok()
        .and_then(|component| standard(&component))
}

/// Known kinds of standard scripts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    /// A P2PK script.
    PubKey {
        /// The encoded public key.
        data: PubKeyBytes,
    },

    /// A P2PKH script.
    PubKeyHash {
        /// The Hash160 of the public key.
        hash: [u8; 20],
    },

    /// A P2SH script, used in transaction outputs to efficiently commit to other scripts.
    ScriptHash {
        /// The Hash160 of the script.
        hash: [u8; 20],
    },

    /// A bare threshold multisig script.
    MultiSig {
        /// The number of signatures required to spend.
        required: u8,
        /// The pubkeys that can be used to sign spends.
        pubkeys: Vec<PubKeyBytes>,
    },

    /// An unspendable `OP_RETURN` script that carries data.
    NullData {
        /// The carried data.
        data: Vec<PushValue>,
    },

    /// A P2WPKH script.
    WitnessV0KeyHash {
        /// The Hash160 of the public key.
        hash: [u8; 20],
    },

    /// A P2WSH script.
    WitnessV0ScriptHash {
        /// The SHA256 of the witness script.
        hash: [u8; 32],
    },

    /// A P2TR script.
    WitnessV1Taproot {
        /// The tweaked x-only output key.
        output_key: [u8; 32],
    },

    /// A pay-to-anchor output, which anyone can spend.
    Anchor,

    /// A witness program with a version that isn’t defined yet.
    WitnessUnknown {
        /// The witness version, 1 through 16.
        version: u8,
        /// The witness program.
        program: Vec<u8>,
    },
}

impl ScriptKind {
    /// Returns a string identifier for this script kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::PubKey { .. } => "pubkey",
            ScriptKind::PubKeyHash { .. } => "pubkeyhash",
            ScriptKind::ScriptHash { .. } => "scripthash",
            ScriptKind::MultiSig { .. } => "multisig",
            ScriptKind::NullData { .. } => "nulldata",
            ScriptKind::WitnessV0KeyHash { .. } => "witness_v0_keyhash",
            ScriptKind::WitnessV0ScriptHash { .. } => "witness_v0_scripthash",
            ScriptKind::WitnessV1Taproot { .. } => "witness_v1_taproot",
            ScriptKind::Anchor => "anchor",
            ScriptKind::WitnessUnknown { .. } => "witness_unknown",
        }
    }

    /// Returns the number of signatures required to spend an output of this script kind.
    pub fn req_sigs(&self) -> u8 {
        match self {
            ScriptKind::PubKey { .. } => 1,
            ScriptKind::PubKeyHash { .. } => 1,
            ScriptKind::ScriptHash { .. } => 1,
            ScriptKind::MultiSig { required, .. } => *required,
            ScriptKind::NullData { .. } => 0,
            ScriptKind::WitnessV0KeyHash { .. } => 1,
            ScriptKind::WitnessV0ScriptHash { .. } => 1,
            ScriptKind::WitnessV1Taproot { .. } => 1,
            ScriptKind::Anchor => 0,
            ScriptKind::WitnessUnknown { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::{
        op,
        pattern::{
            check_multisig, hash160, null_data, pay_to_pubkey, pay_to_pubkey_hash,
            pay_to_script_hash, pay_to_taproot, pay_to_witness_pubkey_hash,
            pay_to_witness_script_hash, push_num, witness_program,
        },
        script::{self, Code},
        testing::*,
        Opcode,
    };

    use super::{classify, standard, ScriptKind};

    fn kind(ops: &[Opcode]) -> Option<ScriptKind> {
        standard(&script::Component(ops.to_vec()))
    }

    #[test]
    fn legacy_kinds() {
        let pk = &PUB_KEYS[0];
        let redeem = Code::serialize(&REDEEM_SCRIPT.0);

        let p2pk = kind(&pay_to_pubkey(pk)).expect("standard");
        assert_eq!(p2pk.as_str(), "pubkey");
        assert_eq!(p2pk.req_sigs(), 1);

        assert_eq!(
            kind(&pay_to_pubkey_hash(pk)),
            Some(ScriptKind::PubKeyHash { hash: hash160(pk) })
        );
        assert_eq!(
            kind(&pay_to_script_hash(&redeem)),
            Some(ScriptKind::ScriptHash {
                hash: hash160(&redeem)
            })
        );

        let multisig = kind(&REDEEM_SCRIPT.0).expect("standard");
        assert_eq!(multisig.as_str(), "multisig");
        assert_eq!(multisig.req_sigs(), 2);
        match multisig {
            ScriptKind::MultiSig { pubkeys, .. } => assert_eq!(
                pubkeys.iter().map(|pk| pk.as_slice()).collect::<Vec<_>>(),
                PUB_KEYS.iter().map(|pk| &pk[..]).collect::<Vec<_>>()
            ),
            _ => panic!("expected a multisig"),
        }

        let null = kind(&null_data(b"hello").expect("small enough")).expect("standard");
        assert_eq!(null.as_str(), "nulldata");
        assert_eq!(null.req_sigs(), 0);
        assert_eq!(kind(&[op::RETURN]), Some(ScriptKind::NullData { data: vec![] }));
    }

    #[test]
    fn witness_kinds() {
        let pk = &PUB_KEYS[0];
        assert_eq!(
            kind(&pay_to_witness_pubkey_hash(pk)),
            Some(ScriptKind::WitnessV0KeyHash { hash: hash160(pk) })
        );
        assert_eq!(
            kind(&pay_to_witness_script_hash(&[0x51])).map(|k| k.as_str()),
            Some("witness_v0_scripthash")
        );
        assert_eq!(
            kind(&pay_to_taproot(&INTERNAL_KEY)),
            Some(ScriptKind::WitnessV1Taproot {
                output_key: *INTERNAL_KEY
            })
        );
        assert_eq!(classify(&Code(vec![0x51, 0x02, 0x4e, 0x73])), Some(ScriptKind::Anchor));
        assert_eq!(
            kind(&witness_program(2, &[7; 10]).expect("valid program")),
            Some(ScriptKind::WitnessUnknown {
                version: 2,
                program: vec![7; 10]
            })
        );
        // A version 0 program must be a key hash or a script hash.
        assert_eq!(kind(&witness_program(0, &[7; 10]).expect("valid program")), None);
    }

    #[test]
    fn non_standard() {
        let pk = &PUB_KEYS[0];
        // Threshold above the key count.
        let too_many = check_multisig(2, &[&pk[..]], false);
        assert_eq!(kind(&too_many), None);
        // Not a valid key encoding.
        assert_eq!(kind(&pay_to_pubkey(&[5; 33])), None);
        // Data after `OP_RETURN` has to be pushed.
        assert_eq!(kind(&[op::RETURN, op::DUP]), None);
        assert_eq!(kind(&[Opcode::PushValue(push_num(1)), op::DROP]), None);
        // Unknown opcodes don’t parse.
        assert_eq!(classify(&Code(vec![0x6a, 0xff])), None);
    }
}
