//! Bitcoin script verification: legacy, P2SH, segwit v0 and taproot.

#![no_std]
#![doc(html_root_url = "https://docs.rs/bitcoin_script/0.1.0")]
#![allow(clippy::unit_arg)]
#![deny(missing_docs)]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod external;
pub mod branch;
pub mod checker;
pub mod interpreter;
pub mod num;
pub mod op;
pub mod opcode;
pub mod pattern;
pub mod pv;
pub mod script;
pub mod sighash;
pub mod signature;
pub mod solver;
pub mod taproot;
pub mod tx;
pub mod verify;

#[cfg(any(test, feature = "test-dependencies"))]
pub mod test_vectors;

use alloc::{string::String, vec::Vec};

use crate::script::Asm;

/// Script opcodes
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Opcode {
    /// Opcodes that represent constants to be pushed onto the stack.
    PushValue(opcode::PushValue),
    /// - always evaluated
    /// - can be cast to its discriminant
    Control(opcode::Control),
    /// - only evaluated on active branch
    /// - can be cast to its discriminant
    Operation(opcode::Operation),
}

impl opcode::Evaluable for Opcode {
    fn byte_len(&self) -> usize {
        match self {
            Opcode::PushValue(pv) => pv.byte_len(),
            Opcode::Control(_) => 1,
            Opcode::Operation(_) => 1,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        Vec::<u8>::from(self)
    }

    fn restrict(pb: opcode::PossiblyBad) -> Result<Self, script::Error> {
        match pb {
            opcode::PossiblyBad::Good(op) => Ok(op),
            opcode::PossiblyBad::Bad(_) => Err(script::Error::Interpreter(
                Some(pb),
                interpreter::Error::BadOpcode,
            )),
        }
    }

    fn eval(
        &self,
        flags: interpreter::Flags,
        script: &script::Code,
        checker: &dyn interpreter::SignatureChecker,
        mut state: interpreter::State,
    ) -> Result<interpreter::State, interpreter::Error> {
        match self {
            Self::PushValue(pv) => {
                if interpreter::should_exec(&state.vexec) {
                    pv.eval(flags, script, checker, state)
                } else {
                    Ok(state)
                }
            }
            Self::Control(control) => {
                state.increment_op_count(1)?;
                (state.stack, state.vexec) = control.eval(
                    flags,
                    state.context.sig_version,
                    state.stack,
                    state.vexec,
                )?;
                Ok(state)
            }
            Self::Operation(normal) => {
                state.increment_op_count(1)?;
                // Legacy scripts can forbid OP_CODESEPARATOR, even in unexecuted branches.
                if *normal == opcode::Operation::OP_CODESEPARATOR
                    && state.context.sig_version == interpreter::SigVersion::Base
                    && flags.contains(interpreter::Flags::ConstScriptCode)
                {
                    Err(interpreter::Error::OpCodeSeparator)
                } else if interpreter::should_exec(&state.vexec) {
                    normal.eval(flags, script, checker, state)
                } else {
                    Ok(state)
                }
            }
        }
        .and_then(|final_state| {
            // Size limits
            if final_state.stack.len() + final_state.altstack().len() > interpreter::MAX_STACK_DEPTH
            {
                Err(interpreter::Error::StackSize(None))
            } else {
                Ok(final_state)
            }
        })
    }

    fn extract_push_value(&self) -> Result<&opcode::PushValue, script::Error> {
        match self {
            Self::PushValue(pv) => Ok(pv),
            _ => Err(script::Error::SigPushOnly),
        }
    }

    fn sig_op_count(&self, last_opcode: Option<opcode::PossiblyBad>) -> u32 {
        match self {
            Self::Operation(op) => op.sig_op_count(last_opcode),
            _ => 0,
        }
    }
}

impl From<opcode::PushValue> for Opcode {
    fn from(value: opcode::PushValue) -> Self {
        Opcode::PushValue(value)
    }
}

impl From<opcode::Control> for Opcode {
    fn from(value: opcode::Control) -> Self {
        Opcode::Control(value)
    }
}

impl From<opcode::Operation> for Opcode {
    fn from(value: opcode::Operation) -> Self {
        Opcode::Operation(value)
    }
}

impl From<&Opcode> for Vec<u8> {
    fn from(value: &Opcode) -> Self {
        match value {
            Opcode::PushValue(v) => v.into(),
            Opcode::Control(v) => vec![(*v).encode()],
            Opcode::Operation(v) => vec![(*v).encode()],
        }
    }
}

impl Asm for Opcode {
    fn to_asm(&self, attempt_sighash_decode: bool) -> String {
        match self {
            Opcode::PushValue(pv) => pv.to_asm(attempt_sighash_decode),
            Opcode::Operation(op) => op.to_asm(attempt_sighash_decode),
            Opcode::Control(c) => c.to_asm(attempt_sighash_decode),
        }
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_asm(false))
    }
}

/// A Bitcoin script consists of a sig, a pubkey and a witness. The first type parameter is the
/// type of opcodes in the script sig, and the second is the type of opcodes in the script pubkey.
///
/// - Script<opcode::PossiblyBad, opcode::PossiblyBad> – from the chain
/// - Script<opcode::PushValue, Opcode> – authoring sig_push_only
/// - Script<Opcode, Opcode> – authoring non-sig_push_only
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Script<Sig = opcode::PushValue, PubKey = Opcode> {
    /// The script sig.
    pub sig: script::Component<Sig>,
    /// The script pubkey.
    pub pub_key: script::Component<PubKey>,
    /// The witness stack, bottom first.
    pub witness: Vec<Vec<u8>>,
}

impl<
        Sig: Into<opcode::PossiblyBad> + opcode::Evaluable + Clone,
        PubKey: Into<opcode::PossiblyBad> + opcode::Evaluable + Clone,
    > Script<Sig, PubKey>
{
    /// Evaluate an entire script.
    pub fn eval(
        &self,
        flags: interpreter::Flags,
        checker: &dyn interpreter::SignatureChecker,
    ) -> Result<bool, (script::ComponentType, script::Error)> {
        script::iter::eval_script(&self.sig, &self.pub_key, &self.witness, flags, checker)
    }
}

impl<T: Asm, U: Asm> Asm for Script<T, U> {
    fn to_asm(&self, include_sighash_suffix: bool) -> String {
        self.sig.to_asm(include_sighash_suffix) + " " + &self.pub_key.to_asm(false)
    }
}

/// Utilities useful for tests in other modules and crates.
#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use alloc::vec::Vec;

    use secp256k1::{Keypair, Message, PublicKey, Secp256k1, SecretKey};

    use crate::{
        pattern::check_multisig,
        script,
        signature::HashType,
        tx::{OutPoint, Transaction, TxIn, TxOut},
    };

    /// A `usize` one larger than the longest allowed script, for testing bounds.
    pub const OVERFLOW_SCRIPT_SIZE: usize = script::Code::MAX_SIZE + 1;

    /// The amount of the output spent by [`SPENDING_TX`].
    pub const SPENT_AMOUNT: i64 = 100_000;

    lazy_static::lazy_static! {
        /// Keys used to sign test spends.
        pub static ref SECRET_KEYS: Vec<SecretKey> = [0x01, 0x02, 0x03]
            .iter()
            .map(|b| SecretKey::from_slice(&[*b; 32]).expect("valid secret key"))
            .collect();
        /// The compressed public keys of [`SECRET_KEYS`].
        pub static ref PUB_KEYS: Vec<Vec<u8>> = SECRET_KEYS
            .iter()
            .map(|sk| PublicKey::from_secret_key(&Secp256k1::new(), sk).serialize().to_vec())
            .collect();
        /// The first key, for BIP340 signing.
        pub static ref KEYPAIR: Keypair = Keypair::from_secret_key(&Secp256k1::new(), &SECRET_KEYS[0]);
        /// The x-only key of [`KEYPAIR`], used as a taproot internal key.
        pub static ref INTERNAL_KEY: [u8; 32] = KEYPAIR.x_only_public_key().0.serialize();
        /// A 2-of-3 multisig over [`PUB_KEYS`].
        pub static ref REDEEM_SCRIPT: script::Redeem = script::Component(check_multisig(
            2,
            &PUB_KEYS.iter().map(|pk| &pk[..]).collect::<Vec<_>>(),
            false,
        ));
        /// A version 2 transaction with a single input and output. The input’s script sig and
        /// witness are filled in by each test.
        pub static ref SPENDING_TX: Transaction = Transaction {
            version: 2,
            inputs: vec![TxIn {
                prevout: OutPoint { txid: [0x11; 32], vout: 0 },
                script_sig: script::Code::default(),
                sequence: 0xffff_fffe,
                witness: vec![],
            }],
            outputs: vec![TxOut {
                value: SPENT_AMOUNT - 1_000,
                script_pubkey: script::Code(vec![0x51]),
            }],
            lock_time: 0,
        };
    }

    /// [`SPENDING_TX`] with its input’s script sig and witness replaced.
    pub fn spending_tx(script_sig: script::Code, witness: Vec<Vec<u8>>) -> Transaction {
        let mut tx = SPENDING_TX.clone();
        tx.inputs[0].script_sig = script_sig;
        tx.inputs[0].witness = witness;
        tx
    }

    /// A DER signature with the hash type appended, as it appears on the stack.
    pub fn sign_ecdsa(sk: &SecretKey, sighash: &[u8; 32], hash_type: HashType) -> Vec<u8> {
        let mut sig = Secp256k1::new()
            .sign_ecdsa(&Message::from_digest(*sighash), sk)
            .serialize_der()
            .to_vec();
        sig.push(hash_type.raw());
        sig
    }

    /// A BIP340 signature, with the hash type appended unless it is `SIGHASH_DEFAULT`.
    pub fn sign_schnorr(keypair: &Keypair, sighash: &[u8; 32], hash_type: HashType) -> Vec<u8> {
        let mut sig = Secp256k1::new()
            .sign_schnorr_no_aux_rand(&Message::from_digest(*sighash), keypair)
            .serialize()
            .to_vec();
        if hash_type != HashType::DEFAULT {
            sig.push(hash_type.raw());
        }
        sig
    }
}
