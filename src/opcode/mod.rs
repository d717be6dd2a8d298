//! The individual opcodes that form a script.

#![allow(non_camel_case_types)]

use alloc::{
    string::{String, ToString},
    vec::Vec,
};

pub mod push_value;

use core::cmp::{max, min};

use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::Opcode;
use crate::{
    external::pubkey::PubKey,
    interpreter::{self, ExecutionContext, SigVersion},
    num,
    script::{self, Asm},
    signature, tx,
};
use push_value::{
    LargeValue,
    SmallValue::{self, *},
};

/// Errors that occur while parsing an opcode.
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("expected {expected_bytes} bytes, but only {available_bytes} bytes available")]
    Read {
        expected_bytes: usize,
        available_bytes: usize,
    },

    #[error("disabled opcode encountered: {0:?}")]
    Disabled(Disabled),

    // Max sizes
    #[error(
        "push size{} exceeded maxmimum ({} bytes)",
        .0.map_or("", |size| " ({size} bytes)"),
        push_value::LargeValue::MAX_SIZE
    )]
    PushSize(Option<usize>),
}

/// Definitions needed for evaluation of script types.
pub trait Evaluable {
    /// The length in bytes of this script value. This can be more efficient than
    /// `self.to_bytes().len()`.
    fn byte_len(&self) -> usize;

    /// Convert a script value into the bytes that would be included in a transaction.
    fn to_bytes(&self) -> Vec<u8>;

    /// Constrain an arbitrary `PossiblyBad` to the type the `impl` is defined on. This is used when
    /// parsing an arbitrary opcode – we first parse to the most general type `opcode::PossiblyBad`,
    /// and then ensure that it’s of the required type.
    fn restrict(pb: PossiblyBad) -> Result<Self, script::Error>
    where
        Self: Sized;

    /// Evaluate the provided script value. `script` is the whole script being executed, which
    /// signature checks take their script code from.
    fn eval(
        &self,
        flags: interpreter::Flags,
        script: &script::Code,
        checker: &dyn interpreter::SignatureChecker,
        state: interpreter::State,
    ) -> Result<interpreter::State, interpreter::Error>;

    /// If the opcode is a `PushValue`, return that. Otherwise error. This is used to identify
    /// push-only script sigs.
    fn extract_push_value(&self) -> Result<&PushValue, script::Error>;

    /// Upper bound on the signature operations performed by this opcode. In the case of
    /// `OP_CHECKMULTISIG*`, it looks at the previous opcode (if provided) to possibly return a more
    /// accurate bound.
    fn sig_op_count(&self, last_opcode: Option<PossiblyBad>) -> u32;
}

/// Opcodes that represent constants to be pushed onto the stack.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PushValue {
    /// Constants that are represented by a single byte.
    SmallValue(SmallValue),
    /// Constants that contain data in addition to the opcode byte.
    LargeValue(LargeValue),
}

impl PushValue {
    /// Produce a minimal `PushValue` for the given data.
    pub(crate) fn from_slice(v: &[u8]) -> Option<PushValue> {
        match v {
            [] => Some(PushValue::SmallValue(OP_0)),
            [0x81] => Some(PushValue::SmallValue(OP_1NEGATE)),
            [n @ 1..=16] => SmallValue::decode(OP_1.encode() - 1 + n).map(PushValue::SmallValue),
            _ => LargeValue::from_slice(v).map(PushValue::LargeValue),
        }
    }

    /// Returns the numeric value represented by the opcode, if one exists.
    pub fn to_num(&self) -> Result<i64, num::Error> {
        match self {
            PushValue::LargeValue(lv) => lv.to_num(),
            PushValue::SmallValue(sv) => Ok(sv.to_num().into()),
        }
    }

    /// Get the [`interpreter::Stack`] element represented by this [`PushValue`].
    pub fn value(&self) -> Vec<u8> {
        match self {
            PushValue::LargeValue(pv) => pv.value().to_vec(),
            PushValue::SmallValue(pv) => pv.value(),
        }
    }

    /// Returns false if there is a smaller possible encoding of the provided value.
    pub(crate) fn is_minimal_push(&self) -> bool {
        match self {
            PushValue::LargeValue(lv) => lv.is_minimal_push(),
            PushValue::SmallValue(_) => true,
        }
    }

    fn eval_internal(
        &self,
        require_minimal: bool,
        mut stack: interpreter::Stack<Vec<u8>>,
    ) -> Result<interpreter::Stack<Vec<u8>>, interpreter::Error> {
        if require_minimal && !self.is_minimal_push() {
            Err(interpreter::Error::MinimalData)
        } else {
            stack.push(self.value());
            Ok(stack)
        }
    }
}

impl Evaluable for PushValue {
    fn byte_len(&self) -> usize {
        match self {
            PushValue::LargeValue(pv) => pv.byte_len(),
            PushValue::SmallValue(_) => 1,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        Vec::<u8>::from(self)
    }

    fn restrict(pb: PossiblyBad) -> Result<Self, script::Error> {
        Opcode::restrict(pb).and_then(|op| match op {
            Opcode::PushValue(pv) => Ok(pv),
            _ => Err(script::Error::SigPushOnly),
        })
    }

    fn eval(
        &self,
        flags: interpreter::Flags,
        _script: &script::Code,
        _checker: &dyn interpreter::SignatureChecker,
        mut state: interpreter::State,
    ) -> Result<interpreter::State, interpreter::Error> {
        state.stack =
            self.eval_internal(flags.contains(interpreter::Flags::MinimalData), state.stack)?;
        Ok(state)
    }

    fn extract_push_value(&self) -> Result<&PushValue, script::Error> {
        Ok(self)
    }

    fn sig_op_count(&self, _last_opcode: Option<PossiblyBad>) -> u32 {
        0
    }
}

impl From<SmallValue> for PushValue {
    fn from(value: SmallValue) -> Self {
        Self::SmallValue(value)
    }
}

impl From<LargeValue> for PushValue {
    fn from(value: LargeValue) -> Self {
        Self::LargeValue(value)
    }
}

impl Asm for PushValue {
    fn to_asm(&self, attempt_sighash_decode: bool) -> String {
        match self {
            PushValue::SmallValue(sv) => sv.to_asm(attempt_sighash_decode),
            PushValue::LargeValue(lv) => lv.to_asm(attempt_sighash_decode),
        }
    }
}

/// Control operations are evaluated regardless of whether the current branch is active.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[allow(missing_docs)]
#[repr(u8)]
pub enum Control {
    OP_IF = 0x63,
    OP_NOTIF = 0x64,
    OP_ELSE = 0x67,
    OP_ENDIF = 0x68,
}

impl Control {
    /// Decodes this opcode from its byte encoding.
    fn decode(b: u8) -> Option<Self> {
        match b {
            0x63 => Some(Self::OP_IF),
            0x64 => Some(Self::OP_NOTIF),
            0x67 => Some(Self::OP_ELSE),
            0x68 => Some(Self::OP_ENDIF),
            _ => None,
        }
    }

    /// Returns the byte encoding of this opcode.
    pub(crate) fn encode(self) -> u8 {
        // This is how you get the discriminant, but using `as` everywhere is too much code smell
        self as u8
    }

    /// Witness v0 scripts (with `MinimalIf`) and tapscripts only accept an empty vector or `0x01`
    /// as the argument to `OP_IF` and `OP_NOTIF`.
    fn check_minimal_if(
        vch: &[u8],
        flags: interpreter::Flags,
        sig_version: SigVersion,
    ) -> Result<(), interpreter::Error> {
        let is_minimal = matches!(vch, [] | [1]);
        match sig_version {
            SigVersion::Tapscript if !is_minimal => Err(interpreter::Error::TapscriptMinimalIf),
            SigVersion::WitnessV0
                if !is_minimal && flags.contains(interpreter::Flags::MinimalIf) =>
            {
                Err(interpreter::Error::MinimalIf)
            }
            _ => Ok(()),
        }
    }

    /// <expression> if [statements] [else [statements]] endif
    pub(crate) fn eval(
        &self,
        flags: interpreter::Flags,
        sig_version: SigVersion,
        mut stack: interpreter::Stack<Vec<u8>>,
        mut vexec: interpreter::Stack<bool>,
    ) -> Result<(interpreter::Stack<Vec<u8>>, interpreter::Stack<bool>), interpreter::Error> {
        match self {
            Self::OP_IF | Self::OP_NOTIF => {
                let value = if interpreter::should_exec(&vexec) {
                    let vch = stack
                        .pop()
                        .map_err(|_| interpreter::Error::UnbalancedConditional)?;
                    Self::check_minimal_if(&vch, flags, sig_version)?;
                    let value = interpreter::cast_to_bool(&vch);
                    if self == &Self::OP_NOTIF {
                        !value
                    } else {
                        value
                    }
                } else {
                    false
                };
                vexec.push(value)
            }

            Self::OP_ELSE => vexec
                .last_mut()
                .map_err(|_| interpreter::Error::UnbalancedConditional)
                .map(|last| *last = !*last)?,

            Self::OP_ENDIF => {
                vexec
                    .pop()
                    .map_err(|_| interpreter::Error::UnbalancedConditional)?;
            }
        }
        Ok((stack, vexec))
    }
}

impl Asm for Control {
    fn to_asm(&self, _attempt_sighash_decode: bool) -> String {
        match self {
            Self::OP_IF => "OP_IF",
            Self::OP_NOTIF => "OP_NOTIF",
            Self::OP_ELSE => "OP_ELSE",
            Self::OP_ENDIF => "OP_ENDIF",
        }
        .to_string()
    }
}

/// Normal operations are only executed when they are on an active branch.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[allow(missing_docs)]
#[repr(u8)]
pub enum Operation {
    // control
    OP_NOP = 0x61,
    OP_VERIFY = 0x69,
    OP_RETURN = 0x6a,

    // stack ops
    OP_TOALTSTACK = 0x6b,
    OP_FROMALTSTACK = 0x6c,
    OP_2DROP = 0x6d,
    OP_2DUP = 0x6e,
    OP_3DUP = 0x6f,
    OP_2OVER = 0x70,
    OP_2ROT = 0x71,
    OP_2SWAP = 0x72,
    OP_IFDUP = 0x73,
    OP_DEPTH = 0x74,
    OP_DROP = 0x75,
    OP_DUP = 0x76,
    OP_NIP = 0x77,
    OP_OVER = 0x78,
    OP_PICK = 0x79,
    OP_ROLL = 0x7a,
    OP_ROT = 0x7b,
    OP_SWAP = 0x7c,
    OP_TUCK = 0x7d,

    // splice ops
    OP_SIZE = 0x82,

    // bit logic
    OP_EQUAL = 0x87,
    OP_EQUALVERIFY = 0x88,

    // numeric
    OP_1ADD = 0x8b,
    OP_1SUB = 0x8c,
    OP_NEGATE = 0x8f,
    OP_ABS = 0x90,
    OP_NOT = 0x91,
    OP_0NOTEQUAL = 0x92,

    OP_ADD = 0x93,
    OP_SUB = 0x94,

    OP_BOOLAND = 0x9a,
    OP_BOOLOR = 0x9b,
    OP_NUMEQUAL = 0x9c,
    OP_NUMEQUALVERIFY = 0x9d,
    OP_NUMNOTEQUAL = 0x9e,
    OP_LESSTHAN = 0x9f,
    OP_GREATERTHAN = 0xa0,
    OP_LESSTHANOREQUAL = 0xa1,
    OP_GREATERTHANOREQUAL = 0xa2,
    OP_MIN = 0xa3,
    OP_MAX = 0xa4,

    OP_WITHIN = 0xa5,

    // crypto
    OP_RIPEMD160 = 0xa6,
    OP_SHA1 = 0xa7,
    OP_SHA256 = 0xa8,
    OP_HASH160 = 0xa9,
    OP_HASH256 = 0xaa,
    OP_CODESEPARATOR = 0xab,
    OP_CHECKSIG = 0xac,
    OP_CHECKSIGVERIFY = 0xad,
    OP_CHECKMULTISIG = 0xae,
    OP_CHECKMULTISIGVERIFY = 0xaf,

    // expansion
    OP_NOP1 = 0xb0,
    OP_CHECKLOCKTIMEVERIFY = 0xb1,
    OP_CHECKSEQUENCEVERIFY = 0xb2,
    OP_NOP4 = 0xb3,
    OP_NOP5 = 0xb4,
    OP_NOP6 = 0xb5,
    OP_NOP7 = 0xb6,
    OP_NOP8 = 0xb7,
    OP_NOP9 = 0xb8,
    OP_NOP10 = 0xb9,

    // Opcode added by BIP 342 (Tapscript)
    OP_CHECKSIGADD = 0xba,
}

impl Operation {
    /// Decodes this opcode from its byte encoding.
    fn decode(b: u8) -> Option<Self> {
        match b {
            0x61 => Some(Self::OP_NOP),
            0x69 => Some(Self::OP_VERIFY),
            0x6a => Some(Self::OP_RETURN),
            0x6b => Some(Self::OP_TOALTSTACK),
            0x6c => Some(Self::OP_FROMALTSTACK),
            0x6d => Some(Self::OP_2DROP),
            0x6e => Some(Self::OP_2DUP),
            0x6f => Some(Self::OP_3DUP),
            0x70 => Some(Self::OP_2OVER),
            0x71 => Some(Self::OP_2ROT),
            0x72 => Some(Self::OP_2SWAP),
            0x73 => Some(Self::OP_IFDUP),
            0x74 => Some(Self::OP_DEPTH),
            0x75 => Some(Self::OP_DROP),
            0x76 => Some(Self::OP_DUP),
            0x77 => Some(Self::OP_NIP),
            0x78 => Some(Self::OP_OVER),
            0x79 => Some(Self::OP_PICK),
            0x7a => Some(Self::OP_ROLL),
            0x7b => Some(Self::OP_ROT),
            0x7c => Some(Self::OP_SWAP),
            0x7d => Some(Self::OP_TUCK),
            0x82 => Some(Self::OP_SIZE),
            0x87 => Some(Self::OP_EQUAL),
            0x88 => Some(Self::OP_EQUALVERIFY),
            0x8b => Some(Self::OP_1ADD),
            0x8c => Some(Self::OP_1SUB),
            0x8f => Some(Self::OP_NEGATE),
            0x90 => Some(Self::OP_ABS),
            0x91 => Some(Self::OP_NOT),
            0x92 => Some(Self::OP_0NOTEQUAL),
            0x93 => Some(Self::OP_ADD),
            0x94 => Some(Self::OP_SUB),
            0x9a => Some(Self::OP_BOOLAND),
            0x9b => Some(Self::OP_BOOLOR),
            0x9c => Some(Self::OP_NUMEQUAL),
            0x9d => Some(Self::OP_NUMEQUALVERIFY),
            0x9e => Some(Self::OP_NUMNOTEQUAL),
            0x9f => Some(Self::OP_LESSTHAN),
            0xa0 => Some(Self::OP_GREATERTHAN),
            0xa1 => Some(Self::OP_LESSTHANOREQUAL),
            0xa2 => Some(Self::OP_GREATERTHANOREQUAL),
            0xa3 => Some(Self::OP_MIN),
            0xa4 => Some(Self::OP_MAX),
            0xa5 => Some(Self::OP_WITHIN),
            0xa6 => Some(Self::OP_RIPEMD160),
            0xa7 => Some(Self::OP_SHA1),
            0xa8 => Some(Self::OP_SHA256),
            0xa9 => Some(Self::OP_HASH160),
            0xaa => Some(Self::OP_HASH256),
            0xab => Some(Self::OP_CODESEPARATOR),
            0xac => Some(Self::OP_CHECKSIG),
            0xad => Some(Self::OP_CHECKSIGVERIFY),
            0xae => Some(Self::OP_CHECKMULTISIG),
            0xaf => Some(Self::OP_CHECKMULTISIGVERIFY),
            0xb0 => Some(Self::OP_NOP1),
            0xb1 => Some(Self::OP_CHECKLOCKTIMEVERIFY),
            0xb2 => Some(Self::OP_CHECKSEQUENCEVERIFY),
            0xb3 => Some(Self::OP_NOP4),
            0xb4 => Some(Self::OP_NOP5),
            0xb5 => Some(Self::OP_NOP6),
            0xb6 => Some(Self::OP_NOP7),
            0xb7 => Some(Self::OP_NOP8),
            0xb8 => Some(Self::OP_NOP9),
            0xb9 => Some(Self::OP_NOP10),
            0xba => Some(Self::OP_CHECKSIGADD),
            _ => None,
        }
    }

    /// Returns the byte encoding of this opcode.
    pub(crate) fn encode(self) -> u8 {
        // This is how you get the discriminant, but using `as` everywhere is too much code smell
        self as u8
    }

    /// The number of signature operations represented by this opcode. If the `last_opcode` is
    /// provided, we can sometimes give a more accurate value.
    pub(crate) fn sig_op_count(&self, last_opcode: Option<PossiblyBad>) -> u32 {
        match self {
            Self::OP_CHECKSIG | Self::OP_CHECKSIGVERIFY => 1,
            Self::OP_CHECKMULTISIG | Self::OP_CHECKMULTISIGVERIFY => {
                match last_opcode {
                    // Even with an accurate count, 0 keys is counted as 20 for some reason.
                    Some(PossiblyBad::Good(Opcode::PushValue(PushValue::SmallValue(sv))))
                        if push_value::SmallValue::OP_1 <= sv =>
                    {
                        u32::from(sv.to_num().unsigned_abs())
                    }
                    // Apparently it’s too much work to figure out if it’s one of the few
                    // `LargeValue`s that’s valid, so we assume the worst.
                    Some(_) => u32::from(interpreter::MAX_PUBKEY_COUNT),
                    // We don’t know what the previous opcode could be – assume the worst.
                    None => u32::from(interpreter::MAX_PUBKEY_COUNT),
                }
            }
            _ => 0,
        }
    }

    fn binbasic_num<R>(
        stack: &mut interpreter::Stack<Vec<u8>>,
        require_minimal: bool,
        op: impl FnOnce(i64, i64) -> Result<R, interpreter::Error>,
    ) -> Result<R, interpreter::Error> {
        stack.binfn(|x1, x2| {
            let bn2 = num::parse(&x2, require_minimal, None).map_err(interpreter::Error::Num)?;
            let bn1 = num::parse(&x1, require_minimal, None).map_err(interpreter::Error::Num)?;
            op(bn1, bn2)
        })
    }

    fn check_pub_key_encoding(
        vch_pub_key: &[u8],
        flags: interpreter::Flags,
        sig_version: SigVersion,
    ) -> Result<(), interpreter::Error> {
        let pub_key = PubKey(vch_pub_key);
        if flags.contains(interpreter::Flags::StrictEnc) && !pub_key.is_compressed_or_uncompressed()
        {
            Err(interpreter::Error::PubKeyType)
        } else if flags.contains(interpreter::Flags::WitnessPubKeyType)
            && sig_version == SigVersion::WitnessV0
            && !pub_key.is_compressed()
        {
            Err(interpreter::Error::WitnessPubKeyType)
        } else {
            Ok(())
        }
    }

    fn encoding_rules(flags: interpreter::Flags) -> signature::EncodingRules {
        signature::EncodingRules {
            require_der: flags.contains(interpreter::Flags::DERSig),
            require_low_s: flags.contains(interpreter::Flags::LowS),
            is_strict: flags.contains(interpreter::Flags::StrictEnc),
        }
    }

    fn is_ecdsa_sig_valid(
        vch_sig: &[u8],
        vch_pub_key: &[u8],
        flags: interpreter::Flags,
        script_code: &script::Code,
        sig_version: SigVersion,
        checker: &dyn interpreter::SignatureChecker,
    ) -> Result<bool, interpreter::Error> {
        // Note how this makes the exact order of pubkey/signature evaluation distinguishable by
        // CHECKMULTISIG NOT if the STRICTENC flag is set.
        match signature::Decoded::from_bytes(vch_sig, Self::encoding_rules(flags)) {
            signature::Validity::InvalidAbort(e) => Err(interpreter::Error::from(e)),
            signature::Validity::InvalidContinue => {
                // We still need to check the pubkey here, because it can cause an abort.
                Self::check_pub_key_encoding(vch_pub_key, flags, sig_version)?;
                Ok(false)
            }
            signature::Validity::Valid(sig) => {
                Self::check_pub_key_encoding(vch_pub_key, flags, sig_version)?;
                Ok(checker.check_ecdsa_sig(vch_sig, &sig, vch_pub_key, script_code, sig_version))
            }
        }
    }

    /// The part of the script after the last executed `OP_CODESEPARATOR`.
    fn script_code(script: &script::Code, context: &ExecutionContext) -> script::Code {
        script::Code(
            script
                .0
                .get(context.code_hash_start..)
                .unwrap_or_default()
                .to_vec(),
        )
    }

    fn eval_checksig_pre_tapscript(
        vch_sig: &[u8],
        vch_pub_key: &[u8],
        flags: interpreter::Flags,
        script_code: script::Code,
        checker: &dyn interpreter::SignatureChecker,
        sig_version: SigVersion,
    ) -> Result<bool, interpreter::Error> {
        let success = Self::is_ecdsa_sig_valid(
            vch_sig,
            vch_pub_key,
            flags,
            &script_code,
            sig_version,
            checker,
        )?;
        if !success && flags.contains(interpreter::Flags::NullFail) && !vch_sig.is_empty() {
            Err(interpreter::Error::NullFail)
        } else {
            Ok(success)
        }
    }

    fn eval_checksig_tapscript(
        vch_sig: &[u8],
        vch_pub_key: &[u8],
        flags: interpreter::Flags,
        checker: &dyn interpreter::SignatureChecker,
        context: &mut ExecutionContext,
    ) -> Result<bool, interpreter::Error> {
        let success = !vch_sig.is_empty();
        if success {
            if let Some(weight_left) = context.validation_weight_left.as_mut() {
                *weight_left -= interpreter::VALIDATION_WEIGHT_PER_SIGOP_PASSED;
                if *weight_left < 0 {
                    return Err(interpreter::Error::TapscriptValidationWeight);
                }
            }
        }
        if vch_pub_key.is_empty() {
            return Err(interpreter::Error::PubKeyType);
        }
        match <&[u8; 32]>::try_from(vch_pub_key) {
            Ok(pub_key) => {
                if success {
                    signature::Schnorr::from_bytes(vch_sig)
                        .and_then(|sig| checker.check_schnorr_sig(&sig, pub_key, context))?;
                }
                Ok(success)
            }
            // Unknown public key types are reserved for future soft forks.
            Err(_) if flags.contains(interpreter::Flags::DiscourageUpgradablePubKeyType) => {
                Err(interpreter::Error::DiscourageUpgradablePubKeyType)
            }
            Err(_) => Ok(success),
        }
    }

    /// Check a single signature, under whichever rules the current script is executed with.
    fn eval_checksig(
        vch_sig: &[u8],
        vch_pub_key: &[u8],
        flags: interpreter::Flags,
        script: &script::Code,
        checker: &dyn interpreter::SignatureChecker,
        context: &mut ExecutionContext,
    ) -> Result<bool, interpreter::Error> {
        match context.sig_version {
            SigVersion::Base => {
                // Drop the signature in pre-segwit scripts but not segwit scripts.
                let (script_code, found) = Self::script_code(script, context)
                    .find_and_delete(&script::push_encoding(vch_sig));
                if found > 0 && flags.contains(interpreter::Flags::ConstScriptCode) {
                    return Err(interpreter::Error::SigFindAndDelete);
                }
                Self::eval_checksig_pre_tapscript(
                    vch_sig,
                    vch_pub_key,
                    flags,
                    script_code,
                    checker,
                    SigVersion::Base,
                )
            }
            SigVersion::WitnessV0 => Self::eval_checksig_pre_tapscript(
                vch_sig,
                vch_pub_key,
                flags,
                Self::script_code(script, context),
                checker,
                SigVersion::WitnessV0,
            ),
            SigVersion::Tapscript => {
                Self::eval_checksig_tapscript(vch_sig, vch_pub_key, flags, checker, context)
            }
            // Key path spends never execute a script.
            SigVersion::Taproot => Err(interpreter::Error::BadOpcode),
        }
    }

    fn cast_from_bool(b: bool) -> Vec<u8> {
        static VCH_FALSE: [u8; 0] = [];
        static VCH_TRUE: [u8; 1] = [1];
        if b {
            VCH_TRUE.to_vec()
        } else {
            VCH_FALSE.to_vec()
        }
    }

    fn verify(success: bool) -> Result<(), interpreter::Error> {
        if success {
            Ok(())
        } else {
            Err(interpreter::Error::Verify)
        }
    }

    /// Evaluate a single operation.
    pub(crate) fn eval(
        &self,
        flags: interpreter::Flags,
        script: &script::Code,
        checker: &dyn interpreter::SignatureChecker,
        mut state: interpreter::State,
    ) -> Result<interpreter::State, interpreter::Error> {
        let require_minimal = flags.contains(interpreter::Flags::MinimalData);

        let parse_num = |v: &[u8], size: Option<usize>| -> Result<i64, interpreter::Error> {
            num::parse(v, require_minimal, size).map_err(interpreter::Error::Num)
        };

        let pop_num = |stack: &mut interpreter::Stack<Vec<u8>>,
                       size: Option<usize>|
         -> Result<i64, interpreter::Error> {
            stack.pop().and_then(|v| parse_num(&v, size))
        };

        let unfn_num = |stackin: &mut interpreter::Stack<Vec<u8>>,
                        op: &dyn Fn(i64) -> Vec<u8>|
         -> Result<(), interpreter::Error> {
            stackin.unop(|vch| parse_num(&vch, None).map(op))
        };

        let unop_num = |stack: &mut interpreter::Stack<Vec<u8>>,
                        op: &dyn Fn(i64) -> i64|
         -> Result<(), interpreter::Error> {
            unfn_num(stack, &|bn| num::serialize(op(bn)))
        };

        let binfn_num = |stack: &mut interpreter::Stack<Vec<u8>>,
                         op: &dyn Fn(i64, i64) -> Vec<u8>|
         -> Result<(), interpreter::Error> {
            Self::binbasic_num(stack, require_minimal, |bn1, bn2| Ok(op(bn1, bn2)))
                .map(|res| stack.push(res))
        };

        let binop_num = |stack: &mut interpreter::Stack<Vec<u8>>,
                         op: &dyn Fn(i64, i64) -> i64|
         -> Result<(), interpreter::Error> {
            binfn_num(stack, &|bn1, bn2| num::serialize(op(bn1, bn2)))
        };

        let binrel = |stack: &mut interpreter::Stack<Vec<u8>>,
                      op: &dyn Fn(i64, i64) -> bool|
         -> Result<(), interpreter::Error> {
            binfn_num(stack, &|bn1, bn2| Self::cast_from_bool(op(bn1, bn2)))
        };

        let unrel = |stack: &mut interpreter::Stack<Vec<u8>>,
                     op: &dyn Fn(i64) -> bool|
         -> Result<(), interpreter::Error> {
            unfn_num(stack, &|bn| Self::cast_from_bool(op(bn)))
        };

        let discourage_nop = || {
            // Do nothing, though if the caller wants to prevent people from using these NOPs (as
            // part of a standard tx rule, for example) they can enable `DiscourageUpgradableNOPs`
            // to turn these opcodes into errors.
            if flags.contains(interpreter::Flags::DiscourageUpgradableNOPs) {
                Err(interpreter::Error::DiscourageUpgradableNOPs)
            } else {
                Ok(())
            }
        };

        match self {
            //
            // Control
            //
            Self::OP_NOP => Ok(()),

            // (lt -- lt)
            Self::OP_CHECKLOCKTIMEVERIFY => {
                if flags.contains(interpreter::Flags::CHECKLOCKTIMEVERIFY) {
                    // Note that elsewhere numeric opcodes are limited to operands in the range
                    // -2**31+1 to 2**31-1, however it is legal for opcodes to produce results
                    // exceeding that range. This limitation is implemented by `num::parse`’s
                    // default 4-byte limit.
                    //
                    // If we kept to that limit we'd have a year 2038 problem, even though the
                    // `lock_time` field in transactions themselves is u32 which only becomes
                    // meaningless after the year 2106.
                    //
                    // Thus as a special case we accept up to 5-byte bignums, which are good until
                    // 2**39-1, well beyond the 2**32-1 limit of the `lock_time` field itself.
                    let lock_time = state
                        .stack
                        .rget(0)
                        .and_then(|v| parse_num(v, Some(num::LOCK_TIME_MAX_SIZE)))?;

                    // In the rare event that the argument may be < 0 due to some arithmetic being
                    // done first, you can always use 0 MAX CHECKLOCKTIMEVERIFY.
                    if lock_time < 0 {
                        Err(interpreter::Error::NegativeLockTime)
                    } else if checker.check_lock_time(lock_time) {
                        Ok(())
                    } else {
                        Err(interpreter::Error::UnsatisfiedLockTime)
                    }
                } else {
                    discourage_nop()
                }
            }

            // (seq -- seq)
            Self::OP_CHECKSEQUENCEVERIFY => {
                if flags.contains(interpreter::Flags::CHECKSEQUENCEVERIFY) {
                    // nSequence, like nLockTime, is a 32-bit unsigned integer field. See the
                    // comment in CHECKLOCKTIMEVERIFY regarding 5-byte numeric operands.
                    let sequence = state
                        .stack
                        .rget(0)
                        .and_then(|v| parse_num(v, Some(num::LOCK_TIME_MAX_SIZE)))?;

                    if sequence < 0 {
                        Err(interpreter::Error::NegativeLockTime)
                    } else if sequence & i64::from(tx::SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
                        // With the disable flag set the operand is reserved for future soft forks,
                        // and the opcode behaves as a NOP.
                        Ok(())
                    } else if checker.check_sequence(sequence) {
                        Ok(())
                    } else {
                        Err(interpreter::Error::UnsatisfiedLockTime)
                    }
                } else {
                    discourage_nop()
                }
            }

            Self::OP_NOP1
            | Self::OP_NOP4
            | Self::OP_NOP5
            | Self::OP_NOP6
            | Self::OP_NOP7
            | Self::OP_NOP8
            | Self::OP_NOP9
            | Self::OP_NOP10 => discourage_nop(),

            Self::OP_VERIFY => {
                // (true -- ) or
                // (false -- false) and return
                state
                    .stack
                    .pop()
                    .and_then(|v| Self::verify(interpreter::cast_to_bool(&v)))
            }

            Self::OP_RETURN => Err(interpreter::Error::OpReturn),

            //
            // Stack ops
            //
            Self::OP_TOALTSTACK => state.stack.pop().map(|v| state.altstack.push(v)),

            Self::OP_FROMALTSTACK => state.altstack.pop().map(|v| state.stack.push(v)),

            Self::OP_2DROP => state
                .stack
                .pop()
                .and_then(|_| state.stack.pop())
                .map(|_| ()),

            // (x1 x2 -- x1 x2 x1 x2)
            Self::OP_2DUP => state.stack.repush(1).and_then(|()| state.stack.repush(1)),

            // (x1 x2 x3 -- x1 x2 x3 x1 x2 x3)
            Self::OP_3DUP => {
                state.stack.repush(2)?;
                state.stack.repush(2)?;
                state.stack.repush(2)
            }

            // (x1 x2 x3 x4 -- x1 x2 x3 x4 x1 x2)
            Self::OP_2OVER => state.stack.repush(3).and_then(|()| state.stack.repush(3)),

            // (x1 x2 x3 x4 x5 x6 -- x3 x4 x5 x6 x1 x2)
            Self::OP_2ROT => state
                .stack
                .move_to_top(5)
                .and_then(|()| state.stack.move_to_top(5)),

            // (x1 x2 x3 x4 -- x3 x4 x1 x2)
            Self::OP_2SWAP => state
                .stack
                .move_to_top(3)
                .and_then(|()| state.stack.move_to_top(3)),

            // (x - 0 | x x)
            Self::OP_IFDUP => state.stack.rget(0).cloned().map(|v| {
                if interpreter::cast_to_bool(&v) {
                    state.stack.push(v)
                }
            }),

            // -- stacksize
            Self::OP_DEPTH => i64::try_from(state.stack.len())
                .map_err(|err| interpreter::Error::StackSize(Some(err)))
                .map(|n| state.stack.push(num::serialize(n))),

            // (x -- )
            Self::OP_DROP => state.stack.pop().map(|_| ()),

            // (x -- x x)
            Self::OP_DUP => state.stack.repush(0),

            // (x1 x2 -- x2)
            Self::OP_NIP => state.stack.rremove(1).map(|_| ()),

            // (x1 x2 -- x1 x2 x1)
            Self::OP_OVER => state.stack.repush(1),

            // (xn ... x2 x1 x0 n - xn ... x2 x1 x0 xn)
            // (xn ... x2 x1 x0 n - ... x2 x1 x0 xn)
            Self::OP_PICK | Self::OP_ROLL => state.stack.check_len(2).and_then(|()| {
                pop_num(&mut state.stack, None)
                    .and_then(|i| {
                        usize::try_from(i)
                            .map_err(|_| interpreter::Error::InvalidStackOperation(None))
                    })
                    .and_then(|n| {
                        if self == &Self::OP_ROLL {
                            state.stack.move_to_top(n)
                        } else {
                            state.stack.repush(n)
                        }
                    })
            }),

            // (x1 x2 x3 -- x2 x3 x1)
            Self::OP_ROT => state.stack.move_to_top(2),

            // (x1 x2 -- x2 x1)
            Self::OP_SWAP => state.stack.move_to_top(1),

            // (x1 x2 -- x2 x1 x2)
            Self::OP_TUCK => state.stack.rinsert(1, state.stack.rget(0)?.clone()),

            // (in -- in size)
            Self::OP_SIZE => state.stack.rget(0).map(Vec::len).and_then(|len| {
                i64::try_from(len)
                    .map_err(|err| interpreter::Error::StackSize(Some(err)))
                    .map(|n| state.stack.push(num::serialize(n)))
            }),

            //
            // Bitwise logic
            //
            // (x1 x2 - bool)
            Self::OP_EQUAL => state
                .stack
                .binop(|x1, x2| Ok(Self::cast_from_bool(x1 == x2))),
            Self::OP_EQUALVERIFY => state.stack.binfn(|x1, x2| Self::verify(x1 == x2)),

            //
            // Numeric
            //

            // (in -- out)
            Self::OP_1ADD => unop_num(&mut state.stack, &|x| x + 1),
            Self::OP_1SUB => unop_num(&mut state.stack, &|x| x - 1),
            Self::OP_NEGATE => unop_num(&mut state.stack, &|x| -x),
            Self::OP_ABS => unop_num(&mut state.stack, &|x| x.abs()),
            Self::OP_NOT => unrel(&mut state.stack, &|x| x == 0),
            Self::OP_0NOTEQUAL => unrel(&mut state.stack, &|x| x != 0),

            // (x1 x2 -- out)
            Self::OP_ADD => binop_num(&mut state.stack, &|x1, x2| x1 + x2),
            Self::OP_SUB => binop_num(&mut state.stack, &|x1, x2| x1 - x2),
            Self::OP_BOOLAND => binrel(&mut state.stack, &|x1, x2| x1 != 0 && x2 != 0),
            Self::OP_BOOLOR => binrel(&mut state.stack, &|x1, x2| x1 != 0 || x2 != 0),
            Self::OP_NUMEQUAL => binrel(&mut state.stack, &|x1, x2| x1 == x2),
            Self::OP_NUMEQUALVERIFY => {
                Self::binbasic_num(&mut state.stack, require_minimal, |x1, x2| {
                    Self::verify(x1 == x2)
                })
            }
            Self::OP_NUMNOTEQUAL => binrel(&mut state.stack, &|x1, x2| x1 != x2),
            Self::OP_LESSTHAN => binrel(&mut state.stack, &|x1, x2| x1 < x2),
            Self::OP_GREATERTHAN => binrel(&mut state.stack, &|x1, x2| x1 > x2),
            Self::OP_LESSTHANOREQUAL => binrel(&mut state.stack, &|x1, x2| x1 <= x2),
            Self::OP_GREATERTHANOREQUAL => binrel(&mut state.stack, &|x1, x2| x1 >= x2),
            Self::OP_MIN => binop_num(&mut state.stack, &min),
            Self::OP_MAX => binop_num(&mut state.stack, &max),

            // (x min max -- out)
            Self::OP_WITHIN => {
                state.stack.check_len(3)?;
                let x = state.stack.rget(2).and_then(|v| parse_num(v, None))?;
                let min = state.stack.rget(1).and_then(|v| parse_num(v, None))?;
                let max = state.stack.rget(0).and_then(|v| parse_num(v, None))?;
                state.stack.truncate(state.stack.len() - 3);
                state.stack.push(Self::cast_from_bool(min <= x && x < max));
                Ok(())
            }

            //
            // Crypto
            //

            // (in -- hash)
            Self::OP_RIPEMD160
            | Self::OP_SHA1
            | Self::OP_SHA256
            | Self::OP_HASH160
            | Self::OP_HASH256 => state.stack.unop(|vch| {
                Ok(match self {
                    Self::OP_RIPEMD160 => Ripemd160::digest(vch).to_vec(),
                    Self::OP_SHA1 => Sha1::digest(vch).to_vec(),
                    Self::OP_SHA256 => Sha256::digest(vch).to_vec(),
                    Self::OP_HASH160 => Ripemd160::digest(Sha256::digest(vch)).to_vec(),
                    _ => Sha256::digest(Sha256::digest(vch)).to_vec(),
                })
            }),

            // Hash starts after the code separator
            Self::OP_CODESEPARATOR => {
                state.context.code_hash_start = state.pc;
                state.context.codesep_pos = state.opcode_pos;
                Ok(())
            }

            // (sig pubkey -- bool)
            Self::OP_CHECKSIG | Self::OP_CHECKSIGVERIFY => {
                state.stack.check_len(2)?;
                let vch_pub_key = state.stack.pop()?;
                let vch_sig = state.stack.pop()?;

                let success = Self::eval_checksig(
                    &vch_sig,
                    &vch_pub_key,
                    flags,
                    script,
                    checker,
                    &mut state.context,
                )?;
                if self == &Self::OP_CHECKSIGVERIFY {
                    Self::verify(success)
                } else {
                    Ok(state.stack.push(Self::cast_from_bool(success)))
                }
            }

            // (sig num pubkey -- num)
            Self::OP_CHECKSIGADD => {
                // OP_CHECKSIGADD is only available in Tapscript.
                if state.context.sig_version.has_legacy_limits() {
                    return Err(interpreter::Error::BadOpcode);
                }
                state.stack.check_len(3)?;
                let n = state.stack.rget(1).and_then(|v| parse_num(v, None))?;
                let vch_pub_key = state.stack.pop()?;
                state.stack.pop()?;
                let vch_sig = state.stack.pop()?;

                let success = Self::eval_checksig(
                    &vch_sig,
                    &vch_pub_key,
                    flags,
                    script,
                    checker,
                    &mut state.context,
                )?;
                state.stack.push(num::serialize(n + i64::from(success)));
                Ok(())
            }

            // ([sig ...] num_of_signatures [pubkey ...] num_of_pubkeys -- bool)
            Self::OP_CHECKMULTISIG | Self::OP_CHECKMULTISIGVERIFY => {
                if state.context.sig_version == SigVersion::Tapscript {
                    return Err(interpreter::Error::TapscriptCheckMultiSig);
                }

                let mut keys_count = pop_num(&mut state.stack, None).and_then(|i| {
                    u8::try_from(i).map_err(|err| interpreter::Error::PubKeyCount(Some(err)))
                })?;
                if keys_count > interpreter::MAX_PUBKEY_COUNT {
                    return Err(interpreter::Error::PubKeyCount(None));
                };
                state.increment_op_count(keys_count)?;

                // NB: This is guaranteed u8-safe, because we are limited to 20 keys and
                //     20 signatures, plus a couple other fields. u8 also gives us total
                //     conversions to the other types we deal with here (`usize` and `i64`).
                let mut i: u8 = keys_count;
                let mut ikey: u8 = 0;
                // The number of stack items that are not signatures.
                let non_sig_items = keys_count + 1;

                let mut sigs_count = state
                    .stack
                    .rget(i.into())
                    .and_then(|v| parse_num(v, None))
                    .and_then(|i| {
                        u8::try_from(i).map_err(|err| interpreter::Error::SigCount(Some(err)))
                    })?;
                if sigs_count > keys_count {
                    return Err(interpreter::Error::SigCount(None));
                };
                i += 1;
                let mut isig = i;
                i += sigs_count;
                state.stack.check_len(usize::from(i) + 1)?;

                // Subset of script starting at the most recent codeseparator
                let mut script_code = Self::script_code(script, &state.context);

                // Drop the signatures in pre-segwit scripts but not segwit scripts
                if state.context.sig_version == SigVersion::Base {
                    for k in 0..sigs_count {
                        let vch_sig = state.stack.rget(usize::from(isig + k))?;
                        let (cleaned, found) =
                            script_code.find_and_delete(&script::push_encoding(vch_sig));
                        if found > 0 && flags.contains(interpreter::Flags::ConstScriptCode) {
                            return Err(interpreter::Error::SigFindAndDelete);
                        }
                        script_code = cleaned;
                    }
                }

                let mut success = true;
                while success && sigs_count > 0 {
                    let vch_sig = state.stack.rget(usize::from(isig))?;
                    let vch_pub_key = state.stack.rget(usize::from(ikey))?;

                    // Check signature
                    let ok: bool = Self::is_ecdsa_sig_valid(
                        vch_sig,
                        vch_pub_key,
                        flags,
                        &script_code,
                        state.context.sig_version,
                        checker,
                    )?;

                    if ok {
                        isig += 1;
                        sigs_count -= 1;
                    }
                    ikey += 1;
                    keys_count -= 1;

                    // If there are more signatures left than keys left,
                    // then too many signatures have failed. Exit early,
                    // without checking any further signatures.
                    if sigs_count > keys_count {
                        success = false;
                    };
                }

                // Clean up stack of actual arguments
                for popped in 0..i {
                    let elem = state.stack.pop()?;
                    // If the operation failed, we require that all signatures must be empty
                    // vector
                    if !success
                        && flags.contains(interpreter::Flags::NullFail)
                        && non_sig_items <= popped
                        && !elem.is_empty()
                    {
                        return Err(interpreter::Error::NullFail);
                    }
                }

                // A bug causes CHECKMULTISIG to consume one extra argument
                // whose contents were not checked in any way.
                //
                // Unfortunately this is a potential source of mutability,
                // so optionally verify it is exactly equal to zero prior
                // to removing it from the stack.
                if flags.contains(interpreter::Flags::NullDummy) && !state.stack.rget(0)?.is_empty()
                {
                    return Err(interpreter::Error::SigNullDummy);
                }
                state.stack.pop()?;

                if self == &Self::OP_CHECKMULTISIGVERIFY {
                    Self::verify(success)
                } else {
                    Ok(state.stack.push(Self::cast_from_bool(success)))
                }
            }
        }
        .map(|()| state)
    }
}

impl Asm for Operation {
    fn to_asm(&self, _attempt_sighash_decode: bool) -> String {
        match self {
            Self::OP_NOP => "OP_NOP",
            Self::OP_VERIFY => "OP_VERIFY",
            Self::OP_RETURN => "OP_RETURN",
            Self::OP_TOALTSTACK => "OP_TOALTSTACK",
            Self::OP_FROMALTSTACK => "OP_FROMALTSTACK",
            Self::OP_2DROP => "OP_2DROP",
            Self::OP_2DUP => "OP_2DUP",
            Self::OP_3DUP => "OP_3DUP",
            Self::OP_2OVER => "OP_2OVER",
            Self::OP_2ROT => "OP_2ROT",
            Self::OP_2SWAP => "OP_2SWAP",
            Self::OP_IFDUP => "OP_IFDUP",
            Self::OP_DEPTH => "OP_DEPTH",
            Self::OP_DROP => "OP_DROP",
            Self::OP_DUP => "OP_DUP",
            Self::OP_NIP => "OP_NIP",
            Self::OP_OVER => "OP_OVER",
            Self::OP_PICK => "OP_PICK",
            Self::OP_ROLL => "OP_ROLL",
            Self::OP_ROT => "OP_ROT",
            Self::OP_SWAP => "OP_SWAP",
            Self::OP_TUCK => "OP_TUCK",
            Self::OP_SIZE => "OP_SIZE",
            Self::OP_EQUAL => "OP_EQUAL",
            Self::OP_EQUALVERIFY => "OP_EQUALVERIFY",
            Self::OP_1ADD => "OP_1ADD",
            Self::OP_1SUB => "OP_1SUB",
            Self::OP_NEGATE => "OP_NEGATE",
            Self::OP_ABS => "OP_ABS",
            Self::OP_NOT => "OP_NOT",
            Self::OP_0NOTEQUAL => "OP_0NOTEQUAL",
            Self::OP_ADD => "OP_ADD",
            Self::OP_SUB => "OP_SUB",
            Self::OP_BOOLAND => "OP_BOOLAND",
            Self::OP_BOOLOR => "OP_BOOLOR",
            Self::OP_NUMEQUAL => "OP_NUMEQUAL",
            Self::OP_NUMEQUALVERIFY => "OP_NUMEQUALVERIFY",
            Self::OP_NUMNOTEQUAL => "OP_NUMNOTEQUAL",
            Self::OP_LESSTHAN => "OP_LESSTHAN",
            Self::OP_GREATERTHAN => "OP_GREATERTHAN",
            Self::OP_LESSTHANOREQUAL => "OP_LESSTHANOREQUAL",
            Self::OP_GREATERTHANOREQUAL => "OP_GREATERTHANOREQUAL",
            Self::OP_MIN => "OP_MIN",
            Self::OP_MAX => "OP_MAX",
            Self::OP_WITHIN => "OP_WITHIN",
            Self::OP_RIPEMD160 => "OP_RIPEMD160",
            Self::OP_SHA1 => "OP_SHA1",
            Self::OP_SHA256 => "OP_SHA256",
            Self::OP_HASH160 => "OP_HASH160",
            Self::OP_HASH256 => "OP_HASH256",
            Self::OP_CODESEPARATOR => "OP_CODESEPARATOR",
            Self::OP_CHECKSIG => "OP_CHECKSIG",
            Self::OP_CHECKSIGVERIFY => "OP_CHECKSIGVERIFY",
            Self::OP_CHECKMULTISIG => "OP_CHECKMULTISIG",
            Self::OP_CHECKMULTISIGVERIFY => "OP_CHECKMULTISIGVERIFY",
            Self::OP_NOP1 => "OP_NOP1",
            // Disassembly keeps the soft-forked NOPs under their original names.
            Self::OP_CHECKLOCKTIMEVERIFY => "OP_NOP2",
            Self::OP_CHECKSEQUENCEVERIFY => "OP_NOP3",
            Self::OP_NOP4 => "OP_NOP4",
            Self::OP_NOP5 => "OP_NOP5",
            Self::OP_NOP6 => "OP_NOP6",
            Self::OP_NOP7 => "OP_NOP7",
            Self::OP_NOP8 => "OP_NOP8",
            Self::OP_NOP9 => "OP_NOP9",
            Self::OP_NOP10 => "OP_NOP10",
            Self::OP_CHECKSIGADD => "OP_CHECKSIGADD",
        }
        .to_string()
    }
}

impl From<&PushValue> for Vec<u8> {
    fn from(value: &PushValue) -> Self {
        match value {
            PushValue::SmallValue(v) => vec![(*v).encode()],
            PushValue::LargeValue(v) => v.into(),
        }
    }
}

/// Opcodes that fail if they’re on an active branch.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[allow(missing_docs)]
pub enum Bad {
    OP_RESERVED,
    OP_VER,
    OP_VERIF,
    OP_VERNOTIF,
    OP_RESERVED1,
    OP_RESERVED2,
    Unknown(u8),
}

impl Bad {
    /// Bad opcodes are a bit complicated.
    ///
    /// - They only fail if they are evaluated, so we can’t statically fail scripts that contain them
    ///   (unlike [Disabled]).
    /// - [Bad::OP_RESERVED] counts as a push value for the purposes of
    ///   [interpreter::Flags::SigPushOnly] (but push-only sigs must necessarily evaluate
    ///   all of their opcodes, so what we’re preserving here is that we get
    ///   [script::Error::SigPushOnly] in this case instead of [interpreter::Error::BadOpcode]).
    /// - [Bad::OP_VERIF] and [Bad::OP_VERNOTIF] both _always_ get evaluated, so we need to special case
    ///   them when checking whether to throw [interpreter::Error::BadOpcode]
    fn eval(
        &self,
        mut state: interpreter::State,
    ) -> Result<interpreter::State, interpreter::Error> {
        // Note how OP_RESERVED does not count towards the opcode limit.
        if &Self::OP_RESERVED != self {
            state.increment_op_count(1)?;
        }
        if matches!(self, Self::OP_VERIF | Self::OP_VERNOTIF)
            || interpreter::should_exec(&state.vexec)
        {
            Err(interpreter::Error::BadOpcode)
        } else {
            Ok(state)
        }
    }

    /// Decodes this opcode from its byte encoding.
    fn decode(value: u8) -> Self {
        match value {
            0x50 => Bad::OP_RESERVED,
            0x62 => Bad::OP_VER,
            0x65 => Bad::OP_VERIF,
            0x66 => Bad::OP_VERNOTIF,
            0x89 => Bad::OP_RESERVED1,
            0x8a => Bad::OP_RESERVED2,
            _ => Bad::Unknown(value),
        }
    }

    /// Returns the byte encoding of this opcode.
    pub(crate) fn encode(self) -> u8 {
        match self {
            Bad::OP_RESERVED => 0x50,
            Bad::OP_VER => 0x62,
            Bad::OP_VERIF => 0x65,
            Bad::OP_VERNOTIF => 0x66,
            Bad::OP_RESERVED1 => 0x89,
            Bad::OP_RESERVED2 => 0x8a,
            Bad::Unknown(byte) => byte,
        }
    }
}

impl Asm for Bad {
    fn to_asm(&self, _attempt_sighash_decode: bool) -> String {
        match self {
            Bad::OP_RESERVED => "OP_RESERVED",
            Bad::OP_VER => "OP_VER",
            Bad::OP_VERIF => "OP_VERIF",
            Bad::OP_VERNOTIF => "OP_VERNOTIF",
            Bad::OP_RESERVED1 => "OP_RESERVED1",
            Bad::OP_RESERVED2 => "OP_RESERVED2",
            Bad::Unknown(_) => "OP_UNKNOWN",
        }
        .to_string()
    }
}

/// When writing scripts, we don’t want to allow bad opcodes, so `Opcode` doesn’t include them.
/// However, when validating scripts, bad opcodes only cause a failure when they’re on an active
/// branch, so this type allows us to hold onto the bad opcodes when parsing.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PossiblyBad {
    /// An opcode that can be evaluated.
    Good(Opcode),
    /// An opcode that is valid in a script, but fails if evaluated.
    Bad(Bad),
}

impl PossiblyBad {
    /// This parses a single opcode from a byte stream.
    ///
    /// This always returns the unparsed bytes, because parsing failures don’t invalidate the
    /// remainder of the stream (if any).
    pub(crate) fn parse(script: &[u8]) -> (Result<Self, Error>, &[u8]) {
        match push_value::LargeValue::parse(script) {
            None => match script.split_first() {
                None => (
                    Err(Error::Read {
                        expected_bytes: 1,
                        available_bytes: 0,
                    }),
                    &[],
                ),
                Some((&leading_byte, remaining_code)) => (
                    Disabled::decode(leading_byte).map_or(
                        Ok(
                            if let Some(sv) = push_value::SmallValue::decode(leading_byte) {
                                Self::from(Opcode::from(PushValue::SmallValue(sv)))
                            } else if let Some(ctl) = Control::decode(leading_byte) {
                                Self::from(Opcode::Control(ctl))
                            } else if let Some(op) = Operation::decode(leading_byte) {
                                Self::from(Opcode::Operation(op))
                            } else {
                                Self::from(Bad::decode(leading_byte))
                            },
                        ),
                        |disabled| Err(Error::Disabled(disabled)),
                    ),
                    remaining_code,
                ),
            },
            Some((res, remaining_code)) => (
                res.map(|v| Self::from(Opcode::from(PushValue::LargeValue(v)))),
                remaining_code,
            ),
        }
    }
}

impl Evaluable for PossiblyBad {
    fn byte_len(&self) -> usize {
        match self {
            Self::Good(op) => op.byte_len(),
            Self::Bad(_) => 1,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        Vec::<u8>::from(self)
    }

    fn restrict(pb: PossiblyBad) -> Result<Self, script::Error> {
        Ok(pb)
    }

    /// Eval a single [`Opcode`] … which may be [`Bad`].
    fn eval(
        &self,
        flags: interpreter::Flags,
        script: &script::Code,
        checker: &dyn interpreter::SignatureChecker,
        state: interpreter::State,
    ) -> Result<interpreter::State, interpreter::Error> {
        match self {
            Self::Bad(bad) => bad.eval(state),
            Self::Good(opcode) => opcode.eval(flags, script, checker, state),
        }
    }

    fn extract_push_value(&self) -> Result<&PushValue, script::Error> {
        match self {
            Self::Good(op) => op.extract_push_value(),
            Self::Bad(_) => Err(script::Error::Interpreter(
                Some(self.clone()),
                interpreter::Error::BadOpcode,
            )),
        }
    }

    fn sig_op_count(&self, last_opcode: Option<PossiblyBad>) -> u32 {
        match self {
            Self::Good(op) => op.sig_op_count(last_opcode),
            Self::Bad(_) => 0,
        }
    }
}

impl From<Opcode> for PossiblyBad {
    fn from(value: Opcode) -> Self {
        Self::Good(value)
    }
}

impl From<Bad> for PossiblyBad {
    fn from(value: Bad) -> Self {
        Self::Bad(value)
    }
}

impl From<PushValue> for PossiblyBad {
    fn from(value: PushValue) -> Self {
        Self::Good(Opcode::from(value))
    }
}

impl From<&PossiblyBad> for Vec<u8> {
    fn from(value: &PossiblyBad) -> Self {
        match value {
            PossiblyBad::Good(opcode) => opcode.into(),
            PossiblyBad::Bad(bad) => vec![bad.encode()],
        }
    }
}

impl Asm for PossiblyBad {
    fn to_asm(&self, attempt_sighash_decode: bool) -> String {
        match self {
            PossiblyBad::Good(op) => op.to_asm(attempt_sighash_decode),
            PossiblyBad::Bad(bad) => bad.to_asm(attempt_sighash_decode),
        }
    }
}

/// Opcodes that are invalid in a script, regardless of whether they would ever be evaluated.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[allow(missing_docs)]
#[repr(u8)]
pub enum Disabled {
    // splice ops
    OP_CAT = 0x7e,
    OP_SUBSTR = 0x7f,
    OP_LEFT = 0x80,
    OP_RIGHT = 0x81,
    // bit logic
    OP_INVERT = 0x83,
    OP_AND = 0x84,
    OP_OR = 0x85,
    OP_XOR = 0x86,
    // numeric
    OP_2MUL = 0x8d,
    OP_2DIV = 0x8e,
    OP_MUL = 0x95,
    OP_DIV = 0x96,
    OP_MOD = 0x97,
    OP_LSHIFT = 0x98,
    OP_RSHIFT = 0x99,
}

impl Disabled {
    /// Decodes this opcode from its byte encoding.
    fn decode(b: u8) -> Option<Self> {
        match b {
            0x7e => Some(Self::OP_CAT),
            0x7f => Some(Self::OP_SUBSTR),
            0x80 => Some(Self::OP_LEFT),
            0x81 => Some(Self::OP_RIGHT),
            0x83 => Some(Self::OP_INVERT),
            0x84 => Some(Self::OP_AND),
            0x85 => Some(Self::OP_OR),
            0x86 => Some(Self::OP_XOR),
            0x8d => Some(Self::OP_2MUL),
            0x8e => Some(Self::OP_2DIV),
            0x95 => Some(Self::OP_MUL),
            0x96 => Some(Self::OP_DIV),
            0x97 => Some(Self::OP_MOD),
            0x98 => Some(Self::OP_LSHIFT),
            0x99 => Some(Self::OP_RSHIFT),
            _ => None,
        }
    }

    /// Returns the byte encoding of this opcode.
    pub(crate) fn encode(self) -> u8 {
        // This is how you get the discriminant, but using `as` everywhere is too much code smell
        self as u8
    }
}

impl Asm for Disabled {
    fn to_asm(&self, _attempt_sighash_decode: bool) -> String {
        format!("{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::{
        interpreter::{
            self, ExecutionContext, Flags, NullSignatureChecker, SigVersion, Stack, State,
        },
        num, op, script, Opcode,
    };

    use super::{
        push_value::LargeValue, Control, Disabled, Evaluable, Operation, PossiblyBad, PushValue,
        SmallValue,
    };

    fn run(
        ops: &[Opcode],
        flags: Flags,
        sig_version: SigVersion,
        stack: Vec<Vec<u8>>,
    ) -> Result<Vec<Vec<u8>>, interpreter::Error> {
        let script = script::Code(script::Code::serialize(ops));
        ops.iter()
            .try_fold(
                State::initial(Stack::from(stack), ExecutionContext::new(sig_version)),
                |state, op| op.eval(flags, &script, &NullSignatureChecker(), state),
            )
            .map(|state| state.stack.iter().cloned().collect())
    }

    #[test]
    fn round_trip_opcode_encodings() {
        for b in 0..=u8::MAX {
            if let Some(sv) = SmallValue::decode(b) {
                assert_eq!(sv.encode(), b);
            }
            if let Some(control) = Control::decode(b) {
                assert_eq!(control.encode(), b);
            }
            if let Some(operation) = Operation::decode(b) {
                assert_eq!(operation.encode(), b);
            }
            if let Some(disabled) = Disabled::decode(b) {
                assert_eq!(disabled.encode(), b);
                assert_eq!(Operation::decode(b), None);
            }
        }
        for v in [vec![], vec![0x81], vec![7], vec![16], vec![17], vec![0; 300]] {
            let pv = PushValue::from_slice(&v).expect("fits");
            assert!(pv.is_minimal_push());
            assert_eq!(pv.value(), v);
        }
        assert_eq!(LargeValue::from_slice(&[0; 521]), None);
    }

    #[test]
    fn parsing_keeps_bad_opcodes() {
        assert_eq!(
            PossiblyBad::parse(&[0xbb, 0x61]),
            (Ok(PossiblyBad::Bad(super::Bad::Unknown(0xbb))), &[0x61][..])
        );
        assert_eq!(
            PossiblyBad::parse(&[0x7e]).0,
            Err(super::Error::Disabled(Disabled::OP_CAT))
        );
    }

    #[test]
    fn arithmetic() {
        assert_eq!(
            run(
                &[op::_2, op::_3, op::ADD, op::_5, op::NUMEQUAL],
                Flags::empty(),
                SigVersion::Base,
                vec![]
            ),
            Ok(vec![vec![1]])
        );
        assert_eq!(
            run(
                &[op::_1, op::_0, op::_2, op::WITHIN],
                Flags::empty(),
                SigVersion::Base,
                vec![]
            ),
            Ok(vec![vec![1]])
        );
        assert_eq!(
            run(&[op::SIZE], Flags::empty(), SigVersion::Base, vec![vec![0; 200]]),
            Ok(vec![vec![0; 200], num::serialize(200)])
        );
    }

    #[test]
    fn minimal_if_depends_on_sig_version() {
        let ops = [op::IF, op::_1, op::ENDIF];
        let two = vec![vec![2]];
        assert_eq!(
            run(&ops, Flags::empty(), SigVersion::Base, two.clone()),
            Ok(vec![vec![1]])
        );
        assert_eq!(
            run(&ops, Flags::empty(), SigVersion::WitnessV0, two.clone()),
            Ok(vec![vec![1]])
        );
        assert_eq!(
            run(&ops, Flags::MinimalIf, SigVersion::WitnessV0, two.clone()),
            Err(interpreter::Error::MinimalIf)
        );
        assert_eq!(
            run(&ops, Flags::empty(), SigVersion::Tapscript, two),
            Err(interpreter::Error::TapscriptMinimalIf)
        );
        assert_eq!(
            run(&ops, Flags::empty(), SigVersion::Base, vec![]),
            Err(interpreter::Error::UnbalancedConditional)
        );
    }

    #[test]
    fn checksigadd_is_tapscript_only() {
        let stack = vec![vec![], vec![3], vec![0x11; 32]];
        assert_eq!(
            run(
                &[op::CHECKSIGADD],
                Flags::empty(),
                SigVersion::WitnessV0,
                stack.clone()
            ),
            Err(interpreter::Error::BadOpcode)
        );
        // An empty signature adds nothing and isn’t checked.
        assert_eq!(
            run(&[op::CHECKSIGADD], Flags::empty(), SigVersion::Tapscript, stack),
            Ok(vec![vec![3]])
        );
    }

    #[test]
    fn tapscript_pubkey_types() {
        let unknown_key = vec![vec![], vec![0x11; 33]];
        assert_eq!(
            run(
                &[op::CHECKSIG],
                Flags::empty(),
                SigVersion::Tapscript,
                unknown_key.clone()
            ),
            Ok(vec![vec![]])
        );
        assert_eq!(
            run(
                &[op::CHECKSIG],
                Flags::DiscourageUpgradablePubKeyType,
                SigVersion::Tapscript,
                unknown_key
            ),
            Err(interpreter::Error::DiscourageUpgradablePubKeyType)
        );
        assert_eq!(
            run(
                &[op::CHECKSIG],
                Flags::empty(),
                SigVersion::Tapscript,
                vec![vec![], vec![]]
            ),
            Err(interpreter::Error::PubKeyType)
        );
        assert_eq!(
            run(
                &[op::CHECKMULTISIG],
                Flags::empty(),
                SigVersion::Tapscript,
                vec![vec![], vec![], vec![]]
            ),
            Err(interpreter::Error::TapscriptCheckMultiSig)
        );
    }

    #[test]
    fn null_fail_requires_empty_signatures() {
        let bad_sig = hex::decode("3006020101020101").expect("valid hex");
        let key = vec![0x02; 33];
        assert_eq!(
            run(
                &[op::CHECKSIG],
                Flags::empty(),
                SigVersion::Base,
                vec![bad_sig.clone(), key.clone()]
            ),
            Ok(vec![vec![]])
        );
        assert_eq!(
            run(
                &[op::CHECKSIG],
                Flags::NullFail,
                SigVersion::Base,
                vec![bad_sig.clone(), key.clone()]
            ),
            Err(interpreter::Error::NullFail)
        );
        // 1-of-1 multisig with a failing signature
        assert_eq!(
            run(
                &[op::CHECKMULTISIG],
                Flags::NullFail,
                SigVersion::Base,
                vec![vec![], bad_sig, vec![1], key, vec![1]]
            ),
            Err(interpreter::Error::NullFail)
        );
    }

    #[test]
    fn checkmultisig_dummy() {
        let stack = |dummy: Vec<u8>| vec![dummy, vec![], vec![]];
        assert_eq!(
            run(
                &[op::CHECKMULTISIG],
                Flags::empty(),
                SigVersion::Base,
                stack(vec![7])
            ),
            Ok(vec![vec![1]])
        );
        assert_eq!(
            run(
                &[op::CHECKMULTISIG],
                Flags::NullDummy,
                SigVersion::Base,
                stack(vec![7])
            ),
            Err(interpreter::Error::SigNullDummy)
        );
        assert_eq!(
            run(
                &[op::CHECKMULTISIG],
                Flags::empty(),
                SigVersion::Base,
                vec![vec![], vec![]]
            ),
            Err(interpreter::Error::InvalidStackOperation(Some((1, 1))))
        );
    }

    #[test]
    fn upgradable_nops() {
        for nop in [op::NOP1, op::NOP4, op::NOP10, op::CHECKLOCKTIMEVERIFY] {
            assert_eq!(
                run(&[nop.clone()], Flags::empty(), SigVersion::Base, vec![]),
                Ok(vec![])
            );
            assert_eq!(
                run(&[nop], Flags::DiscourageUpgradableNOPs, SigVersion::Base, vec![]),
                Err(interpreter::Error::DiscourageUpgradableNOPs)
            );
        }
    }

    #[test]
    fn lock_time_operands() {
        assert_eq!(
            run(
                &[op::CHECKSEQUENCEVERIFY],
                Flags::CHECKSEQUENCEVERIFY,
                SigVersion::Base,
                vec![vec![0x81]]
            ),
            Err(interpreter::Error::NegativeLockTime)
        );
        // The disable flag turns CSV into a NOP, even with a checker that fails everything.
        assert_eq!(
            run(
                &[op::CHECKSEQUENCEVERIFY],
                Flags::CHECKSEQUENCEVERIFY,
                SigVersion::Base,
                vec![num::serialize(1 << 31)]
            ),
            Ok(vec![num::serialize(1 << 31)])
        );
        assert_eq!(
            run(
                &[op::CHECKLOCKTIMEVERIFY],
                Flags::CHECKLOCKTIMEVERIFY,
                SigVersion::Base,
                vec![num::serialize(100)]
            ),
            Err(interpreter::Error::UnsatisfiedLockTime)
        );
    }
}
