//! Managing sequences of opcodes.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use thiserror::Error;

use crate::{
    interpreter::{self, ExecutionContext, SigVersion},
    opcode::{self, push_value::LargeValue, Operation::*, PushValue},
    Opcode,
};

pub(crate) mod iter;
pub mod witness;

/// Errors that can occur during script verification.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    // Max sizes
    #[error(
        "Script size{} exceeded maxmimum ({} bytes)",
        .0.map_or("", |size| " ({size} bytes)"),
        Code::MAX_SIZE
    )]
    ScriptSize(Option<usize>),

    #[error("during parsing: {0}")]
    Opcode(opcode::Error),

    #[error("non-push opcode encountered in script sig when push-only required")]
    SigPushOnly,

    /// The opcode is missing when the failure isn’t tied to a single opcode, e.g. a taproot key
    /// path signature.
    #[error("during interpretation: {1}")]
    Interpreter(Option<opcode::PossiblyBad>, interpreter::Error),

    #[error("{} closed before the end of the script", match .0 { 1 => "1 conditional opcode wasn’t", n => "{n} conditional opcodes weren’t"})]
    UnclosedConditional(usize),

    #[error("the script is P2SH, but there was no redeem script left on the stack")]
    MissingRedeemScript,

    #[error("clean stack requirement not met")]
    CleanStack,

    // Segregated witness
    #[error("witness program has incorrect length")]
    WitnessProgramWrongLength,

    #[error("witness program was passed an empty witness")]
    WitnessProgramWitnessEmpty,

    #[error("witness program hash mismatch")]
    WitnessProgramMismatch,

    #[error("witness requires empty scriptSig")]
    WitnessMalleated,

    #[error("witness requires only-redeemscript scriptSig")]
    WitnessMalleatedP2SH,

    #[error("witness provided for non-witness script")]
    WitnessUnexpected,

    #[error("witness script didn’t leave exactly one element on the stack")]
    WitnessCleanStack,

    // Taproot
    #[error("invalid taproot control block size ({0} bytes)")]
    TaprootWrongControlSize(usize),

    // softfork safeness
    #[error("witness version reserved for soft-fork upgrades")]
    DiscourageUpgradableWitnessProgram,

    #[error("taproot version reserved for soft-fork upgrades")]
    DiscourageUpgradableTaprootVersion,

    #[error("OP_SUCCESSx reserved for soft-fork upgrades")]
    DiscourageOpSuccess,

    #[error("annex is reserved for soft-fork upgrades")]
    DiscourageUpgradableAnnex,
}

impl Error {
    /// The flag that enabled this failure, if it is a policy rule rather than an unconditional
    /// one.
    pub fn rule(&self) -> Option<interpreter::Flags> {
        match self {
            Self::Interpreter(_, ierr) => ierr.rule(),
            Self::SigPushOnly => Some(interpreter::Flags::SigPushOnly),
            Self::CleanStack => Some(interpreter::Flags::CleanStack),
            Self::DiscourageUpgradableWitnessProgram => {
                Some(interpreter::Flags::DiscourageUpgradableWitnessProgram)
            }
            Self::DiscourageUpgradableTaprootVersion => {
                Some(interpreter::Flags::DiscourageUpgradableTaprootVersion)
            }
            Self::DiscourageOpSuccess => Some(interpreter::Flags::DiscourageOpSuccess),
            Self::DiscourageUpgradableAnnex => Some(interpreter::Flags::DiscourageUpgradableAnnex),
            _ => None,
        }
    }
}

impl From<opcode::Error> for Error {
    fn from(value: opcode::Error) -> Self {
        Error::Opcode(value)
    }
}

/// Human-readable rendering of scripts, in the style of the reference node’s disassembly.
pub trait Asm {
    /// Render this value. When `attempt_sighash_decode` is set, pushes that look like signatures
    /// have their hash type rendered as a suffix, e.g. `[ALL|ANYONECANPAY]`.
    fn to_asm(&self, attempt_sighash_decode: bool) -> String;
}

/// Evaluation functions for script components.
pub trait Evaluable {
    /// Get the byte length of this script sig.
    fn byte_len(&self) -> usize;

    /// Convert a sequence of `Opcode`s to the bytes that would be included in a transaction.
    fn to_bytes(&self) -> Vec<u8>;

    /// Evaluate this script component, with a fresh execution context.
    fn eval(
        &self,
        flags: interpreter::Flags,
        checker: &dyn interpreter::SignatureChecker,
        stack: interpreter::Stack<Vec<u8>>,
        context: ExecutionContext,
    ) -> Result<interpreter::Stack<Vec<u8>>, Error>;

    /// Returns true iff this script is P2SH.
    fn is_pay_to_script_hash(&self) -> bool;

    /// Called by `IsStandardTx` and P2SH/BIP62 VerifyScript (which makes it consensus-critical).
    fn is_push_only(&self) -> bool;
}

/// A script component is used as either the script sig or script pubkey in a script. Depending on
/// `T` (which generally needs an `opcode::Evaluable` instance), it has different properties:
///
/// - `PossiblyBad` – used for scripts that need to go through consensus-compatible verification
///   (that is, read from the chain)
/// - `Opcode` – used for script pubkey and non-push-only script sigs that are authored to be placed
///   on the chain
/// - `PushValue` – used for push-only script sigs that are authored to be placed on the chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component<T>(pub Vec<T>);

/// A script sig has only `PushValue` elements.
pub type Sig = Component<PushValue>;

/// A script pubkey has any `Opcode`.
pub type PubKey = Component<Opcode>;

/// A redeem script has any `Opcode`.
pub type Redeem = Component<Opcode>;

/// A script component (sig or pubkey) that came from the chain.
///
/// This is used to preserve particular bits that authored scripts don’t allow.
///
/// **NB**: `Code(script_bytes).to_component()` followed by `Component::eval` has the same
///         _semantics_ as `Code(script_bytes).eval(_)`, but it won’t have the same error, because
///         `to_component` returns a parse error from anywhere in the script before any evaluation
///         happens, while `Code::eval` interleaves the parsing and evaluation.
pub type FromChain = Component<opcode::PossiblyBad>;

impl<T: Clone> Component<T> {
    /// Convert a `Component` to a less restricted opcode type, infallibly.
    pub fn weaken<U: From<T>>(&self) -> Component<U> {
        Component(self.0.iter().cloned().map(|op| U::from(op)).collect())
    }
}

impl<T: opcode::Evaluable> Component<T> {
    /// This parses an entire script.
    ///
    /// **NB**: If `T` is not `opcode::PossiblyBad`, this is stricter than the incremental parsing
    ///         that is done during `verify_script`, because it fails on unknown opcodes no matter
    ///         where they occur (when normally they only fail if they would be evaluated).
    pub fn parse(raw_script: &Code) -> Result<Self, Error> {
        raw_script
            .parse()
            .map(|mpb| mpb.map_err(Error::Opcode).and_then(T::restrict))
            .collect::<Result<_, _>>()
            .map(Component)
    }
}

impl<T: Into<opcode::PossiblyBad> + Clone> Component<T> {
    /// Convert a `Component` to a more restricted opcode type, erroring if it’s not
    /// possible.
    pub fn refine<U: opcode::Evaluable>(&self) -> Result<Component<U>, Error> {
        self.0
            .iter()
            .cloned()
            .map(|op| U::restrict(op.into()))
            .collect::<Result<_, _>>()
            .map(Component)
    }
}

impl<T: Into<opcode::PossiblyBad> + opcode::Evaluable + Clone> Evaluable for Component<T> {
    fn byte_len(&self) -> usize {
        self.0.iter().map(T::byte_len).sum()
    }

    /// Convert a sequence of `Opcode`s to the bytes that would be included in a transaction.
    fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|elem| elem.to_bytes()).collect()
    }

    fn eval(
        &self,
        flags: interpreter::Flags,
        checker: &dyn interpreter::SignatureChecker,
        stack: interpreter::Stack<Vec<u8>>,
        context: ExecutionContext,
    ) -> Result<interpreter::Stack<Vec<u8>>, Error> {
        Code::check_size(self.byte_len(), context.sig_version).and_then(|()| {
            iter::eval(
                self.0.iter().cloned().map(Ok),
                flags,
                &Code(self.to_bytes()),
                stack,
                context,
                checker,
            )
        })
    }

    fn is_pay_to_script_hash(&self) -> bool {
        Code(self.to_bytes()).is_pay_to_script_hash()
    }

    /// Called by `IsStandardTx` and P2SH/BIP62 VerifyScript (which makes it consensus-critical).
    fn is_push_only(&self) -> bool {
        self.0.iter().all(|op| {
            matches!(
                op.extract_push_value(),
                Ok(_)
                    | Err(Error::Interpreter(
                        Some(opcode::PossiblyBad::Bad(opcode::Bad::OP_RESERVED)),
                        interpreter::Error::BadOpcode
                    ))
            )
        })
    }
}

impl<T: Asm> Asm for Component<T> {
    fn to_asm(&self, attempt_sighash_decode: bool) -> String {
        self.0
            .iter()
            .map(|op| op.to_asm(attempt_sighash_decode))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An iterator that provides `Opcode`s from a byte stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Parser<'a>(&'a [u8]);

impl Iterator for Parser<'_> {
    type Item = Result<opcode::PossiblyBad, opcode::Error>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            None
        } else {
            let (res, rem) = opcode::PossiblyBad::parse(self.0);
            self.0 = rem;
            Some(res)
        }
    }
}

/// When an entire [`crate::Script`] is validated, this is used to tag errors with which component
/// they came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentType {
    /// The script sig.
    Sig,
    /// The script pubkey.
    PubKey,
    /// The redeem script from a P2SH script.
    Redeem,
    /// The witness program, including the witness script or tapscript it commits to.
    Witness,
}

/// The bytes `CScript() << vch` produces, i.e. a push of `vch` that is only minimal in its length
/// prefix. Signatures are removed from legacy script code in this encoding.
pub(crate) fn push_encoding(vch: &[u8]) -> Vec<u8> {
    let len = vch.len();
    // Lengths are bounded by the script size, far below `u32::MAX`.
    let len_bytes = u32::try_from(len).unwrap_or(u32::MAX).to_le_bytes();
    let mut bytes = Vec::with_capacity(len + 5);
    if len < usize::from(LargeValue::PUSHDATA1_BYTE) {
        bytes.push(len_bytes[0]);
    } else if len <= 0xff {
        bytes.extend([LargeValue::PUSHDATA1_BYTE, len_bytes[0]]);
    } else if len <= 0xffff {
        bytes.extend([LargeValue::PUSHDATA2_BYTE, len_bytes[0], len_bytes[1]]);
    } else {
        bytes.push(LargeValue::PUSHDATA4_BYTE);
        bytes.extend(len_bytes);
    }
    bytes.extend_from_slice(vch);
    bytes
}

/// Serialized script, used inside transaction inputs and outputs
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code(pub Vec<u8>);

impl Code {
    /// Maximum script length in bytes
    pub const MAX_SIZE: usize = 10_000;

    /// Tapscripts have no size limit, everything else is limited to [`Code::MAX_SIZE`].
    fn check_size(len: usize, sig_version: SigVersion) -> Result<(), Error> {
        if sig_version.has_legacy_limits() && Code::MAX_SIZE < len {
            Err(Error::ScriptSize(Some(len)))
        } else {
            Ok(())
        }
    }

    /// Produce an [`Opcode`] iterator from [`Code`].
    pub fn parse(&self) -> Parser<'_> {
        Parser(&self.0)
    }

    /// Convert this into a `Component`, which can then be combined in authored scripts in `Script`.
    pub fn to_component(&self) -> Result<Component<opcode::PossiblyBad>, opcode::Error> {
        self.parse().collect::<Result<_, _>>().map(Component)
    }

    /// Convert a sequence of `Opcode`s to the bytes that would be included in a transaction.
    pub fn serialize(script: &[Opcode]) -> Vec<u8> {
        script.iter().flat_map(Vec::from).collect()
    }

    /// Pre-version-0.6, Bitcoin always counted CHECKMULTISIGs
    /// as 20 sigops. With pay-to-script-hash, that changed:
    /// CHECKMULTISIGs serialized in script_sigs are
    /// counted more accurately, assuming they are of the form
    ///  ... OP_N CHECKMULTISIG ...
    pub fn sig_op_count(&self, accurate: bool) -> u32 {
        iter::sig_op_count(self.parse(), accurate)
    }

    /// Scripts starting with `OP_RETURN`, or too large to ever be executed, can’t be spent.
    pub fn is_unspendable(&self) -> bool {
        self.0.first() == Some(&OP_RETURN.encode()) || Code::MAX_SIZE < self.0.len()
    }

    /// The witness version and program, if this is a witness program.
    pub fn witness_program(&self) -> Option<(u8, &[u8])> {
        witness::program(&self.0)
    }

    /// Remove every occurrence of `pattern` that starts on an opcode boundary, returning the
    /// cleaned script and the number of occurrences removed.
    ///
    /// Parsing stops at the first truncated push, and everything after it is kept as is.
    pub fn find_and_delete(&self, pattern: &[u8]) -> (Code, usize) {
        if pattern.is_empty() {
            return (self.clone(), 0);
        }
        let script = &self.0[..];
        let mut result = Vec::with_capacity(script.len());
        let mut found = 0;
        let mut pc = 0;
        let mut pc2 = 0;
        loop {
            result.extend_from_slice(&script[pc2..pc]);
            while script[pc..].starts_with(pattern) {
                pc += pattern.len();
                found += 1;
            }
            pc2 = pc;
            if script.len() <= pc {
                break;
            }
            match opcode::PossiblyBad::parse(&script[pc..]) {
                (Err(opcode::Error::Read { .. }), _) => break,
                (_, rem) => pc = script.len() - rem.len(),
            }
        }
        if found == 0 {
            (self.clone(), 0)
        } else {
            result.extend_from_slice(&script[pc2..]);
            (Code(result), found)
        }
    }
}

impl Evaluable for Code {
    /// Get the byte length of this script sig.
    fn byte_len(&self) -> usize {
        self.0.len()
    }

    /// Convert a sequence of `Opcode`s to the bytes that would be included in a transaction.
    fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    fn eval(
        &self,
        flags: interpreter::Flags,
        checker: &dyn interpreter::SignatureChecker,
        stack: interpreter::Stack<Vec<u8>>,
        context: ExecutionContext,
    ) -> Result<interpreter::Stack<Vec<u8>>, Error> {
        Code::check_size(self.byte_len(), context.sig_version).and_then(|()| {
            iter::eval(
                self.parse().map(|res| res.map_err(Error::Opcode)),
                flags,
                self,
                stack,
                context,
                checker,
            )
        })
    }

    /// Returns true iff this script is P2SH.
    fn is_pay_to_script_hash(&self) -> bool {
        matches!(
            &self.0[..],
            [hash160, 0x14, .., equal] if self.0.len() == 23
                && *hash160 == OP_HASH160.encode()
                && *equal == OP_EQUAL.encode()
        )
    }

    /// Called by `IsStandardTx` and P2SH/BIP62 VerifyScript (which makes it consensus-critical).
    fn is_push_only(&self) -> bool {
        self.parse().all(|op| {
            matches!(
                op,
                // NB: Push sizes are only checked during interpretation, so we need to pass this
                //     check for too-big `PushValue`s.
                Err(opcode::Error::PushSize(_))
                    | Ok(opcode::PossiblyBad::Good(Opcode::PushValue(_))
                        | opcode::PossiblyBad::Bad(opcode::Bad::OP_RESERVED))
            )
        })
    }
}

impl Asm for Code {
    fn to_asm(&self, attempt_sighash_decode: bool) -> String {
        let attempt_sighash_decode = attempt_sighash_decode && !self.is_unspendable();
        let mut parts = Vec::new();
        for res in self.parse() {
            match res {
                Ok(op) => parts.push(op.to_asm(attempt_sighash_decode)),
                Err(opcode::Error::Disabled(op)) => parts.push(op.to_asm(false)),
                Err(_) => {
                    parts.push("[error]".to_string());
                    break;
                }
            }
        }
        parts.join(" ")
    }
}

impl core::fmt::Display for Code {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.to_asm(false))
    }
}

/// A script represented by byte sequences – the sig, the pubkey, and the witness stack that
/// accompanies the input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raw {
    /// The script signature from the spending transaction.
    pub sig: Code,
    /// The script pubkey from the funding transaction.
    pub pub_key: Code,
    /// The witness stack from the spending transaction, bottom first.
    pub witness: Vec<Vec<u8>>,
}

impl Raw {
    /// Create a [`Raw`] script from the slices extracted from transactions, without a witness.
    pub fn from_raw_parts(sig: Vec<u8>, pub_key: Vec<u8>) -> Self {
        Raw {
            sig: Code(sig),
            pub_key: Code(pub_key),
            witness: vec![],
        }
    }

    /// Attach the witness stack of the spending input.
    pub fn with_witness(mut self, witness: Vec<Vec<u8>>) -> Self {
        self.witness = witness;
        self
    }

    /// Validate a [`Raw`] script.
    pub fn eval(
        &self,
        flags: interpreter::Flags,
        checker: &dyn interpreter::SignatureChecker,
    ) -> Result<bool, (ComponentType, Error)> {
        iter::eval_script(&self.sig, &self.pub_key, &self.witness, flags, checker)
    }
}

impl Asm for Raw {
    fn to_asm(&self, attempt_sighash_decode: bool) -> String {
        self.sig.to_asm(attempt_sighash_decode) + " " + &self.pub_key.to_asm(false)
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::ToString, vec::Vec};

    use super::{push_encoding, Code, Error, Evaluable};
    use crate::{interpreter, op, opcode, pattern, pv, script::Asm};

    #[test]
    fn find_and_delete() {
        let check = |script: &str, pattern: &str, expected: &str, count: usize| {
            let script = Code(hex::decode(script).expect("valid hex"));
            let pattern = hex::decode(pattern).expect("valid hex");
            assert_eq!(
                script.find_and_delete(&pattern),
                (Code(hex::decode(expected).expect("valid hex")), count)
            );
        };

        check("0302ff03", "0302ff03", "", 1);
        check("0302ff030302ff03", "0302ff03", "", 2);
        check("0302ff030302ff03", "02", "0302ff030302ff03", 0);
        check("0302ff030302ff03", "ff", "0302ff030302ff03", 0);
        check("0302ff030302ff03", "03", "02ff0302ff03", 2);
        check("02feed5169", "feed51", "02feed5169", 0);
        check("02feed5169", "02feed51", "69", 1);
        check("516902feed5169", "feed51", "516902feed5169", 0);
        check("516902feed5169", "02feed51", "516969", 1);
        check("0003feed", "03feed", "00", 1);
        check("0003feed", "00", "03feed", 1);
        // Truncated pushes stop the scan, but anything already matched is removed.
        check("0302ff034c", "0302ff03", "4c", 1);
        check("ab", "", "ab", 0);
    }

    #[test]
    fn push_encoding_is_not_minimal() {
        assert_eq!(push_encoding(&[]), vec![0x00]);
        assert_eq!(push_encoding(&[0x05]), vec![0x01, 0x05]);
        assert_eq!(push_encoding(&[0xaa; 0x4c])[..2], [0x4c, 0x4c]);
        assert_eq!(push_encoding(&[0xaa; 0x100])[..3], [0x4d, 0x00, 0x01]);
    }

    #[test]
    fn script_classification() {
        let redeem = Code::serialize(&[op::_1]);
        let p2sh = Code(Code::serialize(&pattern::pay_to_script_hash(&redeem)));
        assert!(p2sh.is_pay_to_script_hash());
        assert!(!Code(redeem).is_pay_to_script_hash());

        assert!(Code(hex::decode("00504c0100").expect("valid hex")).is_push_only());
        assert!(!Code(hex::decode("0061").expect("valid hex")).is_push_only());
        assert!(!Code(vec![0x4c]).is_push_only());

        assert!(Code(vec![0x6a, 0x01]).is_unspendable());
        assert!(!Code(vec![0x51]).is_unspendable());
    }

    #[test]
    fn script_size_is_limited_outside_tapscript() {
        let big = Code(vec![0x61; Code::MAX_SIZE + 1]);
        assert_eq!(
            big.eval(
                interpreter::Flags::empty(),
                &interpreter::NullSignatureChecker(),
                interpreter::Stack::new(),
                interpreter::ExecutionContext::new(interpreter::SigVersion::Base),
            ),
            Err(Error::ScriptSize(Some(Code::MAX_SIZE + 1)))
        );
        assert_eq!(
            big.eval(
                interpreter::Flags::empty(),
                &interpreter::NullSignatureChecker(),
                interpreter::Stack::new(),
                interpreter::ExecutionContext::new(interpreter::SigVersion::Tapscript),
            ),
            Ok(interpreter::Stack::new())
        );
    }

    #[test]
    fn asm_rendering() {
        let code = Code(hex::decode("76a914d6791b1b29afe3997a5cdbc40f03d37baed379b988ac").expect("valid hex"));
        assert_eq!(
            code.to_string(),
            "OP_DUP OP_HASH160 d6791b1b29afe3997a5cdbc40f03d37baed379b9 OP_EQUALVERIFY OP_CHECKSIG"
        );
        assert_eq!(Code(vec![0x4f, 0x60, 0xb2, 0x7e, 0x4c]).to_string(), "-1 16 OP_NOP3 OP_CAT [error]");
        assert_eq!(
            pv::push_value(&[0x01, 0x02]).expect("small").to_asm(false),
            "513"
        );
        let component = Code(hex::decode("0051ba").expect("valid hex"))
            .to_component()
            .expect("parses");
        assert_eq!(component.to_asm(false), "0 1 OP_CHECKSIGADD");
        assert_eq!(
            Code::serialize(&[op::CHECKSIGADD]),
            Vec::from([opcode::Operation::OP_CHECKSIGADD.encode()])
        );
    }
}
