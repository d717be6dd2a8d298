//! Execution of opcodes

use alloc::vec::Vec;
use core::num::TryFromIntError;
use core::slice::Iter;

use thiserror::Error;

use crate::{num, script, signature};

/// Any error that can happen during interpretation of a single opcode.
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("OP_RETURN encountered")]
    OpReturn,

    /// __NB__: This doesn’t take an “actual count” argument, because `OpCount` depends on
    ///         conditional execution and thus can only be checked incrementally.
    #[error("operation count exceeded maxmimum of {}", MAX_OP_COUNT)]
    OpCount,

    #[error("stack depth exceeded maxmimum of {} entries", MAX_STACK_DEPTH)]
    StackSize(Option<TryFromIntError>),

    #[error(
        "signature count wasn’t in the range 0..={}{}",
        MAX_PUBKEY_COUNT,
        .0.map_or("", |e| ": {e}")
    )]
    SigCount(Option<TryFromIntError>),

    #[error(
        "public key count wasn’t in the range 0..={}{}",
        MAX_PUBKEY_COUNT,
        .0.map_or("", |e| ": {e}")
    )]
    PubKeyCount(Option<TryFromIntError>),

    // Failed verify operations
    #[error("verify operation failed")]
    Verify,

    // Logical/Format/Canonical errors
    #[error("bad opcode encountered")]
    BadOpcode,

    #[error("{}", .0.map_or("invalid stack operation encountered", |(elem, max)| "tried to retrieve element {elem} from a stack with {max} elements"))]
    InvalidStackOperation(Option<(usize, usize)>),

    #[error("unbalanced conditional encountered")]
    UnbalancedConditional,

    // OP_CHECKLOCKTIMEVERIFY and OP_CHECKSEQUENCEVERIFY
    #[error("negative lock time encountered")]
    NegativeLockTime,

    #[error("unsatisfied locktime condition")]
    UnsatisfiedLockTime,

    #[error("signature error: {0}")]
    Signature(signature::Error),

    #[error("non-minimal data encountered when minimal data required")]
    MinimalData,

    #[error("signature null dummy error")]
    SigNullDummy,

    #[error("public key type error")]
    PubKeyType,

    #[error("OP_IF/NOTIF argument must be minimal")]
    MinimalIf,

    #[error("signature must be empty if a signature check fails")]
    NullFail,

    #[error("witness scripts require compressed public keys")]
    WitnessPubKeyType,

    // CONST_SCRIPTCODE
    #[error("OP_CODESEPARATOR in a legacy script")]
    OpCodeSeparator,

    #[error("signature found in the script code")]
    SigFindAndDelete,

    // Tapscript
    #[error("OP_CHECKMULTISIG(VERIFY) isn’t available in tapscript")]
    TapscriptCheckMultiSig,

    #[error("tapscript validation weight exhausted")]
    TapscriptValidationWeight,

    #[error("OP_IF/NOTIF argument must be minimal in tapscript")]
    TapscriptMinimalIf,

    // softfork safeness
    #[error("discouraged upgradable NOP encountered")]
    DiscourageUpgradableNOPs,

    #[error("discouraged public key type encountered")]
    DiscourageUpgradablePubKeyType,

    /// Corresponds to the `scriptnum_error` exception in the reference node.
    #[error("script number error: {0}")]
    Num(num::Error),
}

impl Error {
    /// The flag that enabled this failure, if it is a policy rule rather than an unconditional
    /// one.
    pub fn rule(&self) -> Option<Flags> {
        match self {
            Self::Signature(sig_err) => match sig_err {
                signature::Error::SigDER(_) => Some(Flags::DERSig),
                signature::Error::SigHighS => Some(Flags::LowS),
                signature::Error::SigHashType(_) => Some(Flags::StrictEnc),
                _ => None,
            },
            Self::MinimalData | Self::Num(num::Error::NonMinimalEncoding(_)) => {
                Some(Flags::MinimalData)
            }
            Self::SigNullDummy => Some(Flags::NullDummy),
            Self::PubKeyType => Some(Flags::StrictEnc),
            Self::MinimalIf => Some(Flags::MinimalIf),
            Self::NullFail => Some(Flags::NullFail),
            Self::WitnessPubKeyType => Some(Flags::WitnessPubKeyType),
            Self::OpCodeSeparator | Self::SigFindAndDelete => Some(Flags::ConstScriptCode),
            Self::DiscourageUpgradableNOPs => Some(Flags::DiscourageUpgradableNOPs),
            Self::DiscourageUpgradablePubKeyType => Some(Flags::DiscourageUpgradablePubKeyType),
            _ => None,
        }
    }
}

impl From<num::Error> for Error {
    fn from(value: num::Error) -> Self {
        Error::Num(value)
    }
}

impl From<signature::Error> for Error {
    fn from(value: signature::Error) -> Self {
        Error::Signature(value)
    }
}

/// The maximum number of operations allowed in a script component.
pub(crate) const MAX_OP_COUNT: u8 = 201;

/// The maximum number of pubkeys (and signatures, by implication) allowed in CHECKMULTISIG.
pub(crate) const MAX_PUBKEY_COUNT: u8 = 20;

/// Every non-empty tapscript signature consumes this much of the validation weight budget.
pub(crate) const VALIDATION_WEIGHT_PER_SIGOP_PASSED: i64 = 50;

/// The validation weight budget starts this much above the serialized witness size.
pub(crate) const VALIDATION_WEIGHT_OFFSET: i64 = 50;

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    /// Script verification flags
    pub struct Flags: u32 {
        /// Evaluate P2SH subscripts (softfork safe,
        /// [BIP16](https://github.com/bitcoin/bips/blob/master/bip-0016.mediawiki).
        const P2SH = 1 << 0;

        /// Passing a non-strict-DER signature or one with undefined hashtype to a checksig operation causes script failure.
        /// Evaluating a pubkey that is not (0x04 + 64 bytes) or (0x02 or 0x03 + 32 bytes) by checksig causes script failure.
        /// (softfork safe, but not used or intended as a consensus rule).
        const StrictEnc = 1 << 1;

        /// Passing a non-strict-DER signature to a checksig operation causes script failure
        /// (softfork safe, [BIP66](https://github.com/bitcoin/bips/blob/master/bip-0066.mediawiki)).
        const DERSig = 1 << 2;

        /// Passing a non-strict-DER signature or one with S > order/2 to a checksig operation causes script failure
        /// (softfork safe, [BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 5).
        const LowS = 1 << 3;

        /// verify dummy stack item consumed by CHECKMULTISIG is of zero-length (softfork safe,
        /// [BIP147](https://github.com/bitcoin/bips/blob/master/bip-0147.mediawiki)).
        const NullDummy = 1 << 4;

        /// Using a non-push operator in the scriptSig causes script failure (softfork safe, [BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 2).
        const SigPushOnly = 1 << 5;

        /// Require minimal encodings for all push operations (OP_0... OP_16, OP_1NEGATE where possible, direct
        /// pushes up to 75 bytes, OP_PUSHDATA1 up to 255 bytes, OP_PUSHDATA2 for anything larger). Evaluating
        /// any other push causes the script to fail ([BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 3).
        /// In addition, whenever a stack element is interpreted as a number, it must be of minimal length ([BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 4).
        /// (softfork safe)
        const MinimalData = 1 << 6;

        /// Discourage use of NOPs reserved for upgrades (NOP1-10)
        ///
        /// Provided so that nodes can avoid accepting or mining transactions
        /// containing executed NOP's whose meaning may change after a soft-fork,
        /// thus rendering the script invalid; with this flag set executing
        /// discouraged NOPs fails the script. This verification flag will never be
        /// a mandatory flag applied to scripts in a block. NOPs that are not
        /// executed, e.g.  within an unexecuted IF ENDIF block, are *not* rejected.
        const DiscourageUpgradableNOPs = 1 << 7;

        /// Require that only a single stack element remains after evaluation. This changes the success criterion from
        /// "At least one stack element must remain, and when interpreted as a boolean, it must be true" to
        /// "Exactly one stack element must remain, and when interpreted as a boolean, it must be true".
        /// (softfork safe, [BIP62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki) rule 6)
        /// Note: CLEANSTACK should never be used without P2SH or WITNESS.
        const CleanStack = 1 << 8;

        /// Verify CHECKLOCKTIMEVERIFY
        ///
        /// See [BIP65](https://github.com/bitcoin/bips/blob/master/bip-0065.mediawiki) for details.
        const CHECKLOCKTIMEVERIFY = 1 << 9;

        /// Verify CHECKSEQUENCEVERIFY
        ///
        /// See [BIP112](https://github.com/bitcoin/bips/blob/master/bip-0112.mediawiki) for details.
        const CHECKSEQUENCEVERIFY = 1 << 10;

        /// Support segregated witness
        /// ([BIP141](https://github.com/bitcoin/bips/blob/master/bip-0141.mediawiki)).
        const Witness = 1 << 11;

        /// Making v1-v16 witness program non-standard.
        const DiscourageUpgradableWitnessProgram = 1 << 12;

        /// Segwit script only: require the argument of OP_IF/NOTIF to be exactly 0x01 or empty
        /// vector.
        const MinimalIf = 1 << 13;

        /// Signature(s) must be empty vector if a CHECK(MULTI)SIG operation failed
        /// ([BIP146](https://github.com/bitcoin/bips/blob/master/bip-0146.mediawiki)).
        const NullFail = 1 << 14;

        /// Public keys in segregated witness scripts must be compressed.
        const WitnessPubKeyType = 1 << 15;

        /// Making OP_CODESEPARATOR and FindAndDelete fail any non-segwit scripts.
        const ConstScriptCode = 1 << 16;

        /// Taproot/Tapscript validation
        /// ([BIP341](https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki) &
        /// [BIP342](https://github.com/bitcoin/bips/blob/master/bip-0342.mediawiki)).
        const Taproot = 1 << 17;

        /// Making unknown Taproot leaf versions non-standard.
        const DiscourageUpgradableTaprootVersion = 1 << 18;

        /// Making unknown OP_SUCCESS non-standard.
        const DiscourageOpSuccess = 1 << 19;

        /// Making unknown public key versions (in BIP 342 scripts) non-standard.
        const DiscourageUpgradablePubKeyType = 1 << 20;

        /// Making any annex non-standard, since no meaning has been assigned to it yet.
        const DiscourageUpgradableAnnex = 1 << 21;

        /// The rules every block must satisfy.
        const MANDATORY = Self::P2SH.bits()
            | Self::DERSig.bits()
            | Self::NullDummy.bits()
            | Self::CHECKLOCKTIMEVERIFY.bits()
            | Self::CHECKSEQUENCEVERIFY.bits()
            | Self::Witness.bits()
            | Self::Taproot.bits();

        /// The rules a transaction must satisfy to be relayed.
        const STANDARD = Self::MANDATORY.bits()
            | Self::StrictEnc.bits()
            | Self::MinimalData.bits()
            | Self::DiscourageUpgradableNOPs.bits()
            | Self::CleanStack.bits()
            | Self::MinimalIf.bits()
            | Self::NullFail.bits()
            | Self::LowS.bits()
            | Self::DiscourageUpgradableWitnessProgram.bits()
            | Self::WitnessPubKeyType.bits()
            | Self::ConstScriptCode.bits()
            | Self::DiscourageUpgradableTaprootVersion.bits()
            | Self::DiscourageOpSuccess.bits()
            | Self::DiscourageUpgradablePubKeyType.bits()
            | Self::DiscourageUpgradableAnnex.bits();
    }
}

/// Which rules a script is executed under. This selects the signature digest algorithm as well as
/// the resource limits.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SigVersion {
    /// Bare scripts and P2SH redeem scripts.
    Base,
    /// Witness v0 scripts ([BIP143](https://github.com/bitcoin/bips/blob/master/bip-0143.mediawiki)).
    WitnessV0,
    /// Taproot key path spends. No script is executed in this mode.
    Taproot,
    /// Taproot script path spends ([BIP342](https://github.com/bitcoin/bips/blob/master/bip-0342.mediawiki)).
    Tapscript,
}

impl SigVersion {
    /// Whether the operation count and script size limits apply.
    pub(crate) fn has_legacy_limits(self) -> bool {
        self <= SigVersion::WitnessV0
    }
}

/// The sentinel for “no OP_CODESEPARATOR executed yet”.
pub const NO_CODESEPARATOR: u32 = 0xffff_ffff;

/// Per-execution data that signature checks commit to or consume. A fresh value is created for
/// each script execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    /// The digest algorithm and limits in effect.
    pub sig_version: SigVersion,
    /// Byte offset into the executing script just after the last executed OP_CODESEPARATOR. The
    /// legacy and segwit v0 script code starts here.
    pub(crate) code_hash_start: usize,
    /// Opcode position of the last executed OP_CODESEPARATOR, committed to by tapscript
    /// signatures.
    pub codesep_pos: u32,
    /// SHA256 of the compact-size-prefixed annex, if the witness had one.
    pub annex_hash: Option<[u8; 32]>,
    /// The tapleaf hash of the executing tapscript.
    pub tapleaf_hash: Option<[u8; 32]>,
    /// Remaining tapscript signature validation budget.
    pub validation_weight_left: Option<i64>,
}

impl ExecutionContext {
    /// A context for the given signature version with nothing committed yet.
    pub fn new(sig_version: SigVersion) -> Self {
        ExecutionContext {
            sig_version,
            code_hash_start: 0,
            codesep_pos: NO_CODESEPARATOR,
            annex_hash: None,
            tapleaf_hash: None,
            validation_weight_left: None,
        }
    }
}

/// This verifies that a signature is correct for the given pubkey and script code.
pub trait SignatureChecker {
    /// Check an ECDSA signature for legacy and segwit v0 scripts. `vch_sig` is the signature as it
    /// appeared on the stack.
    fn check_ecdsa_sig(
        &self,
        vch_sig: &[u8],
        sig: &signature::Decoded,
        vch_pub_key: &[u8],
        script_code: &script::Code,
        sig_version: SigVersion,
    ) -> bool;

    /// Check a BIP340 signature for a taproot key path or a tapscript.
    fn check_schnorr_sig(
        &self,
        sig: &signature::Schnorr,
        pub_key: &[u8; 32],
        context: &ExecutionContext,
    ) -> Result<(), signature::Error>;

    /// Return true if the lock time argument is more recent than the time the script was evaluated.
    fn check_lock_time(&self, lock_time: i64) -> bool;

    /// Return true if the relative lock time argument has passed.
    fn check_sequence(&self, sequence: i64) -> bool;
}

/// A signature checker that always fails. This is helpful in testing cases that don’t involve
/// `CHECK*SIG`.
pub struct NullSignatureChecker();

impl SignatureChecker for NullSignatureChecker {
    fn check_ecdsa_sig(
        &self,
        _vch_sig: &[u8],
        _sig: &signature::Decoded,
        _vch_pub_key: &[u8],
        _script_code: &script::Code,
        _sig_version: SigVersion,
    ) -> bool {
        false
    }

    fn check_schnorr_sig(
        &self,
        _sig: &signature::Schnorr,
        _pub_key: &[u8; 32],
        _context: &ExecutionContext,
    ) -> Result<(), signature::Error> {
        Err(signature::Error::SchnorrSig)
    }

    fn check_lock_time(&self, _lock_time: i64) -> bool {
        false
    }

    fn check_sequence(&self, _sequence: i64) -> bool {
        false
    }
}

/// Treat a stack entry as a generalized boolean. Anything other than 0 and -0 (minimal encoding not
/// required) is treated as `true`.
pub fn cast_to_bool(vch: &[u8]) -> bool {
    match vch.iter().position(|b| *b != 0) {
        None => false,
        // Can be negative zero
        Some(i) => !(i == vch.len() - 1 && vch[i] == 0x80),
    }
}

/// Script is a stack machine (like Forth) that evaluates a predicate returning a bool indicating
/// valid or not.  There are no loops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stack<T>(Vec<T>);

// NB: This isn’t in `impl Stack`, because that requires us to specify type parameters, even though
//     this value doesn’t care about them.
/// The maximum number of elements allowed in the _combined_ stack and altstack.
pub(crate) const MAX_STACK_DEPTH: usize = 1000;

/// Wraps a Vec (or whatever underlying implementation we choose in a way that matches the reference
/// implementation and provides us some decent chaining)
impl<T> Stack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Stack(vec![])
    }

    /// Fail if the Stack doesn’t contain at least `min` elements.
    pub(crate) fn check_len(&self, min: usize) -> Result<(), Error> {
        let len = self.0.len();
        if min <= len {
            Ok(())
        } else {
            Err(Error::InvalidStackOperation(Some((min - 1, len))))
        }
    }

    fn rindex(&self, i: usize) -> Result<usize, Error> {
        let len = self.0.len();
        if i < len {
            Ok(len - i - 1)
        } else {
            Err(Error::InvalidStackOperation(Some((i, len))))
        }
    }

    /// Gets an element from the stack without removing it, counting from the right. I.e.,
    /// `rget(0)` returns the top element.
    pub(crate) fn rget(&self, i: usize) -> Result<&T, Error> {
        let idx = self.rindex(i)?;
        self.0.get(idx).ok_or(Error::InvalidStackOperation(None))
    }

    /// Removes and returns the top element from the stack.
    pub(crate) fn pop(&mut self) -> Result<T, Error> {
        self.0
            .pop()
            .ok_or(Error::InvalidStackOperation(Some((0, self.0.len()))))
    }

    /// Adds a new element to the top of the stack.
    pub(crate) fn push(&mut self, value: T) {
        self.0.push(value)
    }

    /// Returns true if there are no elements in the stack.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of elements in the stack.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns an iterator over the stack, bottom first.
    pub fn iter(&self) -> Iter<'_, T> {
        self.0.iter()
    }

    /// Returns a mutable reference to the last element of the stack.
    pub(crate) fn last_mut(&mut self) -> Result<&mut T, Error> {
        let len = self.0.len();
        self.0
            .last_mut()
            .ok_or(Error::InvalidStackOperation(Some((0, len))))
    }

    /// Returns a reference to the last element of the stack.
    pub fn last(&self) -> Result<&T, Error> {
        self.0
            .last()
            .ok_or(Error::InvalidStackOperation(Some((0, self.0.len()))))
    }

    /// Removes an element from the stack, counting from the right.
    pub(crate) fn rremove(&mut self, start: usize) -> Result<T, Error> {
        self.rindex(start).map(|rstart| self.0.remove(rstart))
    }

    /// Inserts an element at the given index, counting from the right.
    pub(crate) fn rinsert(&mut self, i: usize, element: T) -> Result<(), Error> {
        let ri = self.rindex(i)?;
        self.0.insert(ri, element);
        Ok(())
    }

    /// Drops everything above the first `len` elements.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.0.truncate(len)
    }

    // higher-level operations

    /// Perform a unary operation on the top stack element.
    pub(crate) fn unop(&mut self, op: impl FnOnce(T) -> Result<T, Error>) -> Result<(), Error> {
        self.pop().and_then(op).map(|res| self.push(res))
    }

    /// Call a binary function on the top two stack elements.
    pub(crate) fn binfn<R>(
        &mut self,
        op: impl FnOnce(T, T) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let x2 = self.pop()?;
        let x1 = self.pop()?;
        op(x1, x2)
    }

    /// Perform a binary operation on the top two stack elements.
    pub(crate) fn binop(&mut self, op: impl FnOnce(T, T) -> Result<T, Error>) -> Result<(), Error> {
        self.binfn(op).map(|res| self.push(res))
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for Stack<T> {
    /// The last element of the `Vec` becomes the top of the stack.
    fn from(value: Vec<T>) -> Self {
        Stack(value)
    }
}

impl<T: Clone> Stack<T> {
    /// Returns the last element of the stack as well as the remainder of the stack.
    pub(crate) fn split_last(&self) -> Result<(&T, Stack<T>), Error> {
        self.0
            .split_last()
            .ok_or(Error::InvalidStackOperation(Some((0, self.0.len()))))
            .map(|(last, rem)| (last, Stack(rem.to_vec())))
    }

    /// Copies the element at `i` (from the right) onto the top of the stack.
    pub(crate) fn repush(&mut self, i: usize) -> Result<(), Error> {
        self.rget(i).cloned().map(|v| self.push(v))
    }

    /// Moves the element at `i` (from the right) onto the top of the stack.
    pub(crate) fn move_to_top(&mut self, i: usize) -> Result<(), Error> {
        self.rremove(i).map(|v| self.push(v))
    }
}

/// This holds the various components that need to be carried between individual opcode evaluations.
///
/// **NB**: This intentionally doesn’t provide a `Clone` impl, to prevent resuse of old state.
#[derive(Debug, PartialEq, Eq)]
pub struct State {
    /// The primary evaluation stack.
    pub(crate) stack: Stack<Vec<u8>>,
    /// A secondary stack that elements can be moved to temporarily.
    pub(crate) altstack: Stack<Vec<u8>>,
    /// We keep track of how many operations have executed so far to prevent expensive-to-verify
    /// scripts
    op_count: u8,
    /// This keeps track of the conditional flags at each nesting level during execution. If we're
    /// in a branch of execution where *any* of these conditionals are false, we ignore opcodes
    /// unless those opcodes direct control flow (OP_IF, OP_ELSE, etc.).
    pub(crate) vexec: Stack<bool>,
    /// Signature-related data for this execution.
    pub(crate) context: ExecutionContext,
    /// Index of the opcode currently being evaluated.
    pub(crate) opcode_pos: u32,
    /// Byte offset just past the opcode currently being evaluated.
    pub(crate) pc: usize,
}

impl State {
    /// Creates a state with an initial stack, but other components empty.
    pub(crate) fn initial(stack: Stack<Vec<u8>>, context: ExecutionContext) -> Self {
        State {
            stack,
            altstack: Stack::new(),
            op_count: 0,
            vexec: Stack::new(),
            context,
            opcode_pos: 0,
            pc: 0,
        }
    }

    /// Bumps the current `op_count` and errors if it exceeds `MAX_OP_COUNT`. Tapscript has no
    /// operation limit.
    pub(crate) fn increment_op_count(&mut self, by: u8) -> Result<(), Error> {
        if !self.context.sig_version.has_legacy_limits() {
            return Ok(());
        }
        self.op_count = self.op_count.saturating_add(by);
        if self.op_count <= MAX_OP_COUNT {
            Ok(())
        } else {
            Err(Error::OpCount)
        }
    }

    /// Extract the altstack from the state.
    pub(crate) fn altstack(&self) -> &Stack<Vec<u8>> {
        &self.altstack
    }
}

/// Are we in an executing branch of the script?
pub(crate) fn should_exec(vexec: &Stack<bool>) -> bool {
    vexec.iter().all(|value| *value)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{cast_to_bool, Error, ExecutionContext, Flags, SigVersion, Stack, State};
    use crate::{num, signature};

    #[test]
    fn booleans() {
        assert!(!cast_to_bool(&num::serialize(0)));
        assert!(!cast_to_bool(&[0x80]));
        assert!(!cast_to_bool(&[0x00, 0x00, 0x80]));
        assert!(cast_to_bool(&[0x80, 0x00]));
        assert!(cast_to_bool(&[0x00, 0x01, 0x00]));
        assert!(!cast_to_bool(&[]));
    }

    #[test]
    fn presets() {
        assert!(Flags::STANDARD.contains(Flags::MANDATORY));
        assert!(!Flags::MANDATORY.contains(Flags::CleanStack));
        assert_eq!(Flags::Taproot.bits(), 1 << 17);
        assert_eq!(Flags::DiscourageUpgradableAnnex.bits(), 1 << 21);
    }

    #[test]
    fn rules_identify_policy_failures() {
        assert_eq!(
            Error::Signature(signature::Error::SigHighS).rule(),
            Some(Flags::LowS)
        );
        assert_eq!(Error::NullFail.rule(), Some(Flags::NullFail));
        assert_eq!(Error::OpCount.rule(), None);
        assert_eq!(Error::Verify.rule(), None);
    }

    #[test]
    fn op_count_only_limits_legacy_scripts() {
        let mut legacy = State::initial(Stack::new(), ExecutionContext::new(SigVersion::Base));
        assert_eq!(legacy.increment_op_count(201), Ok(()));
        assert_eq!(legacy.increment_op_count(1), Err(Error::OpCount));

        let mut tapscript =
            State::initial(Stack::new(), ExecutionContext::new(SigVersion::Tapscript));
        for _ in 0..300 {
            assert_eq!(tapscript.increment_op_count(1), Ok(()));
        }
    }

    #[test]
    fn stack_indexing() {
        let mut stack = Stack::from(vec![1, 2, 3, 4]);
        assert_eq!(stack.rget(0), Ok(&4));
        assert_eq!(stack.rget(3), Ok(&1));
        assert_eq!(
            stack.rget(4),
            Err(Error::InvalidStackOperation(Some((4, 4))))
        );
        stack.move_to_top(2).expect("in range");
        assert_eq!(stack, Stack::from(vec![1, 3, 4, 2]));
        stack.rinsert(1, 9).expect("in range");
        assert_eq!(stack, Stack::from(vec![1, 3, 9, 4, 2]));
    }

    proptest! {
        #[test]
        fn numbers_are_true_iff_nonzero(n in -0x7fff_ffffi64..=0x7fff_ffff) {
            prop_assert_eq!(cast_to_bool(&num::serialize(n)), n != 0);
        }
    }
}
