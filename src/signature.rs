//! Signature handling.
//!
//! This is in a separate module so we can minimize the code that has access to the internals,
//! making it easier to ensure that we check the encoding correctly.

use alloc::{
    borrow::ToOwned,
    string::{String, ToString},
    vec::Vec,
};

use secp256k1::{ecdsa, schnorr};
use thiserror::Error;

use crate::external::pubkey::PubKey;

/// Things that can go wrong when constructing a `HashType` from bit flags.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum InvalidHashType {
    /// Either or both of the two least-significant bits must be set.
    #[error("invalid signed outputs")]
    InvalidSignedOutputs,
    /// Bits other than those specified for `HashType` must be 0. The `u8` includes only the bits
    /// that are undefined by `HashType`.
    #[error("extra bits set: {0:#04x}")]
    ExtraBitsSet(u8),
}

/// Any error that can happen during signature decoding.
#[allow(missing_docs)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum InvalidDerInteger {
    #[error("missing the 0x02 integer encoding byte")]
    NotAnInteger,
    #[error("the integer was expected to be {expected} bytes, but it was {actual} bytes")]
    IncorrectLength { actual: usize, expected: u8 },
    #[error("integers can’t be zero-length")]
    ZeroLength,
    #[error("leading 0x00 bytes are disallowed, unless it would otherwise be interpreted as a negative number.")]
    LeadingNullByte,
    #[error("integers can’t be negative")]
    Negative,
}

/// Errors that occur during decoding of a DER signature.
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum InvalidDerEncoding {
    #[error("didn’t start with 0x30, or was missing the length")]
    WrongType,
    #[error("the signature can’t be longer than 70 bytes")]
    TooLong,
    #[error("the signature was expected to be {expected} bytes, but it was {actual} bytes")]
    IncorrectLength { actual: usize, expected: u8 },
    #[error(
        "the {name} component {}failed: {error}",
        .value.clone().map_or("".to_owned(), |vec| format!("({vec:?}) "))
    )]
    InvalidComponent {
        name: &'static str,
        value: Option<Vec<u8>>,
        error: InvalidDerInteger,
    },
}

/// Errors that occur when parsing or checking signatures.
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    // BIP62
    #[error("signature hash type error: {0}")]
    SigHashType(InvalidHashType),

    #[error("signature DER encoding error: {0}")]
    SigDER(InvalidDerEncoding),

    #[error("signature s value is too high")]
    SigHighS,

    // BIP340/BIP341
    #[error("Schnorr signatures must be 64 or 65 bytes, not {0}")]
    SchnorrSigSize(usize),

    #[error("invalid Schnorr signature hash type: {0:#04x}")]
    SchnorrSigHashType(u8),

    #[error("invalid Schnorr signature")]
    SchnorrSig,
}

/// The ways in which an input may commit to the outputs of its transaction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SignedOutputs {
    /// The input signature commits to all outputs in the transaction.
    All,
    /// The input signature commits to the output at the same index as the input.
    Single,
    /// The input signature does not commit to any outputs.
    None,
}

/// A signature hash type, as the byte appended to a signature.
///
/// The raw byte is kept, because the legacy and segwit v0 digests commit to it unchanged, even
/// when it has undefined bits set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashType(u8);

impl HashType {
    /// `SIGHASH_DEFAULT`, only available to taproot signatures.
    pub const DEFAULT: Self = HashType(0x00);
    /// `SIGHASH_ALL`
    pub const ALL: Self = HashType(0x01);
    /// `SIGHASH_NONE`
    pub const NONE: Self = HashType(0x02);
    /// `SIGHASH_SINGLE`
    pub const SINGLE: Self = HashType(0x03);
    /// `SIGHASH_ANYONECANPAY`, which is combined with one of the others.
    pub const ANYONECANPAY: u8 = 0x80;

    /// Construct a `HashType` from bit flags.
    ///
    /// When `is_strict` is set, this fails unless the byte is one of the six defined values
    /// (BIP62 rule 5 hash type check).
    pub fn from_bits(bits: u8, is_strict: bool) -> Result<Self, InvalidHashType> {
        let unknown_bits = (bits | 0x83) ^ 0x83;
        if is_strict && unknown_bits != 0 {
            Err(InvalidHashType::ExtraBitsSet(unknown_bits))
        } else if is_strict && bits & 0x03 == 0 {
            Err(InvalidHashType::InvalidSignedOutputs)
        } else {
            Ok(HashType(bits))
        }
    }

    /// The raw hash type byte.
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// See [SignedOutputs].
    ///
    /// Only the low five bits are considered, and anything other than `NONE` or `SINGLE` is
    /// treated as `ALL`.
    pub fn signed_outputs(&self) -> SignedOutputs {
        match self.0 & 0x1f {
            2 => SignedOutputs::None,
            3 => SignedOutputs::Single,
            _ => SignedOutputs::All,
        }
    }

    /// Allows anyone to add inputs to this transaction.
    pub fn anyone_can_pay(&self) -> bool {
        self.0 & Self::ANYONECANPAY != 0
    }

    /// Whether this is one of the hash types BIP341 permits.
    pub fn is_valid_for_taproot(&self) -> bool {
        matches!(self.0, 0x00..=0x03 | 0x81..=0x83)
    }

    /// Render the hash type the way disassembly does, e.g. `ALL|ANYONECANPAY`.
    pub fn to_asm(&self, _attempt_sighash_decode: bool) -> String {
        let base = match self.signed_outputs() {
            SignedOutputs::All => "ALL",
            SignedOutputs::None => "NONE",
            SignedOutputs::Single => "SINGLE",
        };
        if self.anyone_can_pay() {
            base.to_string() + "|ANYONECANPAY"
        } else {
            base.to_string()
        }
    }
}

/// Different signature encoding failures may result in either aborting execution or continuing
/// execution with an invalid signature.
pub enum Validity {
    /// Fail execution with the given error.
    InvalidAbort(Error),
    /// Continue execution, without a valid signature.
    InvalidContinue,
    /// Continue execution with a valid signature.
    Valid(Decoded),
}

/// Which encoding rules to apply when decoding an ECDSA signature.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodingRules {
    /// BIP66 strict DER.
    pub require_der: bool,
    /// BIP62 rule 5, low S values.
    pub require_low_s: bool,
    /// Only defined hash types are accepted.
    pub is_strict: bool,
}

/// This contains a validated ECDSA signature and its hash type. It’s an opaque value, so we can
/// ensure all values are valid (e.g., signature is “low-S” if required, and the hash type was
/// created without any extra bits, if required).
#[derive(Clone, Debug)]
pub struct Decoded {
    sig: ecdsa::Signature,
    hash_type: HashType,
}

impl Decoded {
    /// Checks the properties of individual integers in a DER signature.
    fn is_valid_integer(int_bytes: &[u8]) -> Result<(), InvalidDerInteger> {
        match int_bytes {
            [] => Err(InvalidDerInteger::ZeroLength),
            // Null bytes at the start are not allowed, unless it would otherwise be interpreted as
            // a negative number.
            [0x00, next, ..] => {
                if next & 0x80 != 0 {
                    Ok(())
                } else {
                    Err(InvalidDerInteger::LeadingNullByte)
                }
            }
            // Negative numbers are not allowed.
            [first, ..] => {
                if first & 0x80 == 0 {
                    Ok(())
                } else {
                    Err(InvalidDerInteger::Negative)
                }
            }
        }
    }

    /// A canonical signature consists of: <30> <total len> <02> <len R> <R> <02> <len S> <S>
    ///
    /// Where R and S are not negative (their first byte has its highest bit not set), and not
    /// excessively padded (do not start with a 0 byte, unless an otherwise negative number follows,
    /// in which case a single 0 byte is necessary and even required).
    ///
    /// See https://bitcointalk.org/index.php?topic=8392.msg127623#msg127623
    ///
    /// This function is consensus-critical since BIP66.
    ///
    /// __NB__: This doesn’t rely on [ecdsa::Signature::from_der] because it is consensus critical,
    ///         so we need to ensure that these exact checks happen.
    pub(crate) fn is_valid_encoding(sig: &[u8]) -> Result<(), InvalidDerEncoding> {
        // implied checks:
        // - Minimum size constraint.
        // - Verify that the length of the signature matches the sum of the length of the elements.
        match sig {
            // A signature is of type 0x30 (compound).
            [0x30, total_len, content @ ..] => {
                // Maximum size constraint.
                if *total_len > 70 {
                    return Err(InvalidDerEncoding::TooLong);
                }
                // Make sure the length covers the entire signature.
                if usize::from(*total_len) != content.len() {
                    return Err(InvalidDerEncoding::IncorrectLength {
                        actual: content.len(),
                        expected: *total_len,
                    });
                }
                match content {
                    // Check whether the R element is an integer, and make sure the length of the S
                    // element is still inside the signature.
                    [0x02, r_len, r_s @ ..] => match r_s.split_at_checked((*r_len).into()) {
                        Some((r, [0x02, s_len, s @ ..])) => Self::is_valid_integer(r)
                            .map_err(|error| InvalidDerEncoding::InvalidComponent {
                                name: "r",
                                value: Some(r.to_vec()),
                                error,
                            })
                            .and_then(|()| {
                                if usize::from(*s_len) == s.len() {
                                    Self::is_valid_integer(s).map_err(|error| {
                                        InvalidDerEncoding::InvalidComponent {
                                            name: "s",
                                            value: Some(s.to_vec()),
                                            error,
                                        }
                                    })
                                } else {
                                    Err(InvalidDerEncoding::InvalidComponent {
                                        name: "s",
                                        value: Some(s.to_vec()),
                                        error: InvalidDerInteger::IncorrectLength {
                                            actual: s.len(),
                                            expected: *s_len,
                                        },
                                    })
                                }
                            }),
                        _ => Err(InvalidDerEncoding::InvalidComponent {
                            name: "s",
                            value: None,
                            error: InvalidDerInteger::NotAnInteger,
                        }),
                    },
                    _ => Err(InvalidDerEncoding::InvalidComponent {
                        name: "r",
                        value: None,
                        error: InvalidDerInteger::NotAnInteger,
                    }),
                }
            }
            _ => Err(InvalidDerEncoding::WrongType),
        }
    }

    /// This decodes an ECDSA signature and hash type from bytes, checking the encoding rules that
    /// are enabled.
    ///
    /// __NB__: An empty signature is not strictly DER encoded, but will result in
    ///         `InvalidContinue` as a compact way to provide an invalid signature for use with
    ///         CHECK(MULTI)SIG.
    pub fn from_bytes(vch_sig_in: &[u8], rules: EncodingRules) -> Validity {
        let Some((hash_type, vch_sig)) = vch_sig_in.split_last() else {
            return Validity::InvalidContinue;
        };

        if rules.require_der || rules.require_low_s || rules.is_strict {
            if let Err(e) = Self::is_valid_encoding(vch_sig) {
                return Validity::InvalidAbort(Error::SigDER(e));
            }
        }
        if rules.require_low_s
            && !ecdsa::Signature::from_der_lax(vch_sig).is_ok_and(|sig| PubKey::check_low_s(&sig))
        {
            return Validity::InvalidAbort(Error::SigHighS);
        }
        let hash_type = match HashType::from_bits(*hash_type, rules.is_strict) {
            Ok(ht) => ht,
            Err(e) => return Validity::InvalidAbort(Error::SigHashType(e)),
        };

        // Failures of lax parsing aren’t encoding errors, they just make the signature check fail.
        match ecdsa::Signature::from_der_lax(vch_sig) {
            Err(_) => Validity::InvalidContinue,
            Ok(mut sig) => {
                // libsecp256k1 only verifies lower-S signatures.
                sig.normalize_s();
                Validity::Valid(Decoded { sig, hash_type })
            }
        }
    }

    /// The ECDSA signature, normalized to low S.
    pub fn sig(&self) -> &ecdsa::Signature {
        &self.sig
    }

    /// The hash type used to inform signature validation.
    pub fn sighash_type(&self) -> &HashType {
        &self.hash_type
    }
}

/// Returns the hash type of a strictly-encoded DER signature with a defined hash type. This is
/// used to decorate disassembly.
pub(crate) fn strict_hash_type(vch_sig: &[u8]) -> Option<HashType> {
    vch_sig.split_last().and_then(|(hash_type, sig)| {
        Decoded::is_valid_encoding(sig)
            .ok()
            .and_then(|()| HashType::from_bits(*hash_type, true).ok())
    })
}

/// A BIP340 signature with its BIP341 hash type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schnorr {
    sig: schnorr::Signature,
    hash_type: HashType,
}

impl Schnorr {
    /// Decode a 64-byte (implicit `SIGHASH_DEFAULT`) or 65-byte signature.
    ///
    /// An explicit `0x00` hash type byte is rejected, since that signature would have a 64-byte
    /// encoding.
    pub fn from_bytes(vch_sig: &[u8]) -> Result<Self, Error> {
        let (sig, hash_type) = match vch_sig.len() {
            64 => (vch_sig, HashType::DEFAULT),
            65 => match vch_sig.split_last() {
                Some((&0x00, _)) => return Err(Error::SchnorrSigHashType(0x00)),
                Some((ht, sig)) => (sig, HashType(*ht)),
                None => return Err(Error::SchnorrSigSize(vch_sig.len())),
            },
            n => return Err(Error::SchnorrSigSize(n)),
        };
        schnorr::Signature::from_slice(sig)
            .map(|sig| Schnorr { sig, hash_type })
            .map_err(|_| Error::SchnorrSig)
    }

    /// The BIP340 signature.
    pub fn sig(&self) -> &schnorr::Signature {
        &self.sig
    }

    /// The hash type used to inform signature validation.
    pub fn sighash_type(&self) -> &HashType {
        &self.hash_type
    }
}
