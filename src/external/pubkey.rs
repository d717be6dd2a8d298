use secp256k1::{ecdsa, schnorr, Message, PublicKey, Secp256k1, XOnlyPublicKey};

/// An encoded secp256k1 public key, as it appears on the stack.
pub struct PubKey<'a>(pub &'a [u8]);

impl PubKey<'_> {
    pub const SIZE: usize = 65;
    pub const COMPRESSED_SIZE: usize = 33;

    /// The length implied by the leading byte, with hybrid keys (0x06, 0x07) counted as
    /// uncompressed.
    fn implied_len(&self) -> Option<usize> {
        match self.0.first() {
            Some(0x02 | 0x03) => Some(Self::COMPRESSED_SIZE),
            Some(0x04 | 0x06 | 0x07) => Some(Self::SIZE),
            _ => None,
        }
    }

    /// Check syntactic correctness.
    ///
    /// Note that this is consensus critical as `check_sig` calls it!
    pub fn is_valid(&self) -> bool {
        self.implied_len() == Some(self.0.len())
    }

    /// The encodings allowed under `StrictEnc`.
    pub fn is_compressed_or_uncompressed(&self) -> bool {
        match self.0.first() {
            Some(0x02 | 0x03) => self.0.len() == Self::COMPRESSED_SIZE,
            Some(0x04) => self.0.len() == Self::SIZE,
            _ => false,
        }
    }

    /// Only compressed keys are allowed in segwit v0 under `WitnessPubKeyType`.
    pub fn is_compressed(&self) -> bool {
        matches!(self.0.first(), Some(0x02 | 0x03)) && self.0.len() == Self::COMPRESSED_SIZE
    }

    /// Verify a DER signature (~72 bytes).
    /// If this public key is not fully valid, the return value will be false.
    pub fn verify(&self, hash: &[u8; 32], sig: &ecdsa::Signature) -> bool {
        if !self.is_valid() {
            return false;
        };

        if let Ok(pubkey) = PublicKey::from_slice(self.0) {
            let secp = Secp256k1::verification_only();
            secp.verify_ecdsa(&Message::from_digest(*hash), sig, &pubkey)
                .is_ok()
        } else {
            false
        }
    }

    pub fn check_low_s(sig: &ecdsa::Signature) -> bool {
        let mut check = *sig;
        check.normalize_s();
        *sig == check
    }
}

/// Verify a BIP340 signature against a 32-byte x-only key.
pub fn verify_schnorr(key: &[u8; 32], hash: &[u8; 32], sig: &schnorr::Signature) -> bool {
    XOnlyPublicKey::from_slice(key).is_ok_and(|pubkey| {
        Secp256k1::verification_only()
            .verify_schnorr(sig, &Message::from_digest(*hash), &pubkey)
            .is_ok()
    })
}
