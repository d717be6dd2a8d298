//! The transaction-backed [`SignatureChecker`].

use alloc::{collections::BTreeMap, vec::Vec};
use core::cell::RefCell;

use tracing::trace;

use crate::{
    external::pubkey::{verify_schnorr, PubKey},
    interpreter::{ExecutionContext, SigVersion, SignatureChecker},
    script, sighash, signature,
    tx::{self, Transaction},
};

/// What a memoized ECDSA check was keyed on: the script code, the digest algorithm, the public key
/// and the signature as it appeared on the stack.
type CacheKey = (Vec<u8>, SigVersion, Vec<u8>, Vec<u8>);

/// Checks signatures and lock times against one input of a transaction.
///
/// Identical ECDSA checks (as happen when a script repeats `OP_CHECKSIG` on the same values) are
/// only verified once.
pub struct TransactionSignatureChecker<'a> {
    tx: &'a Transaction,
    input_index: usize,
    amount: i64,
    precomputed: &'a sighash::PrecomputedTransactionData,
    cache: RefCell<BTreeMap<CacheKey, bool>>,
}

impl<'a> TransactionSignatureChecker<'a> {
    /// A checker for input `input_index` of `tx`, which spends an output worth `amount`.
    pub fn new(
        tx: &'a Transaction,
        input_index: usize,
        amount: i64,
        precomputed: &'a sighash::PrecomputedTransactionData,
    ) -> Self {
        TransactionSignatureChecker {
            tx,
            input_index,
            amount,
            precomputed,
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    fn ecdsa_sighash(
        &self,
        sig: &signature::Decoded,
        script_code: &script::Code,
        sig_version: SigVersion,
    ) -> Option<[u8; 32]> {
        match sig_version {
            SigVersion::Base => Some(sighash::legacy(
                self.tx,
                self.input_index,
                script_code,
                *sig.sighash_type(),
            )),
            SigVersion::WitnessV0 => sighash::segwit_v0(
                self.tx,
                self.precomputed,
                self.input_index,
                script_code,
                self.amount,
                *sig.sighash_type(),
            )
            .ok(),
            SigVersion::Taproot | SigVersion::Tapscript => None,
        }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn check_ecdsa_sig(
        &self,
        vch_sig: &[u8],
        sig: &signature::Decoded,
        vch_pub_key: &[u8],
        script_code: &script::Code,
        sig_version: SigVersion,
    ) -> bool {
        let pub_key = PubKey(vch_pub_key);
        if !pub_key.is_valid() {
            return false;
        }

        let key = (
            script_code.0.clone(),
            sig_version,
            vch_pub_key.to_vec(),
            vch_sig.to_vec(),
        );
        if let Some(result) = self.cache.borrow().get(&key) {
            trace!(result, "signature check cache hit");
            return *result;
        }

        let result = self
            .ecdsa_sighash(sig, script_code, sig_version)
            .is_some_and(|sighash| pub_key.verify(&sighash, sig.sig()));
        self.cache.borrow_mut().insert(key, result);
        result
    }

    fn check_schnorr_sig(
        &self,
        sig: &signature::Schnorr,
        pub_key: &[u8; 32],
        context: &ExecutionContext,
    ) -> Result<(), signature::Error> {
        let hash_type = *sig.sighash_type();
        let sighash =
            sighash::taproot(self.tx, self.precomputed, self.input_index, hash_type, context)
                .map_err(|e| {
                    trace!(error = %e, "no taproot signature hash");
                    signature::Error::SchnorrSigHashType(hash_type.raw())
                })?;
        if verify_schnorr(pub_key, &sighash, sig.sig()) {
            Ok(())
        } else {
            Err(signature::Error::SchnorrSig)
        }
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        let tx_lock_time = i64::from(self.tx.lock_time);

        // There are two kinds of lock times: block heights and timestamps, split at
        // `LOCKTIME_THRESHOLD`. Only like kinds can be compared.
        if (tx_lock_time < tx::LOCKTIME_THRESHOLD) != (lock_time < tx::LOCKTIME_THRESHOLD) {
            return false;
        }
        if lock_time > tx_lock_time {
            return false;
        }

        // A final input would let the transaction skip its lock time entirely, so the lock time
        // couldn’t be relied on.
        self.tx
            .inputs
            .get(self.input_index)
            .is_some_and(|input| !input.is_final())
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        let Some(input) = self.tx.inputs.get(self.input_index) else {
            return false;
        };
        let tx_sequence = i64::from(input.sequence);

        // Relative lock times are only defined for version 2 transactions and up. The version is
        // compared as unsigned, so negative versions qualify.
        if matches!(self.tx.version, 0 | 1) {
            return false;
        }

        // The input opted out of relative lock times.
        if tx_sequence & i64::from(tx::SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
            return false;
        }

        let mask = i64::from(tx::SEQUENCE_LOCKTIME_TYPE_FLAG | tx::SEQUENCE_LOCKTIME_MASK);
        let tx_masked = tx_sequence & mask;
        let masked = sequence & mask;
        let type_flag = i64::from(tx::SEQUENCE_LOCKTIME_TYPE_FLAG);

        // Heights and times, like for absolute lock times.
        if (tx_masked < type_flag) != (masked < type_flag) {
            return false;
        }
        masked <= tx_masked
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        interpreter::{ExecutionContext, SigVersion, SignatureChecker},
        pattern,
        script::Code,
        sighash::{self, PrecomputedTransactionData},
        signature::{self, EncodingRules, HashType, Validity},
        testing::{self, KEYPAIR, PUB_KEYS, SECRET_KEYS, SPENDING_TX, SPENT_AMOUNT},
        tx::{Transaction, TxOut},
    };

    use super::TransactionSignatureChecker;

    fn decoded(vch_sig: &[u8]) -> signature::Decoded {
        match signature::Decoded::from_bytes(
            vch_sig,
            EncodingRules {
                require_der: true,
                require_low_s: true,
                is_strict: true,
            },
        ) {
            Validity::Valid(sig) => sig,
            _ => panic!("signature should decode"),
        }
    }

    #[test]
    fn ecdsa_signatures() {
        let tx = SPENDING_TX.clone();
        let precomputed = PrecomputedTransactionData::new(&tx, None);
        let checker = TransactionSignatureChecker::new(&tx, 0, SPENT_AMOUNT, &precomputed);
        let script_code = Code(Code::serialize(&pattern::pay_to_pubkey_hash(&PUB_KEYS[0])));

        let legacy = testing::sign_ecdsa(
            &SECRET_KEYS[0],
            &sighash::legacy(&tx, 0, &script_code, HashType::ALL),
            HashType::ALL,
        );
        let sig = decoded(&legacy);
        assert!(checker.check_ecdsa_sig(&legacy, &sig, &PUB_KEYS[0], &script_code, SigVersion::Base));
        // Memoized results agree.
        assert!(checker.check_ecdsa_sig(&legacy, &sig, &PUB_KEYS[0], &script_code, SigVersion::Base));
        assert!(!checker.check_ecdsa_sig(&legacy, &sig, &PUB_KEYS[1], &script_code, SigVersion::Base));
        assert!(!checker.check_ecdsa_sig(
            &legacy,
            &sig,
            &PUB_KEYS[0],
            &script_code,
            SigVersion::WitnessV0
        ));
        assert!(!checker.check_ecdsa_sig(&legacy, &sig, &[0x02; 3], &script_code, SigVersion::Base));

        let segwit = testing::sign_ecdsa(
            &SECRET_KEYS[0],
            &sighash::segwit_v0(&tx, &precomputed, 0, &script_code, SPENT_AMOUNT, HashType::ALL)
                .expect("input exists"),
            HashType::ALL,
        );
        let sig = decoded(&segwit);
        assert!(checker.check_ecdsa_sig(
            &segwit,
            &sig,
            &PUB_KEYS[0],
            &script_code,
            SigVersion::WitnessV0
        ));
        // The amount is signed.
        let other_amount = TransactionSignatureChecker::new(&tx, 0, SPENT_AMOUNT + 1, &precomputed);
        assert!(!other_amount.check_ecdsa_sig(
            &segwit,
            &sig,
            &PUB_KEYS[0],
            &script_code,
            SigVersion::WitnessV0
        ));
    }

    #[test]
    fn schnorr_signatures() {
        let tx = SPENDING_TX.clone();
        let spent = [TxOut {
            value: SPENT_AMOUNT,
            script_pubkey: Code(Code::serialize(&pattern::pay_to_taproot(&[7; 32]))),
        }];
        let precomputed = PrecomputedTransactionData::new(&tx, Some(&spent));
        let checker = TransactionSignatureChecker::new(&tx, 0, SPENT_AMOUNT, &precomputed);
        let context = ExecutionContext::new(SigVersion::Taproot);

        for hash_type in [HashType::DEFAULT, HashType::ALL] {
            let sighash = sighash::taproot(&tx, &precomputed, 0, hash_type, &context)
                .expect("valid hash type");
            let vch_sig = testing::sign_schnorr(&KEYPAIR, &sighash, hash_type);
            let sig = signature::Schnorr::from_bytes(&vch_sig).expect("well formed");
            assert_eq!(
                checker.check_schnorr_sig(&sig, &testing::INTERNAL_KEY, &context),
                Ok(())
            );
            assert_eq!(
                checker.check_schnorr_sig(&sig, &[2; 32], &context),
                Err(signature::Error::SchnorrSig)
            );
        }

        // Without the spent outputs there is nothing to sign.
        let without_spent = PrecomputedTransactionData::new(&tx, None);
        let checker = TransactionSignatureChecker::new(&tx, 0, SPENT_AMOUNT, &without_spent);
        let sig = signature::Schnorr::from_bytes(&[1; 64]).expect("well formed");
        assert_eq!(
            checker.check_schnorr_sig(&sig, &testing::INTERNAL_KEY, &context),
            Err(signature::Error::SchnorrSigHashType(0))
        );
    }

    fn with_lock_time(lock_time: u32, sequence: u32, version: i32) -> Transaction {
        let mut tx = SPENDING_TX.clone();
        tx.lock_time = lock_time;
        tx.inputs[0].sequence = sequence;
        tx.version = version;
        tx
    }

    #[test]
    fn absolute_lock_times() {
        let check = |tx: &Transaction, lock_time| {
            let precomputed = PrecomputedTransactionData::new(tx, None);
            TransactionSignatureChecker::new(tx, 0, SPENT_AMOUNT, &precomputed)
                .check_lock_time(lock_time)
        };

        let height = with_lock_time(100, 0, 2);
        assert!(check(&height, 100));
        assert!(check(&height, 0));
        assert!(!check(&height, 101));
        assert!(!check(&height, 500_000_000));

        let time = with_lock_time(500_000_100, 0, 2);
        assert!(check(&time, 500_000_000));
        assert!(!check(&time, 100));

        // A final input disables the lock time.
        assert!(!check(&with_lock_time(100, 0xffff_ffff, 2), 100));
    }

    #[test]
    fn relative_lock_times() {
        let check = |tx: &Transaction, sequence| {
            let precomputed = PrecomputedTransactionData::new(tx, None);
            TransactionSignatureChecker::new(tx, 0, SPENT_AMOUNT, &precomputed)
                .check_sequence(sequence)
        };

        let blocks = with_lock_time(0, 10, 2);
        assert!(check(&blocks, 10));
        assert!(check(&blocks, 9));
        assert!(!check(&blocks, 11));
        assert!(!check(&blocks, (1 << 22) | 5));
        // Bits outside the mask are ignored.
        assert!(check(&blocks, (1 << 20) | 10));

        let time = with_lock_time(0, (1 << 22) | 10, 2);
        assert!(check(&time, (1 << 22) | 10));
        assert!(!check(&time, 10));

        assert!(!check(&with_lock_time(0, 10, 1), 10));
        assert!(check(&with_lock_time(0, 10, -1), 10));
        assert!(!check(&with_lock_time(0, (1 << 31) | 10, 2), 10));
    }
}
