//! The verification boundary: where script failures become `false`, and misuse becomes an error.

use alloc::vec::Vec;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    checker::TransactionSignatureChecker,
    interpreter::{self, Flags},
    opcode,
    script::{self, witness, Code},
    sighash::PrecomputedTransactionData,
    tx::{Transaction, TxOut},
    Opcode,
};

/// Mistakes in how verification was requested. These are bugs in the caller, not invalid
/// scripts, so they are never reported as a failed verification.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("input index {index} is out of range for a transaction with {inputs} inputs")]
    InputIndex { index: usize, inputs: usize },

    #[error("{actual} spent outputs were provided for a transaction with {expected} inputs")]
    SpentOutputCount { expected: usize, actual: usize },

    #[error("taproot spends need the outputs spent by every input")]
    MissingSpentOutputs,

    #[error("CLEANSTACK requires both P2SH and WITNESS")]
    CleanStackWithoutP2SHAndWitness,

    #[error("WITNESS requires P2SH")]
    WitnessWithoutP2SH,
}

/// The outputs an input verification can see.
#[derive(Clone, Copy, Debug)]
pub enum SpentOutputs<'a> {
    /// Only the output spent by the input being verified. Taproot spends can’t be verified with
    /// this, since their signatures commit to every spent output.
    One(&'a TxOut),
    /// The outputs spent by every input, in input order.
    All(&'a [TxOut]),
}

fn contract_violation(err: ContractError) -> ContractError {
    warn!(error = %err, "verification called incorrectly");
    err
}

/// Flags that only make sense together.
pub fn check_flags(flags: Flags) -> Result<(), ContractError> {
    if flags.contains(Flags::CleanStack) && !flags.contains(Flags::P2SH | Flags::Witness) {
        Err(contract_violation(
            ContractError::CleanStackWithoutP2SHAndWitness,
        ))
    } else if flags.contains(Flags::Witness) && !flags.contains(Flags::P2SH) {
        Err(contract_violation(ContractError::WitnessWithoutP2SH))
    } else {
        Ok(())
    }
}

/// Verify a script sig, script pubkey and witness against an arbitrary checker.
///
/// Any script failure is `Ok(false)`. The reason is logged at `debug` level.
pub fn verify_script(
    script_sig: &Code,
    script_pubkey: &Code,
    witness: &[Vec<u8>],
    flags: Flags,
    checker: &dyn interpreter::SignatureChecker,
) -> Result<bool, ContractError> {
    check_flags(flags)?;
    match script::iter::eval_script(script_sig, script_pubkey, witness, flags, checker) {
        Ok(true) => Ok(true),
        Ok(false) => {
            debug!("script evaluated to false");
            Ok(false)
        }
        Err((component, err)) => {
            debug!(?component, error = %err, rule = ?err.rule(), "script failed");
            Ok(false)
        }
    }
}

/// Verify input `input_index` of `tx`.
pub fn verify_input(
    tx: &Transaction,
    input_index: usize,
    spent_outputs: SpentOutputs<'_>,
    flags: Flags,
) -> Result<bool, ContractError> {
    let input = tx.inputs.get(input_index).ok_or_else(|| {
        contract_violation(ContractError::InputIndex {
            index: input_index,
            inputs: tx.inputs.len(),
        })
    })?;
    let (spent, all_spent) = match spent_outputs {
        SpentOutputs::One(spent) => (spent, None),
        SpentOutputs::All(all) => {
            if all.len() != tx.inputs.len() {
                return Err(contract_violation(ContractError::SpentOutputCount {
                    expected: tx.inputs.len(),
                    actual: all.len(),
                }));
            }
            (&all[input_index], Some(all))
        }
    };

    let is_taproot = matches!(
        spent.script_pubkey.witness_program(),
        Some((1, program)) if program.len() == witness::V1_TAPROOT_SIZE
    );
    if flags.contains(Flags::Taproot) && is_taproot && all_spent.is_none() {
        return Err(contract_violation(ContractError::MissingSpentOutputs));
    }

    let precomputed = PrecomputedTransactionData::new(tx, all_spent);
    let checker = TransactionSignatureChecker::new(tx, input_index, spent.value, &precomputed);
    verify_script(
        &input.script_sig,
        &spent.script_pubkey,
        &input.witness,
        flags,
        &checker,
    )
}

/// Signature operations in the witness, which count separately from the legacy ones.
pub fn witness_sig_op_count(
    script_sig: &Code,
    script_pubkey: &Code,
    witness: &[Vec<u8>],
    flags: Flags,
) -> u32 {
    if !flags.contains(Flags::Witness) {
        return 0;
    }

    let program_sig_ops = |version: u8, program: &[u8]| match (version, program.len()) {
        (0, witness::V0_KEYHASH_SIZE) => 1,
        (0, witness::V0_SCRIPTHASH_SIZE) => witness
            .last()
            .map_or(0, |witness_script| Code(witness_script.clone()).sig_op_count(true)),
        _ => 0,
    };

    if let Some((version, program)) = script_pubkey.witness_program() {
        return program_sig_ops(version, program);
    }

    if script::Evaluable::is_pay_to_script_hash(script_pubkey)
        && script::Evaluable::is_push_only(script_sig)
    {
        // The redeem script is the last push.
        let redeem = script_sig
            .parse()
            .filter_map(Result::ok)
            .last()
            .and_then(|op| match op {
                opcode::PossiblyBad::Good(Opcode::PushValue(pv)) => Some(Code(pv.value())),
                _ => None,
            });
        if let Some((version, program)) = redeem.as_ref().and_then(Code::witness_program) {
            return program_sig_ops(version, program);
        }
    }
    0
}

/// The total sigops of an input: the legacy count of both scripts, the P2SH redeem script and the
/// witness.
pub fn sig_op_count(
    script_sig: &Code,
    script_pubkey: &Code,
    witness: &[Vec<u8>],
    flags: Flags,
) -> u32 {
    let mut count = script_sig
        .sig_op_count(false)
        .saturating_add(script_pubkey.sig_op_count(false));
    if flags.contains(Flags::P2SH)
        && script::Evaluable::is_pay_to_script_hash(script_pubkey)
        && script::Evaluable::is_push_only(script_sig)
    {
        if let Some(opcode::PossiblyBad::Good(Opcode::PushValue(pv))) =
            script_sig.parse().filter_map(Result::ok).last()
        {
            count = count.saturating_add(Code(pv.value()).sig_op_count(true));
        }
    }
    count.saturating_add(witness_sig_op_count(script_sig, script_pubkey, witness, flags))
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::{
        interpreter::{ExecutionContext, Flags, NullSignatureChecker, SigVersion},
        op, pattern, pv,
        script::Code,
        sighash::{self, PrecomputedTransactionData},
        signature::HashType,
        taproot::{self, TaprootBuilder},
        test_vectors,
        testing::{self, KEYPAIR, PUB_KEYS, REDEEM_SCRIPT, SECRET_KEYS, SPENT_AMOUNT},
        tx::TxOut,
        Opcode,
    };

    use super::{
        check_flags, sig_op_count, verify_input, verify_script, witness_sig_op_count,
        ContractError, SpentOutputs,
    };

    fn push(data: &[u8]) -> Opcode {
        Opcode::from(pv::push_value(data).expect("short push"))
    }

    fn output(script_pubkey: &[Opcode]) -> TxOut {
        TxOut {
            value: SPENT_AMOUNT,
            script_pubkey: Code(Code::serialize(script_pubkey)),
        }
    }

    #[test]
    fn contract_violations_are_not_failures() {
        let tx = testing::spending_tx(Code::default(), vec![]);
        let spent = output(&[op::_1]);
        assert_eq!(
            verify_input(&tx, 1, SpentOutputs::One(&spent), Flags::STANDARD),
            Err(ContractError::InputIndex {
                index: 1,
                inputs: 1
            })
        );
        assert_eq!(
            verify_input(&tx, 0, SpentOutputs::All(&[]), Flags::STANDARD),
            Err(ContractError::SpentOutputCount {
                expected: 1,
                actual: 0
            })
        );
        assert_eq!(
            check_flags(Flags::CleanStack | Flags::P2SH),
            Err(ContractError::CleanStackWithoutP2SHAndWitness)
        );
        assert_eq!(
            check_flags(Flags::Witness),
            Err(ContractError::WitnessWithoutP2SH)
        );
        assert_eq!(check_flags(Flags::STANDARD), Ok(()));

        let p2tr = output(&pattern::pay_to_taproot(&testing::INTERNAL_KEY));
        assert_eq!(
            verify_input(&tx, 0, SpentOutputs::One(&p2tr), Flags::STANDARD),
            Err(ContractError::MissingSpentOutputs)
        );
        // Without taproot rules, a v1 program is just an unknown witness version.
        assert_eq!(
            verify_input(&tx, 0, SpentOutputs::One(&p2tr), Flags::P2SH | Flags::Witness),
            Ok(true)
        );
    }

    #[test]
    fn script_failures_are_false() {
        let checker = NullSignatureChecker();
        assert_eq!(
            verify_script(
                &Code::default(),
                &Code(Code::serialize(&[op::RETURN])),
                &[],
                Flags::STANDARD,
                &checker
            ),
            Ok(false)
        );
        assert_eq!(
            verify_script(&Code::default(), &Code::default(), &[], Flags::STANDARD, &checker),
            Ok(false)
        );
    }

    #[test]
    fn pay_to_pubkey_hash() {
        let script_pubkey = pattern::pay_to_pubkey_hash(&PUB_KEYS[0]);
        let spent = output(&script_pubkey);
        let unsigned = testing::spending_tx(Code::default(), vec![]);
        let sighash = sighash::legacy(&unsigned, 0, &spent.script_pubkey, HashType::ALL);
        let sig = testing::sign_ecdsa(&SECRET_KEYS[0], &sighash, HashType::ALL);

        let tx = testing::spending_tx(
            Code(Code::serialize(&[push(&sig), push(&PUB_KEYS[0])])),
            vec![],
        );
        assert_eq!(verify_input(&tx, 0, SpentOutputs::One(&spent), Flags::STANDARD), Ok(true));

        // Someone else’s key hashes differently.
        let wrong_key = testing::spending_tx(
            Code(Code::serialize(&[push(&sig), push(&PUB_KEYS[1])])),
            vec![],
        );
        assert_eq!(
            verify_input(&wrong_key, 0, SpentOutputs::One(&spent), Flags::STANDARD),
            Ok(false)
        );
    }

    #[test]
    fn multisig_signatures_must_follow_key_order() {
        let redeem = Code::serialize(&REDEEM_SCRIPT.0);
        let spent = output(&pattern::pay_to_script_hash(&redeem));
        let unsigned = testing::spending_tx(Code::default(), vec![]);
        let sighash = sighash::legacy(&unsigned, 0, &Code(redeem.clone()), HashType::ALL);
        let sigs: Vec<_> = SECRET_KEYS[..2]
            .iter()
            .map(|sk| testing::sign_ecdsa(sk, &sighash, HashType::ALL))
            .collect();

        let spend = |first: &[u8], second: &[u8]| {
            testing::spending_tx(
                Code(Code::serialize(&[op::_0, push(first), push(second), push(&redeem)])),
                vec![],
            )
        };
        assert_eq!(
            verify_input(&spend(&sigs[0], &sigs[1]), 0, SpentOutputs::One(&spent), Flags::STANDARD),
            Ok(true)
        );
        assert_eq!(
            verify_input(&spend(&sigs[1], &sigs[0]), 0, SpentOutputs::One(&spent), Flags::STANDARD),
            Ok(false)
        );
    }

    #[test]
    fn single_without_output_signs_the_sentinel() {
        let script_pubkey = pattern::pay_to_pubkey(&PUB_KEYS[0]);
        let spent = output(&script_pubkey);
        let mut tx = testing::spending_tx(Code::default(), vec![]);
        tx.inputs.push(tx.inputs[0].clone());
        tx.inputs[1].prevout.vout = 1;

        let sig = testing::sign_ecdsa(
            &SECRET_KEYS[0],
            &sighash::SINGLE_WITHOUT_OUTPUT,
            HashType::SINGLE,
        );
        tx.inputs[1].script_sig = Code(Code::serialize(&[push(&sig)]));
        assert_eq!(
            verify_input(&tx, 1, SpentOutputs::One(&spent), Flags::STANDARD),
            Ok(true)
        );
    }

    #[test]
    fn wallet_signed_legacy_hash_types() {
        let spent = test_vectors::decode_tx_outs(test_vectors::LEGACY_SIGNED_SPENT);
        let flags = Flags::P2SH | Flags::StrictEnc | Flags::DERSig | Flags::LowS;
        for (raw, tx_hex) in test_vectors::LEGACY_SIGNED {
            let tx = test_vectors::decode_tx(tx_hex);
            for index in 0..tx.inputs.len() {
                assert_eq!(
                    verify_input(&tx, index, SpentOutputs::All(&spent), flags),
                    Ok(true),
                    "hash type {raw:#04x}, input {index}"
                );
            }
        }

        let (_, all) = test_vectors::LEGACY_SIGNED[0];
        let mut tx = test_vectors::decode_tx(all);
        tx.outputs[2].value -= 1;
        assert_eq!(
            verify_input(&tx, 0, SpentOutputs::All(&spent), flags),
            Ok(false)
        );

        // Outputs aren’t signed with `SIGHASH_NONE`.
        let (_, none) = test_vectors::LEGACY_SIGNED[2];
        let mut tx = test_vectors::decode_tx(none);
        tx.outputs[2].value -= 1;
        assert_eq!(
            verify_input(&tx, 0, SpentOutputs::All(&spent), flags),
            Ok(true)
        );
    }

    #[test]
    fn pay_to_witness_pubkey_hash() {
        let spent = output(&pattern::pay_to_witness_pubkey_hash(&PUB_KEYS[0]));
        let unsigned = testing::spending_tx(Code::default(), vec![]);
        let script_code = Code(Code::serialize(&pattern::pay_to_pubkey_hash(&PUB_KEYS[0])));
        let sighash = sighash::segwit_v0(
            &unsigned,
            &PrecomputedTransactionData::new(&unsigned, None),
            0,
            &script_code,
            SPENT_AMOUNT,
            HashType::ALL,
        )
        .expect("input exists");
        let sig = testing::sign_ecdsa(&SECRET_KEYS[0], &sighash, HashType::ALL);

        let tx = testing::spending_tx(Code::default(), vec![sig.clone(), PUB_KEYS[0].clone()]);
        assert_eq!(verify_input(&tx, 0, SpentOutputs::One(&spent), Flags::STANDARD), Ok(true));

        // The amount is part of what was signed.
        let mut other_amount = spent.clone();
        other_amount.value += 1;
        assert_eq!(
            verify_input(&tx, 0, SpentOutputs::One(&other_amount), Flags::STANDARD),
            Ok(false)
        );

        let extra_item = testing::spending_tx(
            Code::default(),
            vec![vec![], sig, PUB_KEYS[0].clone()],
        );
        assert_eq!(
            verify_input(&extra_item, 0, SpentOutputs::One(&spent), Flags::STANDARD),
            Ok(false)
        );
    }

    #[test]
    fn taproot_key_and_script_paths() {
        // Key path, with no script tree.
        let spend_info = TaprootBuilder::new()
            .finalize(&testing::INTERNAL_KEY)
            .expect("empty tree");
        let tweaked = KEYPAIR
            .add_xonly_tweak(
                &secp256k1::Secp256k1::new(),
                &secp256k1::Scalar::from_be_bytes(taproot::tap_tweak_hash(
                    &testing::INTERNAL_KEY,
                    None,
                ))
                .expect("tweak is in range"),
            )
            .expect("valid tweak");
        let spent = [output(&pattern::pay_to_taproot(&spend_info.output_key))];
        let unsigned = testing::spending_tx(Code::default(), vec![]);
        let precomputed = PrecomputedTransactionData::new(&unsigned, Some(&spent));
        let sighash = sighash::taproot(
            &unsigned,
            &precomputed,
            0,
            HashType::DEFAULT,
            &ExecutionContext::new(SigVersion::Taproot),
        )
        .expect("valid hash type");
        let sig = testing::sign_schnorr(&tweaked, &sighash, HashType::DEFAULT);
        let tx = testing::spending_tx(Code::default(), vec![sig.clone()]);
        assert_eq!(verify_input(&tx, 0, SpentOutputs::All(&spent), Flags::STANDARD), Ok(true));

        // An annex changes the signed message.
        let with_annex = testing::spending_tx(Code::default(), vec![sig, vec![0x50]]);
        assert_eq!(
            verify_input(
                &with_annex,
                0,
                SpentOutputs::All(&spent),
                Flags::MANDATORY
            ),
            Ok(false)
        );

        // Script path, a single `<key> OP_CHECKSIG` leaf.
        let leaf = Code::serialize(&pattern::check_sig(&*testing::INTERNAL_KEY, false));
        let spend_info = TaprootBuilder::new()
            .add_leaf(0, taproot::TAPSCRIPT_LEAF_VERSION, leaf.clone())
            .and_then(|b| b.finalize(&testing::INTERNAL_KEY))
            .expect("valid tree");
        let control = spend_info
            .control_block(taproot::TAPSCRIPT_LEAF_VERSION, &leaf)
            .expect("leaf is in the tree");
        let spent = [output(&pattern::pay_to_taproot(&spend_info.output_key))];
        let precomputed = PrecomputedTransactionData::new(&unsigned, Some(&spent));
        let mut context = ExecutionContext::new(SigVersion::Tapscript);
        context.tapleaf_hash = Some(taproot::tap_leaf_hash(
            taproot::TAPSCRIPT_LEAF_VERSION,
            &leaf,
        ));
        let sighash = sighash::taproot(&unsigned, &precomputed, 0, HashType::ALL, &context)
            .expect("valid hash type");
        let sig = testing::sign_schnorr(&KEYPAIR, &sighash, HashType::ALL);
        let tx = testing::spending_tx(
            Code::default(),
            vec![sig, leaf.clone(), control.serialize()],
        );
        assert_eq!(verify_input(&tx, 0, SpentOutputs::All(&spent), Flags::STANDARD), Ok(true));

        let tx = testing::spending_tx(
            Code::default(),
            vec![vec![], leaf, control.serialize()],
        );
        assert_eq!(verify_input(&tx, 0, SpentOutputs::All(&spent), Flags::STANDARD), Ok(false));
    }

    #[test]
    fn witness_sig_ops() {
        let witness_script = Code::serialize(&REDEEM_SCRIPT.0);
        let p2wsh = Code(Code::serialize(&pattern::pay_to_witness_script_hash(&witness_script)));
        let witness = vec![vec![], witness_script.clone()];
        assert_eq!(
            witness_sig_op_count(&Code::default(), &p2wsh, &witness, Flags::STANDARD),
            3
        );
        assert_eq!(
            witness_sig_op_count(&Code::default(), &p2wsh, &witness, Flags::P2SH),
            0
        );

        let p2wpkh = Code::serialize(&pattern::pay_to_witness_pubkey_hash(&PUB_KEYS[0]));
        let nested = Code(Code::serialize(&pattern::pay_to_script_hash(&p2wpkh)));
        let script_sig = Code(Code::serialize(&[push(&p2wpkh)]));
        assert_eq!(
            witness_sig_op_count(&script_sig, &nested, &[], Flags::STANDARD),
            1
        );
        assert_eq!(
            sig_op_count(&script_sig, &nested, &[], Flags::STANDARD),
            1
        );

        let p2sh = Code(Code::serialize(&pattern::pay_to_script_hash(&witness_script)));
        let script_sig = Code(Code::serialize(&[op::_0, push(&witness_script)]));
        assert_eq!(sig_op_count(&script_sig, &p2sh, &[], Flags::STANDARD), 3);
    }
}
