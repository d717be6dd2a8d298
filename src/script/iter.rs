//! Much of the code is common between the script components, so this provides operations on
//! iterators that can be shared.

use alloc::vec::Vec;

use tracing::trace;

use crate::{
    interpreter::{self, ExecutionContext, SigVersion},
    opcode,
    script::{self, witness, Evaluable},
};

fn is_truthy(stack: &interpreter::Stack<Vec<u8>>) -> bool {
    stack.last().is_ok_and(|v| interpreter::cast_to_bool(v))
}

/// Evaluate an entire script: the script sig, then the script pubkey, then either the redeem
/// script or the witness program, if there is one.
pub fn eval_script<T: script::Evaluable, U: script::Evaluable>(
    sig: &T,
    pub_key: &U,
    witness: &[Vec<u8>],
    flags: interpreter::Flags,
    checker: &dyn interpreter::SignatureChecker,
) -> Result<bool, (script::ComponentType, script::Error)> {
    use script::ComponentType::*;

    if flags.contains(interpreter::Flags::SigPushOnly) && !sig.is_push_only() {
        return Err((Sig, script::Error::SigPushOnly));
    }

    trace!(len = sig.byte_len(), "evaluating script sig");
    let data_stack = sig
        .eval(
            flags,
            checker,
            interpreter::Stack::new(),
            ExecutionContext::new(SigVersion::Base),
        )
        .map_err(|e| (Sig, e))?;
    trace!(len = pub_key.byte_len(), "evaluating script pubkey");
    let mut result_stack = pub_key
        .eval(
            flags,
            checker,
            data_stack.clone(),
            ExecutionContext::new(SigVersion::Base),
        )
        .map_err(|e| (PubKey, e))?;
    if !is_truthy(&result_stack) {
        return Ok(false);
    }

    let mut had_witness = false;
    let pub_key_bytes = script::Code(pub_key.to_bytes());
    if flags.contains(interpreter::Flags::Witness) {
        if let Some((version, program)) = pub_key_bytes.witness_program() {
            had_witness = true;
            if 0 < sig.byte_len() {
                return Err((Sig, script::Error::WitnessMalleated));
            }
            if !witness::verify_program(witness, version, program, flags, checker, false)
                .map_err(|e| (Witness, e))?
            {
                return Ok(false);
            }
            // The stack isn’t clean after a witness program, but that doesn’t matter.
            result_stack.truncate(1);
        }
    }

    if flags.contains(interpreter::Flags::P2SH) && pub_key.is_pay_to_script_hash() {
        // script_sig must be literals-only or validation fails
        if !sig.is_push_only() {
            return Err((Sig, script::Error::SigPushOnly));
        }
        let (redeem_bytes, remaining_stack) = data_stack
            .split_last()
            .map_err(|_| (Redeem, script::Error::MissingRedeemScript))?;
        let redeem = script::Code(redeem_bytes.clone());
        trace!(len = redeem.0.len(), "evaluating redeem script");
        result_stack = redeem
            .eval(
                flags,
                checker,
                remaining_stack,
                ExecutionContext::new(SigVersion::Base),
            )
            .map_err(|e| (Redeem, e))?;
        if !is_truthy(&result_stack) {
            return Ok(false);
        }

        if flags.contains(interpreter::Flags::Witness) {
            if let Some((version, program)) = redeem.witness_program() {
                had_witness = true;
                if sig.to_bytes() != script::push_encoding(&redeem.0) {
                    return Err((Sig, script::Error::WitnessMalleatedP2SH));
                }
                if !witness::verify_program(witness, version, program, flags, checker, true)
                    .map_err(|e| (Witness, e))?
                {
                    return Ok(false);
                }
                result_stack.truncate(1);
            }
        }
    }

    // The CLEANSTACK check is only performed after potential P2SH evaluation, as the non-P2SH
    // evaluation of a P2SH script will obviously not result in a clean stack (the P2SH inputs
    // remain).
    if flags.contains(interpreter::Flags::CleanStack) && result_stack.len() != 1 {
        return Err((Redeem, script::Error::CleanStack));
    }

    if flags.contains(interpreter::Flags::Witness) && !had_witness && !witness.is_empty() {
        return Err((Witness, script::Error::WitnessUnexpected));
    }

    Ok(true)
}

/// Run each opcode in turn, tracking where in the script execution is so that signature checks
/// can find their script code.
pub fn eval<T: Into<opcode::PossiblyBad> + opcode::Evaluable + Clone>(
    mut iter: impl Iterator<Item = Result<T, script::Error>>,
    flags: interpreter::Flags,
    script_code: &script::Code,
    stack: interpreter::Stack<Vec<u8>>,
    context: ExecutionContext,
    checker: &dyn interpreter::SignatureChecker,
) -> Result<interpreter::Stack<Vec<u8>>, script::Error> {
    iter.try_fold(
        (interpreter::State::initial(stack, context), 0u32),
        |(mut state, index), elem| {
            elem.and_then(|op| {
                state.opcode_pos = index;
                state.pc += op.byte_len();
                op.eval(flags, script_code, checker, state)
                    .map(|state| (state, index.saturating_add(1)))
                    .map_err(|e| script::Error::Interpreter(Some(op.clone().into()), e))
            })
        },
    )
    .and_then(|(final_state, _)| match final_state.vexec.len() {
        0 => Ok(final_state.stack),
        n => Err(script::Error::UnclosedConditional(n)),
    })
}

/// Pre-version-0.6, Bitcoin always counted CHECKMULTISIGs as 20 sigops. With pay-to-script-hash,
/// that changed: CHECKMULTISIGs serialized in script_sigs are counted more accurately, assuming
/// they are of the form ... OP_N CHECKMULTISIG ...
///
/// Counting stops at the first truncated push.
pub fn sig_op_count<T: Into<opcode::PossiblyBad> + opcode::Evaluable>(
    iter: impl Iterator<Item = Result<T, opcode::Error>>,
    accurate: bool,
) -> u32 {
    let mut last_opcode = None;
    let mut count = 0u32;
    for res in iter {
        match res {
            Ok(op) => {
                count = count.saturating_add(
                    op.sig_op_count(if accurate { last_opcode.take() } else { None }),
                );
                last_opcode = Some(op.into());
            }
            Err(opcode::Error::Read { .. }) => break,
            Err(_) => last_opcode = None,
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use crate::{
        interpreter::{Flags, NullSignatureChecker},
        op, opcode, pattern, pv,
        script::{self, Code, ComponentType},
        Opcode,
    };

    fn raw(sig: &[Opcode], pub_key: &[Opcode]) -> script::Raw {
        script::Raw::from_raw_parts(Code::serialize(sig), Code::serialize(pub_key))
    }

    #[test]
    fn empty_scripts_never_validate() {
        assert_eq!(raw(&[], &[]).eval(Flags::STANDARD, &NullSignatureChecker()), Ok(false));
        assert_eq!(
            raw(&[op::_1], &[]).eval(Flags::empty(), &NullSignatureChecker()),
            Ok(true)
        );
        assert_eq!(
            raw(&[op::_0], &[]).eval(Flags::empty(), &NullSignatureChecker()),
            Ok(false)
        );
    }

    #[test]
    fn sig_and_pub_key_do_not_share_conditionals() {
        assert_eq!(
            raw(&[op::_1, op::IF], &[op::_1, op::ENDIF]).eval(Flags::empty(), &NullSignatureChecker()),
            Err((ComponentType::Sig, script::Error::UnclosedConditional(1)))
        );
    }

    #[test]
    fn p2sh_redeem_script() {
        let redeem = Code::serialize(&[op::_2, op::EQUAL]);
        let p2sh = pattern::pay_to_script_hash(&redeem);
        let push_redeem = Opcode::from(pv::push_value(&redeem).expect("short script"));

        assert_eq!(
            raw(&[op::_2, push_redeem.clone()], &p2sh).eval(Flags::P2SH, &NullSignatureChecker()),
            Ok(true)
        );
        assert_eq!(
            raw(&[op::_3, push_redeem.clone()], &p2sh).eval(Flags::P2SH, &NullSignatureChecker()),
            Ok(false)
        );
        // Without the flag, only the hash is checked.
        assert_eq!(
            raw(&[op::_3, push_redeem.clone()], &p2sh)
                .eval(Flags::empty(), &NullSignatureChecker()),
            Ok(true)
        );
        assert_eq!(
            raw(&[op::_2, op::DUP, op::DROP, push_redeem], &p2sh)
                .eval(Flags::P2SH, &NullSignatureChecker()),
            Err((ComponentType::Sig, script::Error::SigPushOnly))
        );
    }

    #[test]
    fn clean_stack() {
        assert_eq!(
            raw(&[op::_1, op::_1], &[]).eval(Flags::P2SH | Flags::CleanStack, &NullSignatureChecker()),
            Err((ComponentType::Redeem, script::Error::CleanStack))
        );
        assert_eq!(
            raw(&[op::_1, op::_1], &[op::DROP])
                .eval(Flags::P2SH | Flags::CleanStack, &NullSignatureChecker()),
            Ok(true)
        );
    }

    #[test]
    fn witness_spends() {
        let witness_script = Code::serialize(&[op::_1]);
        let p2wsh = Code::serialize(&pattern::pay_to_witness_script_hash(&witness_script));

        let native = script::Raw::from_raw_parts(vec![], p2wsh.clone())
            .with_witness(vec![witness_script.clone()]);
        assert_eq!(native.eval(Flags::STANDARD, &NullSignatureChecker()), Ok(true));

        let malleated = script::Raw::from_raw_parts(Code::serialize(&[op::_1]), p2wsh.clone())
            .with_witness(vec![witness_script.clone()]);
        assert_eq!(
            malleated.eval(Flags::STANDARD, &NullSignatureChecker()),
            Err((ComponentType::Sig, script::Error::WitnessMalleated))
        );

        let nested = script::Raw::from_raw_parts(
            Code::serialize(&[Opcode::from(pv::push_value(&p2wsh).expect("short script"))]),
            Code::serialize(&pattern::pay_to_script_hash(&p2wsh)),
        )
        .with_witness(vec![witness_script.clone()]);
        assert_eq!(nested.eval(Flags::STANDARD, &NullSignatureChecker()), Ok(true));

        let nested_non_canonical = script::Raw::from_raw_parts(
            [&[0x4c, 0x22][..], &p2wsh].concat(),
            Code::serialize(&pattern::pay_to_script_hash(&p2wsh)),
        )
        .with_witness(vec![witness_script.clone()]);
        assert_eq!(
            nested_non_canonical.eval(Flags::MANDATORY, &NullSignatureChecker()),
            Err((ComponentType::Sig, script::Error::WitnessMalleatedP2SH))
        );

        let unexpected = raw(&[op::_1], &[]).with_witness(vec![vec![]]);
        assert_eq!(
            unexpected.eval(Flags::STANDARD, &NullSignatureChecker()),
            Err((ComponentType::Witness, script::Error::WitnessUnexpected))
        );
        assert_eq!(
            unexpected.eval(Flags::P2SH, &NullSignatureChecker()),
            Ok(true)
        );
    }

    #[test]
    fn sig_op_counting() {
        let pk = [2; 33];
        let multisig = pattern::check_multisig(1, &[&pk, &pk, &pk], false);
        let code = Code(Code::serialize(&multisig));
        assert_eq!(code.sig_op_count(true), 3);
        assert_eq!(code.sig_op_count(false), 20);
        assert_eq!(
            Code(Code::serialize(&[op::CHECKSIG, op::CHECKSIGVERIFY, op::CHECKMULTISIG]))
                .sig_op_count(true),
            22
        );
        // Counting stops at a truncated push.
        let truncated = [&Code::serialize(&[op::CHECKSIG])[..], &[0x4c]].concat();
        assert_eq!(
            Code([truncated, Code::serialize(&[op::CHECKSIG])].concat()).sig_op_count(true),
            1
        );
        assert_eq!(
            super::sig_op_count(
                [Ok(opcode::PossiblyBad::from(op::CHECKSIG))].into_iter(),
                true
            ),
            1
        );
    }
}
