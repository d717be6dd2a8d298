//! Witness programs: segwit v0 ([BIP141](https://github.com/bitcoin/bips/blob/master/bip-0141.mediawiki))
//! and taproot ([BIP341](https://github.com/bitcoin/bips/blob/master/bip-0341.mediawiki),
//! [BIP342](https://github.com/bitcoin/bips/blob/master/bip-0342.mediawiki)).

use alloc::vec::Vec;

use sha2::{Digest, Sha256};
use tracing::trace;

use super::{Code, Error, Evaluable};
use crate::{
    interpreter::{self, ExecutionContext, SigVersion, Stack},
    opcode::{self, push_value::LargeValue},
    pattern, signature, taproot, tx,
};

/// The program size of P2WPKH.
pub const V0_KEYHASH_SIZE: usize = 20;

/// The program size of P2WSH.
pub const V0_SCRIPTHASH_SIZE: usize = 32;

/// The program size of P2TR.
pub const V1_TAPROOT_SIZE: usize = 32;

/// The program of a pay-to-anchor output, which anyone can spend.
pub(crate) const ANCHOR_PROGRAM: [u8; 2] = [0x4e, 0x73];

/// A script that is a version opcode (`OP_0`, `OP_1`‥`OP_16`) followed by a single direct push of
/// 2 to 40 bytes is a witness program.
pub fn program(script: &[u8]) -> Option<(u8, &[u8])> {
    match script {
        [version, len, program @ ..]
            if (4..=42).contains(&script.len()) && usize::from(*len) == program.len() =>
        {
            match version {
                0x00 => Some((0, program)),
                0x51..=0x60 => Some((version - 0x50, program)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Opcodes that make a tapscript succeed without executing it.
pub fn is_op_success(b: u8) -> bool {
    matches!(
        b,
        80 | 98 | 126..=129 | 131..=134 | 137..=138 | 141..=142 | 149..=153 | 187..=254
    )
}

/// Run a witness script or tapscript against its witness stack. The stack has to end with
/// exactly one element, which decides the result.
fn execute(
    stack: Vec<Vec<u8>>,
    script: &Code,
    flags: interpreter::Flags,
    checker: &dyn interpreter::SignatureChecker,
    context: ExecutionContext,
) -> Result<bool, Error> {
    if context.sig_version == SigVersion::Tapscript {
        // OP_SUCCESSx take priority over everything else, including the element size limits.
        let mut rest = &script.0[..];
        while let Some(&leading_byte) = rest.first() {
            if is_op_success(leading_byte) {
                return if flags.contains(interpreter::Flags::DiscourageOpSuccess) {
                    Err(Error::DiscourageOpSuccess)
                } else {
                    Ok(true)
                };
            }
            let (res, rem) = opcode::PossiblyBad::parse(rest);
            if let Err(err @ opcode::Error::Read { .. }) = res {
                return Err(Error::Opcode(err));
            }
            rest = rem;
        }
        if interpreter::MAX_STACK_DEPTH < stack.len() {
            return Err(Error::Interpreter(None, interpreter::Error::StackSize(None)));
        }
    }
    if let Some(item) = stack.iter().find(|item| LargeValue::MAX_SIZE < item.len()) {
        return Err(Error::Opcode(opcode::Error::PushSize(Some(item.len()))));
    }

    let final_stack = script.eval(flags, checker, Stack::from(stack), context)?;
    match final_stack.len() {
        1 => Ok(final_stack
            .last()
            .is_ok_and(|v| interpreter::cast_to_bool(v))),
        _ => Err(Error::WitnessCleanStack),
    }
}

/// Key path and script path spends of a taproot output.
fn verify_taproot(
    witness: &[Vec<u8>],
    program: &[u8; 32],
    flags: interpreter::Flags,
    checker: &dyn interpreter::SignatureChecker,
) -> Result<bool, Error> {
    let (last, rest) = witness
        .split_last()
        .ok_or(Error::WitnessProgramWitnessEmpty)?;
    let mut context = ExecutionContext::new(SigVersion::Taproot);
    let stack = match last.first() {
        Some(&taproot::ANNEX_TAG) if !rest.is_empty() => {
            if flags.contains(interpreter::Flags::DiscourageUpgradableAnnex) {
                return Err(Error::DiscourageUpgradableAnnex);
            }
            let mut annex = Vec::with_capacity(last.len() + 3);
            tx::write_bytes(&mut annex, last);
            context.annex_hash = Some(Sha256::digest(annex).into());
            rest
        }
        _ => witness,
    };

    match stack {
        [] => Err(Error::WitnessProgramWitnessEmpty),
        [sig] => {
            trace!("taproot key path spend");
            signature::Schnorr::from_bytes(sig)
                .and_then(|sig| checker.check_schnorr_sig(&sig, program, &context))
                .map_err(|e| Error::Interpreter(None, interpreter::Error::Signature(e)))
                .map(|()| true)
        }
        [items @ .., script, control] => {
            let control = taproot::ControlBlock::parse(control)
                .map_err(|_| Error::TaprootWrongControlSize(control.len()))?;
            let leaf_hash = taproot::tap_leaf_hash(control.leaf_version, script);
            if !taproot::verify_commitment(&control, program, leaf_hash) {
                return Err(Error::WitnessProgramMismatch);
            }
            if control.leaf_version == taproot::TAPSCRIPT_LEAF_VERSION {
                trace!(depth = control.path.len(), "taproot script path spend");
                context.sig_version = SigVersion::Tapscript;
                context.tapleaf_hash = Some(leaf_hash);
                context.validation_weight_left = Some(
                    i64::try_from(tx::witness_serialized_size(witness)).unwrap_or(i64::MAX)
                        + interpreter::VALIDATION_WEIGHT_OFFSET,
                );
                execute(items.to_vec(), &Code(script.clone()), flags, checker, context)
            } else if flags.contains(interpreter::Flags::DiscourageUpgradableTaprootVersion) {
                Err(Error::DiscourageUpgradableTaprootVersion)
            } else {
                Ok(true)
            }
        }
    }
}

/// Verify the witness of an input whose script pubkey (or P2SH redeem script, when `is_p2sh`) is
/// the witness program `program` of `version`.
pub(crate) fn verify_program(
    witness: &[Vec<u8>],
    version: u8,
    program: &[u8],
    flags: interpreter::Flags,
    checker: &dyn interpreter::SignatureChecker,
    is_p2sh: bool,
) -> Result<bool, Error> {
    trace!(version, program_len = program.len(), is_p2sh, "verifying witness program");
    match (version, program.len()) {
        (0, V0_SCRIPTHASH_SIZE) => {
            let (script, stack) = witness
                .split_last()
                .ok_or(Error::WitnessProgramWitnessEmpty)?;
            if Sha256::digest(script)[..] != *program {
                return Err(Error::WitnessProgramMismatch);
            }
            execute(
                stack.to_vec(),
                &Code(script.clone()),
                flags,
                checker,
                ExecutionContext::new(SigVersion::WitnessV0),
            )
        }
        (0, V0_KEYHASH_SIZE) => {
            if witness.len() != 2 {
                return Err(Error::WitnessProgramMismatch);
            }
            let hash = <&[u8; 20]>::try_from(program)
                .map_err(|_| Error::WitnessProgramWrongLength)?;
            execute(
                witness.to_vec(),
                &Code(Code::serialize(&pattern::pay_to_pubkey_hash_of(hash))),
                flags,
                checker,
                ExecutionContext::new(SigVersion::WitnessV0),
            )
        }
        (0, _) => Err(Error::WitnessProgramWrongLength),
        (1, V1_TAPROOT_SIZE) if !is_p2sh => {
            if flags.contains(interpreter::Flags::Taproot) {
                <&[u8; 32]>::try_from(program)
                    .map_err(|_| Error::WitnessProgramWrongLength)
                    .and_then(|program| verify_taproot(witness, program, flags, checker))
            } else {
                Ok(true)
            }
        }
        (1, _) if !is_p2sh && program == ANCHOR_PROGRAM => Ok(true),
        _ => {
            if flags.contains(interpreter::Flags::DiscourageUpgradableWitnessProgram) {
                Err(Error::DiscourageUpgradableWitnessProgram)
            } else {
                // Unknown versions and sizes are left for future soft forks.
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use sha2::{Digest, Sha256};

    use super::{is_op_success, program, verify_program};
    use crate::{
        interpreter::{self, Flags, NullSignatureChecker},
        op, opcode,
        script::{Code, Error},
        taproot, testing,
    };

    fn p2wsh_witness(script: &[crate::Opcode], stack: &[Vec<u8>]) -> (Vec<Vec<u8>>, [u8; 32]) {
        let script = Code::serialize(script);
        let hash = Sha256::digest(&script).into();
        let mut witness = stack.to_vec();
        witness.push(script);
        (witness, hash)
    }

    #[test]
    fn program_detection() {
        assert_eq!(program(&[0x00, 0x02, 0xaa, 0xbb]), Some((0, &[0xaa, 0xbb][..])));
        assert_eq!(program(&[0x51, 0x02, 0x4e, 0x73]), Some((1, &[0x4e, 0x73][..])));
        assert_eq!(program(&[0x60, 0x02, 0x4e, 0x73]), Some((16, &[0x4e, 0x73][..])));
        // Too short, wrong push length and not a version opcode.
        assert_eq!(program(&[0x00, 0x01, 0xaa]), None);
        assert_eq!(program(&[0x00, 0x03, 0xaa, 0xbb]), None);
        assert_eq!(program(&[0x4f, 0x02, 0xaa, 0xbb]), None);
        let mut long = vec![0x00, 41];
        long.extend([0; 41]);
        assert_eq!(program(&long), None);
    }

    #[test]
    fn op_success_bytes() {
        let successes = (0..=u8::MAX).filter(|b| is_op_success(*b)).count();
        assert_eq!(successes, 1 + 1 + 4 + 4 + 2 + 2 + 5 + 68);
        assert!(!is_op_success(0xba));
        assert!(is_op_success(0xbb));
        assert!(!is_op_success(0xff));
    }

    #[test]
    fn witness_script_hash() {
        let (witness, hash) = p2wsh_witness(&[op::_1], &[]);
        assert_eq!(
            verify_program(&witness, 0, &hash, Flags::STANDARD, &NullSignatureChecker(), false),
            Ok(true)
        );
        assert_eq!(
            verify_program(&witness, 0, &[0; 32], Flags::STANDARD, &NullSignatureChecker(), false),
            Err(Error::WitnessProgramMismatch)
        );
        assert_eq!(
            verify_program(&[], 0, &hash, Flags::STANDARD, &NullSignatureChecker(), false),
            Err(Error::WitnessProgramWitnessEmpty)
        );
        // Witness scripts always require a clean stack.
        let (witness, hash) = p2wsh_witness(&[op::_1, op::_1], &[]);
        assert_eq!(
            verify_program(&witness, 0, &hash, Flags::empty(), &NullSignatureChecker(), false),
            Err(Error::WitnessCleanStack)
        );
        let (witness, hash) = p2wsh_witness(&[op::DROP, op::_1], &[vec![0; 521]]);
        assert_eq!(
            verify_program(&witness, 0, &hash, Flags::empty(), &NullSignatureChecker(), false),
            Err(Error::Opcode(opcode::Error::PushSize(Some(521))))
        );
    }

    #[test]
    fn unknown_programs() {
        assert_eq!(
            verify_program(&[], 0, &[0; 21], Flags::empty(), &NullSignatureChecker(), false),
            Err(Error::WitnessProgramWrongLength)
        );
        assert_eq!(
            verify_program(&[], 2, &[0; 32], Flags::empty(), &NullSignatureChecker(), false),
            Ok(true)
        );
        assert_eq!(
            verify_program(&[], 2, &[0; 32], Flags::STANDARD, &NullSignatureChecker(), false),
            Err(Error::DiscourageUpgradableWitnessProgram)
        );
        assert_eq!(
            verify_program(&[], 1, &[0x4e, 0x73], Flags::STANDARD, &NullSignatureChecker(), false),
            Ok(true)
        );
        assert_eq!(
            verify_program(&[], 1, &[0x4e, 0x73], Flags::STANDARD, &NullSignatureChecker(), true),
            Err(Error::DiscourageUpgradableWitnessProgram)
        );
        // Taproot rules don’t apply until they are enabled.
        assert_eq!(
            verify_program(&[], 1, &[0; 32], Flags::P2SH | Flags::Witness, &NullSignatureChecker(), false),
            Ok(true)
        );
    }

    #[test]
    fn tapscript_paths() {
        let leaves = [
            Code::serialize(&[op::_1]),
            vec![0x50],
            Code::serialize(&[op::_1, op::_1]),
            Code::serialize(&[op::_2]),
        ];
        let info = leaves
            .iter()
            .try_fold(taproot::TaprootBuilder::new(), |builder, leaf| {
                builder.add_leaf(2, taproot::TAPSCRIPT_LEAF_VERSION, leaf.clone())
            })
            .and_then(|builder| builder.finalize(&testing::INTERNAL_KEY))
            .expect("valid tree");
        let spend = |leaf: &Vec<u8>, annex: Option<Vec<u8>>| {
            let control = info
                .control_block(taproot::TAPSCRIPT_LEAF_VERSION, leaf)
                .expect("leaf is in the tree");
            let mut witness = vec![leaf.clone(), control.serialize()];
            witness.extend(annex);
            witness
        };
        let verify = |witness: &[Vec<u8>], flags| {
            verify_program(witness, 1, &info.output_key, flags, &NullSignatureChecker(), false)
        };

        assert_eq!(verify(&spend(&leaves[0], None), Flags::STANDARD), Ok(true));
        assert_eq!(verify(&spend(&leaves[1], None), Flags::MANDATORY), Ok(true));
        assert_eq!(
            verify(&spend(&leaves[1], None), Flags::STANDARD),
            Err(Error::DiscourageOpSuccess)
        );
        assert_eq!(
            verify(&spend(&leaves[2], None), Flags::MANDATORY),
            Err(Error::WitnessCleanStack)
        );
        assert_eq!(
            verify(&spend(&leaves[0], Some(vec![0x50, 0x01])), Flags::MANDATORY),
            Ok(true)
        );
        assert_eq!(
            verify(&spend(&leaves[0], Some(vec![0x50])), Flags::STANDARD),
            Err(Error::DiscourageUpgradableAnnex)
        );

        // A leaf from a different tree doesn’t match the output key.
        let mut wrong = spend(&leaves[3], None);
        wrong[0] = Code::serialize(&[op::_3]);
        assert_eq!(
            verify(&wrong, Flags::MANDATORY),
            Err(Error::WitnessProgramMismatch)
        );

        let mut bad_control = spend(&leaves[0], None);
        bad_control[1].pop();
        assert_eq!(
            verify(&bad_control, Flags::MANDATORY),
            Err(Error::TaprootWrongControlSize(96))
        );

        assert_eq!(
            verify(&[vec![0; 63]], Flags::MANDATORY),
            Err(Error::Interpreter(
                None,
                interpreter::Error::Signature(crate::signature::Error::SchnorrSigSize(63))
            ))
        );
    }
}
