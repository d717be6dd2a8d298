//! Static analysis of a script’s conditional structure, for signing tools that need to know which
//! operations a spend will run.
//!
//! This is policy tooling. Verification never consults it.

use alloc::{boxed::Box, vec::Vec};

use crate::{
    interpreter,
    opcode::{Bad, Control, PossiblyBad},
    script::{self, Code},
    Opcode,
};

/// A binary decision tree over the executed `OP_IF`/`OP_NOTIF`s of a script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tree<L> {
    /// The script ran to the end with every decision made.
    Leaf(L),
    /// An executed conditional, by the value it consumed.
    Decision {
        /// The condition was false.
        on_false: Box<Tree<L>>,
        /// The condition was true.
        on_true: Box<Tree<L>>,
    },
}

impl<L> Tree<L> {
    /// The leaves, with false explored before true.
    pub fn into_leaves(self) -> Vec<L> {
        let mut leaves = Vec::new();
        let mut pending = vec![self];
        while let Some(tree) = pending.pop() {
            match tree {
                Tree::Leaf(leaf) => leaves.push(leaf),
                Tree::Decision { on_false, on_true } => {
                    pending.push(*on_true);
                    pending.push(*on_false);
                }
            }
        }
        leaves
    }
}

struct Walk<'a, L> {
    ops: &'a [PossiblyBad],
    leaf: &'a mut dyn FnMut(&[bool], &[PossiblyBad]) -> L,
}

impl<L> Walk<'_, L> {
    fn explore(
        &mut self,
        mut pos: usize,
        path: Vec<bool>,
        mut ops: Vec<PossiblyBad>,
        mut vexec: Vec<bool>,
    ) -> Result<Tree<L>, script::Error> {
        let unbalanced = |op: &PossiblyBad| {
            script::Error::Interpreter(
                Some(op.clone()),
                interpreter::Error::UnbalancedConditional,
            )
        };

        let all = self.ops;
        while let Some(op) = all.get(pos) {
            pos += 1;
            let executing = vexec.iter().all(|v| *v);
            match op {
                PossiblyBad::Good(Opcode::Control(control)) => {
                    ops.push(op.clone());
                    match control {
                        Control::OP_IF | Control::OP_NOTIF if executing => {
                            let mut decide = |value: bool| {
                                let mut path = path.clone();
                                path.push(value);
                                let mut vexec = vexec.clone();
                                vexec.push(value != (*control == Control::OP_NOTIF));
                                self.explore(pos, path, ops.clone(), vexec)
                            };
                            let on_false = Box::new(decide(false)?);
                            let on_true = Box::new(decide(true)?);
                            return Ok(Tree::Decision { on_false, on_true });
                        }
                        Control::OP_IF | Control::OP_NOTIF => vexec.push(false),
                        Control::OP_ELSE => {
                            let last = vexec.last_mut().ok_or_else(|| unbalanced(op))?;
                            *last = !*last;
                        }
                        Control::OP_ENDIF => {
                            vexec.pop().ok_or_else(|| unbalanced(op))?;
                        }
                    }
                }
                PossiblyBad::Bad(Bad::OP_VERIF | Bad::OP_VERNOTIF) => {
                    return Err(script::Error::Interpreter(
                        Some(op.clone()),
                        interpreter::Error::BadOpcode,
                    ))
                }
                _ if executing => ops.push(op.clone()),
                _ => {}
            }
        }

        match vexec.len() {
            0 => Ok(Tree::Leaf((self.leaf)(&path, &ops))),
            n => Err(script::Error::UnclosedConditional(n)),
        }
    }
}

/// Build the decision tree of `script`, calling `leaf` with the values consumed by executed
/// conditionals and the operations reached for each way through it.
///
/// The operations include every control opcode, whether or not it executed. Conditionals in
/// branches that aren’t taken consume no value. Nesting errors are reported the way evaluation
/// reports them, as is `OP_VERIF` or `OP_VERNOTIF`, which fail a script even in a branch that
/// isn’t taken.
pub fn decision_tree<L>(
    script: &Code,
    mut leaf: impl FnMut(&[bool], &[PossiblyBad]) -> L,
) -> Result<Tree<L>, script::Error> {
    let ops = script
        .parse()
        .collect::<Result<Vec<_>, _>>()
        .map_err(script::Error::Opcode)?;
    Walk {
        ops: &ops,
        leaf: &mut leaf,
    }
    .explore(0, vec![], vec![], vec![])
}

/// Every sequence of condition values that runs `script` to the end.
pub fn paths(script: &Code) -> Result<Vec<Vec<bool>>, script::Error> {
    decision_tree(script, |path, _| path.to_vec()).map(Tree::into_leaves)
}

/// One way through a script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptBranch {
    /// The value consumed by each executed conditional, in order.
    pub path: Vec<bool>,
    /// The control opcodes and executed operations.
    pub ops: Vec<PossiblyBad>,
}

impl ScriptBranch {
    /// The operations that run, without the conditionals that selected them.
    pub fn executed(&self) -> Vec<PossiblyBad> {
        self.ops
            .iter()
            .filter(|op| !matches!(op, PossiblyBad::Good(Opcode::Control(_))))
            .cloned()
            .collect()
    }
}

/// Every way through `script`.
pub fn branches(script: &Code) -> Result<Vec<ScriptBranch>, script::Error> {
    decision_tree(script, |path, ops| ScriptBranch {
        path: path.to_vec(),
        ops: ops.to_vec(),
    })
    .map(Tree::into_leaves)
}

#[cfg(test)]
mod tests {
    use alloc::{boxed::Box, vec::Vec};

    use crate::{
        interpreter,
        opcode::{Bad, Disabled, PossiblyBad},
        op, pattern,
        script::{self, Code},
        Opcode,
    };

    use super::{branches, decision_tree, paths, Tree};

    fn code(ops: &[Opcode]) -> Code {
        Code(Code::serialize(ops))
    }

    fn good(ops: &[Opcode]) -> Vec<PossiblyBad> {
        ops.iter().cloned().map(PossiblyBad::from).collect()
    }

    #[test]
    fn straight_line_scripts_have_one_branch() {
        let script = code(&[op::_1, op::DROP, op::_1]);
        assert_eq!(paths(&script), Ok(vec![vec![]]));
        let branches = branches(&script).expect("well nested");
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].ops, good(&[op::_1, op::DROP, op::_1]));
    }

    #[test]
    fn if_else() {
        let script = code(&[op::IF, op::_2, op::ELSE, op::_3, op::ENDIF]);
        assert_eq!(paths(&script), Ok(vec![vec![false], vec![true]]));

        let branches = branches(&script).expect("well nested");
        assert_eq!(branches[0].ops, good(&[op::IF, op::ELSE, op::_3, op::ENDIF]));
        assert_eq!(branches[0].executed(), good(&[op::_3]));
        assert_eq!(branches[1].executed(), good(&[op::_2]));

        // The path is the consumed value, so `OP_NOTIF` runs its body on false.
        let script = code(&[op::NOTIF, op::_2, op::ENDIF]);
        let branches = super::branches(&script).expect("well nested");
        assert_eq!(branches[0].path, vec![false]);
        assert_eq!(branches[0].executed(), good(&[op::_2]));
        assert_eq!(branches[1].executed(), good(&[]));
    }

    #[test]
    fn unexecuted_conditionals_consume_nothing() {
        let script = code(&[
            op::IF,
            op::IF,
            op::_1,
            op::ENDIF,
            op::ELSE,
            op::_2,
            op::ENDIF,
        ]);
        assert_eq!(
            paths(&script),
            Ok(vec![vec![false], vec![true, false], vec![true, true]])
        );
        assert_eq!(
            decision_tree(&script, |path, _| path.len()),
            Ok(Tree::Decision {
                on_false: Box::new(Tree::Leaf(1)),
                on_true: Box::new(Tree::Decision {
                    on_false: Box::new(Tree::Leaf(2)),
                    on_true: Box::new(Tree::Leaf(2)),
                }),
            })
        );
    }

    #[test]
    fn verif_fails_on_every_branch() {
        let eval = |bytes: &[u8]| {
            script::Raw::from_raw_parts(vec![], bytes.to_vec())
                .eval(interpreter::Flags::empty(), &interpreter::NullSignatureChecker())
                .map_err(|(_, e)| e)
        };

        for bad in [Bad::OP_VERIF, Bad::OP_VERNOTIF] {
            let expected = script::Error::Interpreter(
                Some(PossiblyBad::Bad(bad)),
                interpreter::Error::BadOpcode,
            );
            // OP_0 OP_IF <bad> OP_ENDIF OP_1
            let unexecuted = [0x00, 0x63, bad.encode(), 0x68, 0x51];
            assert_eq!(paths(&Code(unexecuted.to_vec())), Err(expected.clone()));
            assert_eq!(eval(&unexecuted), Err(expected.clone()));

            // OP_1 OP_IF OP_1 OP_ELSE <bad> OP_ENDIF
            let else_branch = [0x51, 0x63, 0x51, 0x67, bad.encode(), 0x68];
            assert_eq!(paths(&Code(else_branch.to_vec())), Err(expected));
        }

        // The other bad opcodes only fail where they run.
        let reserved = Code(vec![0x00, 0x63, 0x50, 0x68, 0x51]);
        assert_eq!(paths(&reserved), Ok(vec![vec![false], vec![true]]));
    }

    #[test]
    fn htlc_branches() {
        let script = code(&pattern::hash160_htlc(
            500,
            &[2; 33],
            &[7; 20],
            &[3; 33],
        ));
        let branches = branches(&script).expect("well nested");
        assert_eq!(branches.len(), 2);
        assert!(branches[0].executed().contains(&PossiblyBad::from(op::HASH160)));
        assert!(!branches[0]
            .executed()
            .contains(&PossiblyBad::from(op::CHECKLOCKTIMEVERIFY)));
        assert!(branches[1]
            .executed()
            .contains(&PossiblyBad::from(op::CHECKLOCKTIMEVERIFY)));
    }

    #[test]
    fn nesting_errors_match_evaluation() {
        assert_eq!(
            paths(&code(&[op::_1, op::ELSE])),
            Err(script::Error::Interpreter(
                Some(op::ELSE.into()),
                interpreter::Error::UnbalancedConditional
            ))
        );
        assert_eq!(
            paths(&code(&[op::ENDIF])),
            Err(script::Error::Interpreter(
                Some(op::ENDIF.into()),
                interpreter::Error::UnbalancedConditional
            ))
        );
        assert_eq!(
            paths(&code(&[op::IF, op::IF, op::ENDIF])),
            Err(script::Error::UnclosedConditional(1))
        );
        assert_eq!(
            paths(&Code(vec![0x00, 0x63, 0x7e, 0x68])),
            Err(script::Error::Opcode(crate::opcode::Error::Disabled(
                Disabled::OP_CAT
            )))
        );
    }
}
