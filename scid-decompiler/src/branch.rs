//! Then/else assignment for two-way nodes.

use scid_ir::cfg::{Cfg, CfgError, NodeId, NodeKind};
use scid_isa::Opcode;

/// Split the successors of `node` into `(then, else)`.
///
/// Returns `Ok(None)` unless the node has exactly two successors and ends in
/// a test. For a compound condition, "then" is the successor at the recorded
/// target; for a block ending in `bnt`, "else" is the successor at the branch
/// target; `bt` is the reverse. A target that matches neither successor is an
/// invariant violation.
pub fn then_else(cfg: &Cfg, node: NodeId) -> Result<Option<(NodeId, NodeId)>, CfgError> {
    let &[a, b] = cfg.succs(node) else {
        return Ok(None);
    };
    then_else_of_test(cfg, node, a, b)
}

/// Classify `a`/`b` by the test that ends `test`. A sequence is decided by
/// its last child, which carries the sequence's edges.
fn then_else_of_test(
    cfg: &Cfg,
    test: NodeId,
    a: NodeId,
    b: NodeId,
) -> Result<Option<(NodeId, NodeId)>, CfgError> {
    match &cfg.node(test).kind {
        NodeKind::RawCode { .. } => {
            let Some(insn) = cfg.terminator(test) else {
                return Ok(None);
            };
            let taken_is_then = match insn.opcode {
                Opcode::Bt => true,
                Opcode::Bnt => false,
                _ => return Ok(None),
            };
            let target = insn.target.unwrap_or(u32::MAX);
            pick(cfg, a, b, target, insn.address, taken_is_then).map(Some)
        }
        NodeKind::CompoundCondition { target, .. } => {
            pick(cfg, a, b, *target, cfg.address(test), true).map(Some)
        }
        NodeKind::Sequence(children) => match children.last() {
            Some(&last) => then_else_of_test(cfg, last, a, b),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn pick(
    cfg: &Cfg,
    a: NodeId,
    b: NodeId,
    target: u32,
    from: u32,
    taken_is_then: bool,
) -> Result<(NodeId, NodeId), CfgError> {
    let (taken, other) = if cfg.address(a) == target {
        (a, b)
    } else if cfg.address(b) == target {
        (b, a)
    } else {
        return Err(CfgError::UnknownTarget { from, target });
    };
    Ok(if taken_is_then {
        (taken, other)
    } else {
        (other, taken)
    })
}

/// The successor of `node` other than `one`; `None` unless `node` has
/// exactly two successors and `one` is among them.
pub fn other_branch(cfg: &Cfg, node: NodeId, one: NodeId) -> Option<NodeId> {
    match cfg.succs(node) {
        &[a, b] if a == one => Some(b),
        &[a, b] if b == one => Some(a),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use scid_ir::cfg::Node;
    use scid_ir::construct::BoolOp;
    use scid_ir::instruction::Instruction;

    use super::*;

    fn insn(address: u32, opcode: Opcode, size: u32, target: Option<u32>) -> Instruction {
        Instruction {
            address,
            opcode,
            operands: Vec::new(),
            size,
            target,
        }
    }

    // 0: <test> 5
    // 2: push0; 3: jmp 6
    // 5: push1
    // 6: ret
    fn diamond(test: Opcode) -> Cfg {
        Cfg::build(vec![
            insn(0, test, 2, Some(5)),
            insn(2, Opcode::Push0, 1, None),
            insn(3, Opcode::Jmp, 2, Some(6)),
            insn(5, Opcode::Push1, 1, None),
            insn(6, Opcode::Ret, 1, None),
        ])
        .unwrap()
    }

    fn compound(cfg: &mut Cfg, target: u32) -> NodeId {
        let succs = cfg.succs(0).to_vec();
        cfg.push(Node::new(
            NodeKind::CompoundCondition {
                op: BoolOp::And,
                terms: vec![0],
                target,
            },
            succs,
        ))
    }

    #[test]
    fn bnt_target_is_else() {
        let cfg = diamond(Opcode::Bnt);
        assert_eq!(then_else(&cfg, 0).unwrap(), Some((1, 2)));
    }

    #[test]
    fn bt_target_is_then() {
        let cfg = diamond(Opcode::Bt);
        assert_eq!(then_else(&cfg, 0).unwrap(), Some((2, 1)));
    }

    #[test]
    fn single_successor_has_no_branches() {
        let cfg = diamond(Opcode::Bnt);
        assert_eq!(then_else(&cfg, 1).unwrap(), None);
        assert_eq!(other_branch(&cfg, 1, 3), None);
    }

    #[test]
    fn other_branch_needs_a_successor() {
        let cfg = diamond(Opcode::Bnt);
        assert_eq!(other_branch(&cfg, 0, 1), Some(2));
        assert_eq!(other_branch(&cfg, 0, 2), Some(1));
        assert_eq!(other_branch(&cfg, 0, 3), None);
    }

    #[test]
    fn compound_then_is_recorded_target() {
        let mut cfg = diamond(Opcode::Bnt);
        let c = compound(&mut cfg, 5);
        assert_eq!(then_else(&cfg, c).unwrap(), Some((2, 1)));
    }

    #[test]
    fn compound_target_matching_neither_successor_fails() {
        let mut cfg = diamond(Opcode::Bnt);
        let c = compound(&mut cfg, 0x99);
        assert!(matches!(
            then_else(&cfg, c),
            Err(CfgError::UnknownTarget { from: 0, target: 0x99 })
        ));
    }
}
