use std::collections::{BTreeMap, BTreeSet};

use scid_isa::OpcodeFlags;

use crate::construct::{BoolOp, ExitKind, LoopKind};
use crate::instruction::Instruction;

/// Index of a node within the CFG arena.
pub type NodeId = usize;

/// Broken control-flow invariants. These abort the whole unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CfgError {
    #[error("empty instruction stream")]
    Empty,
    #[error("two nodes start at address {0:#06x}")]
    DuplicateAddress(u32),
    #[error("edge from {from:#06x} targets {target:#06x}, which starts no node")]
    UnknownTarget { from: u32, target: u32 },
    #[error("node at {0:#06x} has more than two successors")]
    TooManySuccessors(u32),
}

/// Node variants. Containers are produced by structure recovery and own
/// their children through arena handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// One basic block: instructions `first..last`.
    RawCode { first: usize, last: usize },
    /// Short-circuit chain of tests; `target` is the address reached when the
    /// whole condition holds.
    CompoundCondition {
        op: BoolOp,
        terms: Vec<NodeId>,
        target: u32,
    },
    /// Synthetic sink standing for a jump out of the enclosing loop.
    Exit { kind: ExitKind, address: u32 },
    Sequence(Vec<NodeId>),
    IfElse {
        condition: NodeId,
        then_body: Option<NodeId>,
        else_body: Option<NodeId>,
    },
    Loop {
        kind: LoopKind,
        condition: Option<NodeId>,
        body: Option<NodeId>,
        /// The loop runs while the condition is false.
        negated: bool,
    },
    Switch {
        cases: Vec<(NodeId, Option<NodeId>)>,
        default: Option<NodeId>,
    },
    Cond {
        clauses: Vec<(NodeId, NodeId)>,
        default: Option<NodeId>,
    },
    /// Unreduced region; the first member is its entry.
    Raw(Vec<NodeId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// Successor nodes, at most two.
    pub succs: Vec<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind, succs: Vec<NodeId>) -> Self {
        Self { kind, succs }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.kind, NodeKind::Exit { .. })
    }
}

/// Control flow graph for a single function.
#[derive(Debug, Clone)]
pub struct Cfg {
    /// Node arena, indexed by NodeId. Folded-away slots stay allocated.
    pub nodes: Vec<Node>,
    pub entry: NodeId,
    /// The decoded function, referenced by `RawCode` ranges.
    pub instructions: Vec<Instruction>,
}

impl Cfg {
    /// Partition `instructions` into basic blocks and link them.
    ///
    /// Blocks unreachable from the first instruction are dropped.
    pub fn build(instructions: Vec<Instruction>) -> Result<Self, CfgError> {
        if instructions.is_empty() {
            return Err(CfgError::Empty);
        }

        let mut addr_to_idx = BTreeMap::new();
        for (i, insn) in instructions.iter().enumerate() {
            if addr_to_idx.insert(insn.address, i).is_some() {
                return Err(CfgError::DuplicateAddress(insn.address));
            }
        }

        // Step 1: leaders
        let mut leaders = BTreeSet::new();
        leaders.insert(0usize);
        for (i, insn) in instructions.iter().enumerate() {
            if insn.opcode.is_branch() {
                let target = branch_target(insn)?;
                let &t = addr_to_idx.get(&target).ok_or(CfgError::UnknownTarget {
                    from: insn.address,
                    target,
                })?;
                leaders.insert(t);
            }
            if insn.is_terminator() && i + 1 < instructions.len() {
                leaders.insert(i + 1);
            }
        }

        // Step 2: blocks
        let starts: Vec<usize> = leaders.into_iter().collect();
        let mut block_of = BTreeMap::new();
        let mut ranges = Vec::with_capacity(starts.len());
        for (bi, &first) in starts.iter().enumerate() {
            let last = starts.get(bi + 1).copied().unwrap_or(instructions.len());
            block_of.insert(instructions[first].address, bi);
            ranges.push((first, last));
        }

        // Step 3: edges
        let mut succs = vec![Vec::new(); ranges.len()];
        for (bi, &(_, last)) in ranges.iter().enumerate() {
            let insn = &instructions[last - 1];
            let fallthrough = (bi + 1 < ranges.len()).then_some(bi + 1);
            let flags = insn.flags();
            if flags.contains(OpcodeFlags::RETURN) {
                continue;
            }
            if flags.contains(OpcodeFlags::JUMP) {
                let target_addr = branch_target(insn)?;
                let &target = block_of.get(&target_addr).ok_or(CfgError::UnknownTarget {
                    from: insn.address,
                    target: target_addr,
                })?;
                if flags.contains(OpcodeFlags::CONDITIONAL) {
                    succs[bi].extend(fallthrough);
                }
                if !succs[bi].contains(&target) {
                    succs[bi].push(target);
                }
            } else {
                succs[bi].extend(fallthrough);
            }
        }

        // Step 4: drop unreachable blocks and renumber
        let mut order = vec![None; ranges.len()];
        let mut stack = vec![0usize];
        let mut reached = Vec::new();
        while let Some(b) = stack.pop() {
            if order[b].is_some() {
                continue;
            }
            order[b] = Some(0);
            reached.push(b);
            stack.extend(succs[b].iter().rev());
        }
        reached.sort_unstable();
        for (new_id, &b) in reached.iter().enumerate() {
            order[b] = Some(new_id);
        }

        let nodes = reached
            .iter()
            .map(|&b| {
                let (first, last) = ranges[b];
                let edges = succs[b].iter().filter_map(|&s| order[s]).collect();
                Node::new(NodeKind::RawCode { first, last }, edges)
            })
            .collect();

        let cfg = Cfg {
            nodes,
            entry: 0,
            instructions,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the graph invariants over every node reachable from the entry.
    pub fn validate(&self) -> Result<(), CfgError> {
        let mut seen = BTreeSet::new();
        for id in self.reachable(self.entry) {
            let node = &self.nodes[id];
            let address = self.address(id);
            if node.succs.len() > 2 {
                return Err(CfgError::TooManySuccessors(address));
            }
            if !node.is_exit() && !seen.insert(address) {
                return Err(CfgError::DuplicateAddress(address));
            }
            let Some(insn) = self.terminator(id) else {
                continue;
            };
            if insn.opcode.is_branch() {
                let target = branch_target(insn)?;
                if !node.succs.iter().any(|&s| self.address(s) == target) {
                    return Err(CfgError::UnknownTarget {
                        from: insn.address,
                        target,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn succs(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].succs
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Move the node in `id` to a fresh slot and return the new handle.
    ///
    /// Edges pointing at `id` keep pointing at the slot, which the caller
    /// refills with the container that absorbs the moved node.
    pub fn detach(&mut self, id: NodeId) -> NodeId {
        let placeholder = Node::new(NodeKind::Sequence(Vec::new()), Vec::new());
        let node = std::mem::replace(&mut self.nodes[id], placeholder);
        self.push(node)
    }

    /// Instructions of a `RawCode` node.
    pub fn block(&self, id: NodeId) -> Option<&[Instruction]> {
        match self.nodes[id].kind {
            NodeKind::RawCode { first, last } => Some(&self.instructions[first..last]),
            _ => None,
        }
    }

    /// Final instruction of a `RawCode` node.
    pub fn terminator(&self, id: NodeId) -> Option<&Instruction> {
        self.block(id).and_then(<[Instruction]>::last)
    }

    /// The child whose address a container reports as its own.
    pub fn head(&self, id: NodeId) -> Option<NodeId> {
        match &self.nodes[id].kind {
            NodeKind::RawCode { .. } | NodeKind::Exit { .. } => None,
            NodeKind::CompoundCondition { terms, .. }
            | NodeKind::Sequence(terms)
            | NodeKind::Raw(terms) => terms.first().copied(),
            NodeKind::IfElse { condition, .. } => Some(*condition),
            NodeKind::Loop {
                kind: LoopKind::PreTest,
                condition,
                body,
                ..
            } => condition.or(*body),
            NodeKind::Loop {
                condition, body, ..
            } => body.or(*condition),
            NodeKind::Switch { cases, default } => cases.first().map(|c| c.0).or(*default),
            NodeKind::Cond { clauses, default } => clauses.first().map(|c| c.0).or(*default),
        }
    }

    /// Starting address, delegated to the head child for containers.
    pub fn address(&self, id: NodeId) -> u32 {
        let mut id = id;
        loop {
            match &self.nodes[id].kind {
                NodeKind::RawCode { first, .. } => return self.instructions[*first].address,
                NodeKind::Exit { address, .. } => return *address,
                _ => match self.head(id) {
                    Some(h) => id = h,
                    None => return u32::MAX,
                },
            }
        }
    }

    /// Ordering used whenever candidates are visited: by address, a real
    /// node before an exit at the same address, then by handle.
    pub fn sort_key(&self, id: NodeId) -> (u32, bool, NodeId) {
        (self.address(id), self.nodes[id].is_exit(), id)
    }

    /// Nodes reachable from `from` through successor edges, in `sort_key`
    /// order.
    pub fn reachable(&self, from: NodeId) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.nodes[id].succs.iter().copied());
            }
        }
        let mut out: Vec<NodeId> = seen.into_iter().collect();
        out.sort_by_key(|&id| self.sort_key(id));
        out
    }

    /// Predecessor lists restricted to edges between `region` members,
    /// indexed by NodeId.
    pub fn predecessors(&self, region: &[NodeId]) -> Vec<Vec<NodeId>> {
        let mut preds = vec![Vec::new(); self.nodes.len()];
        for &id in region {
            for &s in &self.nodes[id].succs {
                if !preds[s].contains(&id) {
                    preds[s].push(id);
                }
            }
        }
        preds
    }

    /// Immediate dominators of the subgraph reachable from `entry`.
    pub fn dominators(&self, entry: NodeId) -> Dominators {
        Dominators::compute(self, entry)
    }
}

/// Absolute target of a branch instruction.
fn branch_target(insn: &Instruction) -> Result<u32, CfgError> {
    insn.target.ok_or(CfgError::UnknownTarget {
        from: insn.address,
        target: insn.next_address(),
    })
}

/// Dominator tree (Cooper, Harvey and Kennedy's iterative algorithm).
#[derive(Debug, Clone)]
pub struct Dominators {
    entry: NodeId,
    idom: Vec<Option<NodeId>>,
}

impl Dominators {
    fn compute(cfg: &Cfg, entry: NodeId) -> Self {
        let n = cfg.nodes.len();

        // Postorder over successor edges.
        let mut postorder = Vec::new();
        let mut visited = vec![false; n];
        let mut stack = vec![(entry, 0usize)];
        visited[entry] = true;
        while let Some((id, i)) = stack.pop() {
            if let Some(&s) = cfg.nodes[id].succs.get(i) {
                stack.push((id, i + 1));
                if !visited[s] {
                    visited[s] = true;
                    stack.push((s, 0));
                }
            } else {
                postorder.push(id);
            }
        }
        let mut po_num = vec![usize::MAX; n];
        for (i, &id) in postorder.iter().enumerate() {
            po_num[id] = i;
        }

        let mut preds = vec![Vec::new(); n];
        for &id in &postorder {
            for &s in &cfg.nodes[id].succs {
                preds[s].push(id);
            }
        }

        let mut idom = vec![None; n];
        idom[entry] = Some(entry);
        let mut changed = true;
        while changed {
            changed = false;
            for &b in postorder.iter().rev() {
                if b == entry {
                    continue;
                }
                let mut new_idom = None;
                for &p in &preds[b] {
                    if idom[p].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, &po_num, p, cur),
                    });
                }
                if new_idom.is_some() && idom[b] != new_idom {
                    idom[b] = new_idom;
                    changed = true;
                }
            }
        }

        Self { entry, idom }
    }

    /// Immediate dominator; `None` for the entry and unreachable nodes.
    pub fn idom(&self, id: NodeId) -> Option<NodeId> {
        if id == self.entry {
            return None;
        }
        self.idom.get(id).copied().flatten()
    }

    /// Whether `a` dominates `b` (reflexive).
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if self.idom.get(b).copied().flatten().is_none() {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom(cur) {
                Some(next) => cur = next,
                None => return false,
            }
        }
    }
}

fn intersect(idom: &[Option<NodeId>], po_num: &[usize], a: NodeId, b: NodeId) -> NodeId {
    let (mut a, mut b) = (a, b);
    while a != b {
        while po_num[a] < po_num[b] {
            match idom[a] {
                Some(next) => a = next,
                None => return b,
            }
        }
        while po_num[b] < po_num[a] {
            match idom[b] {
                Some(next) => b = next,
                None => return a,
            }
        }
    }
    a
}
