//! Folding a function's CFG into structured constructs.
//!
//! Rules are tried in a fixed order (compound conditions, if/else,
//! sequences, loops, switch/cond) over nodes sorted by address; after any
//! successful fold the scan restarts from the first rule. A fold reuses the
//! head node's arena slot, moving the head itself to a fresh slot, so edges
//! into the region need no rewriting.

use std::collections::BTreeSet;

use scid_ir::cfg::{Cfg, CfgError, Dominators, Node, NodeId, NodeKind};
use scid_ir::construct::{
    BoolOp, CondClause, Condition, Construct, ExitKind, LoopKind, RawBlock, SwitchCase,
};
use scid_isa::Opcode;

use crate::branch::{other_branch, then_else};

/// Structure `cfg` and lower it to a construct tree.
///
/// The flag is `false` when part of the body had to be left as raw code.
pub fn structure(mut cfg: Cfg) -> Result<(Construct, bool), CfgError> {
    let entry = cfg.entry;
    let mut s = Structurer {
        cfg: &mut cfg,
        degraded: false,
    };
    s.reduce(entry)?;
    let degraded = s.degraded;
    Ok((Lowering { cfg: &cfg }.lower(entry), !degraded))
}

struct Structurer<'a> {
    cfg: &'a mut Cfg,
    degraded: bool,
}

struct LoopCandidate {
    header: NodeId,
    latches: Vec<NodeId>,
    body: BTreeSet<NodeId>,
}

impl Structurer<'_> {
    /// Reduce the region reachable from `entry` to a single node in `entry`'s
    /// slot, falling back to a raw region.
    fn reduce(&mut self, entry: NodeId) -> Result<(), CfgError> {
        loop {
            let region = self.cfg.reachable(entry);
            let preds = self.cfg.predecessors(&region);
            let doms = self.cfg.dominators(entry);

            if self.fuse(entry, &region, &preds)?
                || self.if_else(entry, &region, &preds, &doms)?
                || self.sequence(entry, &region, &preds)
                || self.loops(entry, &region, &preds, &doms)?
                || self.switches(&region)
            {
                continue;
            }

            let live: Vec<NodeId> = region
                .iter()
                .copied()
                .filter(|&id| !self.cfg.node(id).is_exit())
                .collect();
            if live.len() > 1 {
                log::debug!(
                    "region at {:#06x} left with {} nodes, emitting raw code",
                    self.cfg.address(entry),
                    live.len()
                );
                self.degraded = true;
                let head = self.cfg.detach(entry);
                let mut members = vec![head];
                members.extend(live.into_iter().filter(|&id| id != entry));
                self.cfg.nodes[entry] = Node::new(NodeKind::Raw(members), Vec::new());
            }
            return Ok(());
        }
    }

    fn is_exit(&self, id: NodeId) -> bool {
        self.cfg.node(id).is_exit()
    }

    /// Whether every successor of `id` is a loop exit (or there are none).
    fn exits_only(&self, id: NodeId) -> bool {
        self.cfg.succs(id).iter().all(|&s| self.is_exit(s))
    }

    fn is_loop_header(&self, id: NodeId, preds: &[Vec<NodeId>], doms: &Dominators) -> bool {
        preds[id].iter().any(|&p| doms.dominates(id, p))
    }

    /// A node `cond` may absorb as a branch body.
    fn is_body(&self, id: NodeId, cond: NodeId, entry: NodeId, preds: &[Vec<NodeId>]) -> bool {
        id != cond
            && id != entry
            && !self.is_exit(id)
            && preds[id] == [cond]
            && self.cfg.succs(id).len() <= 1
    }

    // Rule 1: `a && b` / `a || b`.
    fn fuse(
        &mut self,
        entry: NodeId,
        region: &[NodeId],
        preds: &[Vec<NodeId>],
    ) -> Result<bool, CfgError> {
        for &x in region {
            let Some((tx, ex)) = then_else(self.cfg, x)? else {
                continue;
            };
            for y in [tx, ex] {
                if y == x || y == entry || preds[y] != [x] {
                    continue;
                }
                let Some((ty, ey)) = then_else(self.cfg, y)? else {
                    continue;
                };
                let (op, then, other) = if y == tx && ey == ex {
                    (BoolOp::And, ty, ex)
                } else if y == ex && ty == tx {
                    (BoolOp::Or, tx, ey)
                } else {
                    continue;
                };
                self.fold_compound(x, y, op, then, other);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn fold_compound(&mut self, x: NodeId, y: NodeId, op: BoolOp, then: NodeId, other: NodeId) {
        let target = self.cfg.address(then);
        let mut terms = match &self.cfg.node(x).kind {
            NodeKind::CompoundCondition { op: xop, terms, .. } if *xop == op => terms.clone(),
            _ => vec![self.cfg.detach(x)],
        };
        match &self.cfg.node(y).kind {
            NodeKind::CompoundCondition { op: yop, terms: ys, .. } if *yop == op => {
                terms.extend(ys.iter().copied())
            }
            _ => terms.push(y),
        }
        log::trace!("fused {} terms at {target:#06x}", terms.len());
        self.cfg.nodes[x] = Node::new(
            NodeKind::CompoundCondition { op, terms, target },
            vec![then, other],
        );
    }

    // Rule 2: if/else.
    fn if_else(
        &mut self,
        entry: NodeId,
        region: &[NodeId],
        preds: &[Vec<NodeId>],
        doms: &Dominators,
    ) -> Result<bool, CfgError> {
        for &c in region {
            if self.is_loop_header(c, preds, doms) {
                continue;
            }
            let Some((t, e)) = then_else(self.cfg, c)? else {
                continue;
            };
            let t_body = self.is_body(t, c, entry, preds);
            let e_body = self.is_body(e, c, entry, preds);
            let t_succs = self.cfg.succs(t).to_vec();
            let e_succs = self.cfg.succs(e).to_vec();

            let (then_body, else_body, succs) = if t_body
                && e_body
                && (t_succs == e_succs || (self.exits_only(t) && self.exits_only(e)))
            {
                let next = if self.exits_only(t) && self.exits_only(e) {
                    Vec::new()
                } else {
                    t_succs
                };
                (Some(t), Some(e), next)
            } else if self.is_exit(t) && self.is_exit(e) {
                (Some(t), Some(e), Vec::new())
            } else if t_body && (t_succs == [e] || self.exits_only(t)) {
                (Some(t), None, vec![e])
            } else if e_body && (e_succs == [t] || self.exits_only(e)) {
                (None, Some(e), vec![t])
            } else if self.is_exit(t) {
                (Some(t), None, vec![e])
            } else if self.is_exit(e) {
                (None, Some(e), vec![t])
            } else {
                continue;
            };

            let condition = self.cfg.detach(c);
            self.cfg.nodes[c] = Node::new(
                NodeKind::IfElse {
                    condition,
                    then_body,
                    else_body,
                },
                succs,
            );
            return Ok(true);
        }
        Ok(false)
    }

    // Rule 3: straight-line code.
    fn sequence(&mut self, entry: NodeId, region: &[NodeId], preds: &[Vec<NodeId>]) -> bool {
        for &a in region {
            let &[b] = self.cfg.succs(a) else {
                continue;
            };
            if b == a || b == entry || self.is_exit(b) || preds[b] != [a] {
                continue;
            }
            let mut children = match &self.cfg.node(a).kind {
                NodeKind::Sequence(items) => items.clone(),
                _ => vec![self.cfg.detach(a)],
            };
            match &self.cfg.node(b).kind {
                NodeKind::Sequence(items) => children.extend(items.iter().copied()),
                _ => children.push(b),
            }
            let succs = self.cfg.succs(b).to_vec();
            self.cfg.nodes[a] = Node::new(NodeKind::Sequence(children), succs);
            return true;
        }
        false
    }

    // Rule 4: loops, innermost first.
    fn loops(
        &mut self,
        entry: NodeId,
        region: &[NodeId],
        preds: &[Vec<NodeId>],
        doms: &Dominators,
    ) -> Result<bool, CfgError> {
        let mut candidates = Vec::new();
        for &h in region {
            let latches: Vec<NodeId> = preds[h]
                .iter()
                .copied()
                .filter(|&p| doms.dominates(h, p))
                .collect();
            if latches.is_empty() {
                continue;
            }
            let mut body = BTreeSet::from([h]);
            let mut work = latches.clone();
            while let Some(n) = work.pop() {
                if body.insert(n) {
                    work.extend(preds[n].iter().copied());
                }
            }
            candidates.push(LoopCandidate {
                header: h,
                latches,
                body,
            });
        }
        candidates.sort_by_key(|c| (c.body.len(), self.cfg.sort_key(c.header)));

        for candidate in candidates {
            if self.fold_loop(entry, region, preds, candidate)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn fold_loop(
        &mut self,
        entry: NodeId,
        region: &[NodeId],
        preds: &[Vec<NodeId>],
        candidate: LoopCandidate,
    ) -> Result<bool, CfgError> {
        let LoopCandidate {
            header: h,
            latches,
            mut body,
        } = candidate;

        // Returns reached only from inside the loop belong to it.
        let last = body.iter().map(|&n| self.cfg.address(n)).max().unwrap_or(0);
        for &x in region {
            if !body.contains(&x)
                && x != entry
                && !self.is_exit(x)
                && self.cfg.succs(x).is_empty()
                && !preds[x].is_empty()
                && preds[x].iter().all(|p| body.contains(p))
                && self.cfg.address(x) < last
            {
                body.insert(x);
            }
        }

        let mut exits = self.exit_targets(&body);
        if exits.len() > 1 {
            // `if (x) break;` leaves through a lone jump to another exit.
            let jumps: Vec<NodeId> = exits
                .iter()
                .copied()
                .filter(|&x| {
                    x != entry
                        && !self.is_exit(x)
                        && preds[x].iter().all(|p| body.contains(p))
                        && matches!(self.cfg.succs(x), &[f] if f != x && exits.contains(&f))
                })
                .collect();
            if !jumps.is_empty() {
                body.extend(jumps);
                exits = self.exit_targets(&body);
            }
        }
        if exits.len() > 1 {
            log::debug!(
                "loop at {:#06x} has {} exit targets",
                self.cfg.address(h),
                exits.len()
            );
            return Ok(false);
        }
        let follow = exits.first().copied();
        let follow_addr = follow.map(|f| self.cfg.address(f));
        let h_addr = self.cfg.address(h);
        let succs_after: Vec<NodeId> = follow.into_iter().collect();

        // do ... while: one latch testing back to the header or out.
        if let &[l] = latches.as_slice() {
            let ls = self.cfg.succs(l).to_vec();
            if ls.len() == 2 && ls.contains(&h) && follow.is_some_and(|f| ls.contains(&f)) {
                let Some((then, _)) = then_else(self.cfg, l)? else {
                    return Ok(false);
                };
                let negated = then != h;
                let l_addr = self.cfg.address(l);

                if l == h {
                    let condition = self.cfg.detach(h);
                    self.cfg.nodes[condition].succs.clear();
                    self.cfg.nodes[h] = Node::new(
                        NodeKind::Loop {
                            kind: LoopKind::PostTest,
                            condition: Some(condition),
                            body: None,
                            negated,
                        },
                        succs_after,
                    );
                    return Ok(true);
                }

                let head = self.cfg.detach(h);
                self.cfg.nodes[l].succs.clear();
                let members: Vec<NodeId> = body
                    .iter()
                    .map(|&n| if n == h { head } else { n })
                    .filter(|&n| n != l)
                    .collect();
                self.redirect(&members, l, ExitKind::Continue, l_addr);
                if let (Some(f), Some(fa)) = (follow, follow_addr) {
                    self.redirect(&members, f, ExitKind::Break, fa);
                }
                self.reduce(head)?;
                self.cfg.nodes[h] = Node::new(
                    NodeKind::Loop {
                        kind: LoopKind::PostTest,
                        condition: Some(l),
                        body: Some(head),
                        negated,
                    },
                    succs_after,
                );
                return Ok(true);
            }
        }

        // while: the header tests between the body and the follow.
        if let (Some(f), Some(fa)) = (follow, follow_addr) {
            let inner = other_branch(self.cfg, h, f).filter(|&b| b != h && body.contains(&b));
            if let Some(inner) = inner {
                let Some((then, _)) = then_else(self.cfg, h)? else {
                    return Ok(false);
                };
                let negated = then != inner;
                let condition = self.cfg.detach(h);
                let members: Vec<NodeId> = body.iter().copied().filter(|&n| n != h).collect();
                self.redirect(&members, h, ExitKind::Continue, h_addr);
                self.redirect(&members, f, ExitKind::Break, fa);
                self.reduce(inner)?;
                self.cfg.nodes[h] = Node::new(
                    NodeKind::Loop {
                        kind: LoopKind::PreTest,
                        condition: Some(condition),
                        body: Some(inner),
                        negated,
                    },
                    succs_after,
                );
                return Ok(true);
            }
        }

        // Anything else runs until a break or return.
        let head = self.cfg.detach(h);
        let members: Vec<NodeId> = body
            .iter()
            .map(|&n| if n == h { head } else { n })
            .collect();
        self.redirect(&members, h, ExitKind::Continue, h_addr);
        if let (Some(f), Some(fa)) = (follow, follow_addr) {
            self.redirect(&members, f, ExitKind::Break, fa);
        }
        self.reduce(head)?;
        self.cfg.nodes[h] = Node::new(
            NodeKind::Loop {
                kind: LoopKind::Endless,
                condition: None,
                body: Some(head),
                negated: false,
            },
            succs_after,
        );
        Ok(true)
    }

    /// Successors of `body` outside it.
    fn exit_targets(&self, body: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
        body.iter()
            .flat_map(|&n| self.cfg.succs(n).iter().copied())
            .filter(|s| !body.contains(s))
            .collect()
    }

    /// Replace every edge from `members` to `target` with a fresh exit node.
    fn redirect(&mut self, members: &[NodeId], target: NodeId, kind: ExitKind, address: u32) {
        for &n in members {
            for i in 0..self.cfg.nodes[n].succs.len() {
                if self.cfg.nodes[n].succs[i] == target {
                    let exit = self
                        .cfg
                        .push(Node::new(NodeKind::Exit { kind, address }, Vec::new()));
                    self.cfg.nodes[n].succs[i] = exit;
                }
            }
        }
    }

    // Rule 5: switch and cond chains, rewritten in place.
    fn switches(&mut self, region: &[NodeId]) -> bool {
        let mut changed = false;
        for &id in region {
            changed |= self.switch_tree(id);
        }
        changed
    }

    fn switch_tree(&mut self, id: NodeId) -> bool {
        let mut changed = false;
        for child in children(self.cfg, id) {
            changed |= self.switch_tree(child);
        }

        let NodeKind::IfElse {
            condition,
            then_body: Some(then),
            else_body,
        } = self.cfg.node(id).kind.clone()
        else {
            return changed;
        };
        let nested = else_body
            .filter(|&e| !self.cfg.succs(e).iter().any(|&s| self.is_exit(s)))
            .map(|e| (e, self.cfg.node(e).kind.clone()));

        if case_test(self.cfg, condition).is_some() {
            let (mut cases, default) = match nested {
                Some((_, NodeKind::Switch { cases, default })) => (cases, default),
                _ => (Vec::new(), else_body),
            };
            cases.insert(0, (condition, Some(then)));
            self.cfg.nodes[id].kind = NodeKind::Switch { cases, default };
            return true;
        }

        let (clauses, default) = match nested {
            Some((_, NodeKind::Cond { clauses, default })) => (clauses, default),
            Some((
                _,
                NodeKind::IfElse {
                    condition: c2,
                    then_body: Some(t2),
                    else_body: e2,
                },
            )) => (vec![(c2, t2)], e2),
            _ => return changed,
        };
        let mut clauses = clauses;
        clauses.insert(0, (condition, then));
        self.cfg.nodes[id].kind = NodeKind::Cond { clauses, default };
        true
    }
}

/// Structural children of a container.
fn children(cfg: &Cfg, id: NodeId) -> Vec<NodeId> {
    match &cfg.node(id).kind {
        NodeKind::RawCode { .. } | NodeKind::Exit { .. } => Vec::new(),
        NodeKind::CompoundCondition { terms, .. }
        | NodeKind::Sequence(terms)
        | NodeKind::Raw(terms) => terms.clone(),
        NodeKind::IfElse {
            condition,
            then_body,
            else_body,
        } => std::iter::once(*condition)
            .chain(*then_body)
            .chain(*else_body)
            .collect(),
        NodeKind::Loop {
            condition, body, ..
        } => condition.iter().chain(body.iter()).copied().collect(),
        NodeKind::Switch { cases, default } => cases
            .iter()
            .flat_map(|&(t, b)| std::iter::once(t).chain(b))
            .chain(*default)
            .collect(),
        NodeKind::Cond { clauses, default } => clauses
            .iter()
            .flat_map(|&(c, b)| [c, b])
            .chain(*default)
            .collect(),
    }
}

/// The block whose final branch decides `id`.
fn last_block(cfg: &Cfg, id: NodeId) -> Option<NodeId> {
    match &cfg.node(id).kind {
        NodeKind::RawCode { .. } => Some(id),
        NodeKind::Sequence(items) => last_block(cfg, *items.last()?),
        _ => None,
    }
}

/// For a `dup … eq? bnt` case test, the compared constant if it is a
/// literal (`Some(None)` otherwise); `None` when `id` is no case test.
fn case_test(cfg: &Cfg, id: NodeId) -> Option<Option<i32>> {
    let insns = cfg.block(last_block(cfg, id)?)?;
    let [.., cmp, branch] = insns else {
        return None;
    };
    if branch.opcode != Opcode::Bnt
        || cmp.opcode != Opcode::Eq
        || !insns.iter().any(|i| i.opcode == Opcode::Dup)
    {
        return None;
    }
    let value = insns
        .len()
        .checked_sub(3)
        .map(|i| &insns[i])
        .filter(|i| matches!(i.opcode, Opcode::Ldi | Opcode::Pushi))
        .and_then(|i| i.operands.first())
        .and_then(|op| op.value());
    Some(value)
}

/// Lowers the folded arena into an owned tree.
struct Lowering<'a> {
    cfg: &'a Cfg,
}

impl Lowering<'_> {
    fn lower(&self, id: NodeId) -> Construct {
        let cfg = self.cfg;
        match &cfg.node(id).kind {
            NodeKind::RawCode { first, last } => Construct::Block {
                address: cfg.address(id),
                instructions: cfg.instructions[*first..*last].to_vec(),
            },
            NodeKind::CompoundCondition { terms, .. } => {
                seq(terms.iter().map(|&t| self.lower(t)).collect())
            }
            NodeKind::Exit {
                kind: ExitKind::Break,
                address,
            } => Construct::Break { address: *address },
            NodeKind::Exit {
                kind: ExitKind::Continue,
                address,
            } => Construct::Continue { address: *address },
            NodeKind::Sequence(items) => seq(items.iter().map(|&i| self.lower(i)).collect()),
            NodeKind::IfElse {
                condition,
                then_body,
                else_body,
            } => {
                let (mut prefix, cond) = self.split_condition(*condition);
                let stmt = match (then_body, else_body) {
                    (Some(t), e) => Construct::If {
                        condition: cond,
                        then_body: Box::new(self.branch(*t)),
                        else_body: e.map(|e| Box::new(self.branch(e))),
                    },
                    (None, Some(e)) => Construct::If {
                        condition: cond.negate(),
                        then_body: Box::new(self.branch(*e)),
                        else_body: None,
                    },
                    (None, None) => Construct::If {
                        condition: cond,
                        then_body: Box::new(Construct::Sequence(Vec::new())),
                        else_body: None,
                    },
                };
                prefix.push(stmt);
                seq(prefix)
            }
            NodeKind::Loop {
                kind,
                condition,
                body,
                negated,
            } => {
                let mut body = body.map(|b| self.loop_body(b));
                let condition = condition.map(|c| {
                    let (prefix, cond) = match (kind, body.is_some()) {
                        // A self-looping block is all condition; a folded
                        // sequence splits into body and test.
                        (LoopKind::PostTest, false) => self.split_condition(c),
                        _ => (Vec::new(), self.condition(c)),
                    };
                    if !prefix.is_empty() {
                        body = Some(seq(prefix));
                    }
                    if *negated { cond.negate() } else { cond }
                });
                Construct::Loop {
                    kind: *kind,
                    condition,
                    body: body.map(Box::new),
                }
            }
            NodeKind::Switch { cases, default } => Construct::Switch {
                cases: cases
                    .iter()
                    .map(|&(test, body)| SwitchCase {
                        test: self.lower(test),
                        value: case_test(cfg, test).flatten(),
                        body: body.map(|b| self.branch(b)),
                    })
                    .collect(),
                default: default.map(|d| Box::new(self.branch(d))),
            },
            NodeKind::Cond { clauses, default } => Construct::Cond {
                clauses: clauses
                    .iter()
                    .map(|&(c, b)| CondClause {
                        condition: self.condition(c),
                        body: self.branch(b),
                    })
                    .collect(),
                default: default.map(|d| Box::new(self.branch(d))),
            },
            NodeKind::Raw(members) => Construct::Raw {
                blocks: members
                    .iter()
                    .map(|&m| RawBlock {
                        address: cfg.address(m),
                        body: self.lower(m),
                        successors: self.successor_addresses(m),
                    })
                    .collect(),
            },
        }
    }

    /// A branch body plus the `break`/`continue` that leaves it, if any.
    fn branch(&self, id: NodeId) -> Construct {
        let mut items = vec![self.lower(id)];
        if let &[s] = self.cfg.succs(id) {
            if self.cfg.node(s).is_exit() {
                items.push(self.lower(s));
            }
        }
        seq(items)
    }

    /// A loop body; falling off its end continues the loop implicitly.
    fn loop_body(&self, id: NodeId) -> Construct {
        let mut items = vec![self.lower(id)];
        if let &[s] = self.cfg.succs(id) {
            if let NodeKind::Exit {
                kind: ExitKind::Break,
                address,
            } = self.cfg.node(s).kind
            {
                items.push(Construct::Break { address });
            }
        }
        seq(items)
    }

    fn condition(&self, id: NodeId) -> Condition {
        match &self.cfg.node(id).kind {
            NodeKind::CompoundCondition { op, terms, .. } => {
                let terms = terms.iter().map(|&t| self.condition(t)).collect();
                match op {
                    BoolOp::And => Condition::And(terms),
                    BoolOp::Or => Condition::Or(terms),
                }
            }
            _ => Condition::Test(Box::new(self.lower(id))),
        }
    }

    /// Split a sequence-shaped condition into the statements that run first
    /// and the test that decides.
    fn split_condition(&self, id: NodeId) -> (Vec<Construct>, Condition) {
        match &self.cfg.node(id).kind {
            NodeKind::Sequence(items) if items.len() > 1 => {
                let (last, init) = items.split_last().map_or((id, &[][..]), |(l, i)| (*l, i));
                let mut prefix: Vec<Construct> = init.iter().map(|&i| self.lower(i)).collect();
                let (more, cond) = self.split_condition(last);
                prefix.extend(more);
                (prefix, cond)
            }
            _ => (Vec::new(), self.condition(id)),
        }
    }

    fn successor_addresses(&self, id: NodeId) -> Vec<u32> {
        let order = match then_else(self.cfg, id) {
            Ok(Some((t, e))) => vec![t, e],
            _ => self.cfg.succs(id).to_vec(),
        };
        order.into_iter().map(|s| self.cfg.address(s)).collect()
    }
}

/// Flatten nested sequences; a single item stands alone.
fn seq(items: Vec<Construct>) -> Construct {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Construct::Sequence(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        flat.pop().unwrap_or(Construct::Sequence(Vec::new()))
    } else {
        Construct::Sequence(flat)
    }
}
