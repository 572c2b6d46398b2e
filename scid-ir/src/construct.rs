use serde::{Deserialize, Serialize};

use crate::instruction::Instruction;

/// Operator joining the terms of a compound condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOp {
    And,
    Or,
}

/// Where a synthetic loop exit transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    Break,
    Continue,
}

/// Where a loop evaluates its condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    /// `while`: test before the body.
    PreTest,
    /// `do … while`: test after the body.
    PostTest,
    /// No test; left only through `break` or `return`.
    Endless,
}

/// A boolean condition built from test blocks.
///
/// Adjacently tagged: YAML cannot tag a variant that directly wraps another
/// tagged value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "of", rename_all = "snake_case")]
pub enum Condition {
    /// Code whose final branch decides the outcome.
    Test(Box<Construct>),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    pub fn negate(self) -> Condition {
        match self {
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }

    /// Leaf test constructs in evaluation order.
    pub fn tests(&self) -> Vec<&Construct> {
        let mut out = Vec::new();
        self.collect_tests(&mut out);
        out
    }

    fn collect_tests<'a>(&'a self, out: &mut Vec<&'a Construct>) {
        match self {
            Condition::Test(c) => out.push(c),
            Condition::Not(inner) => inner.collect_tests(out),
            Condition::And(terms) | Condition::Or(terms) => {
                for t in terms {
                    t.collect_tests(out);
                }
            }
        }
    }
}

/// One arm of a `switch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// The `dup … eq?` test, as decoded.
    pub test: Construct,
    /// Constant compared against, when it is a literal.
    pub value: Option<i32>,
    pub body: Option<Construct>,
}

/// One clause of a `cond`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondClause {
    pub condition: Condition,
    pub body: Construct,
}

/// A labelled block of a region that could not be structured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBlock {
    pub address: u32,
    pub body: Construct,
    /// Addresses control may jump to after `body`, the taken branch first.
    pub successors: Vec<u32>,
}

/// Structured body of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Construct {
    /// Straight-line code.
    Block {
        address: u32,
        instructions: Vec<Instruction>,
    },
    Sequence(Vec<Construct>),
    If {
        condition: Condition,
        then_body: Box<Construct>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_body: Option<Box<Construct>>,
    },
    Loop {
        kind: LoopKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Box<Construct>>,
    },
    Switch {
        cases: Vec<SwitchCase>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Box<Construct>>,
    },
    Cond {
        clauses: Vec<CondClause>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Box<Construct>>,
    },
    Break {
        address: u32,
    },
    Continue {
        address: u32,
    },
    /// Unstructured remainder, emitted as labelled code with explicit jumps.
    Raw {
        blocks: Vec<RawBlock>,
    },
}

impl Construct {
    /// Every instruction in the tree, in source order.
    pub fn instructions(&self) -> Vec<&Instruction> {
        let mut out = Vec::new();
        self.visit(&mut |c| {
            if let Construct::Block { instructions, .. } = c {
                out.extend(instructions.iter());
            }
        });
        out.sort_by_key(|i| i.address);
        out
    }

    /// Whether the tree contains an unstructured region.
    pub fn is_degraded(&self) -> bool {
        let mut raw = false;
        self.visit(&mut |c| raw |= matches!(c, Construct::Raw { .. }));
        raw
    }

    /// Pre-order walk over this construct and every nested one.
    pub fn visit<'a, F: FnMut(&'a Construct)>(&'a self, f: &mut F) {
        f(self);
        match self {
            Construct::Block { .. } | Construct::Break { .. } | Construct::Continue { .. } => {}
            Construct::Sequence(items) => items.iter().for_each(|c| c.visit(f)),
            Construct::If {
                condition,
                then_body,
                else_body,
            } => {
                condition.tests().into_iter().for_each(|c| c.visit(f));
                then_body.visit(f);
                if let Some(e) = else_body {
                    e.visit(f);
                }
            }
            Construct::Loop {
                condition, body, ..
            } => {
                if let Some(b) = body {
                    b.visit(f);
                }
                if let Some(c) = condition {
                    c.tests().into_iter().for_each(|t| t.visit(f));
                }
            }
            Construct::Switch { cases, default } => {
                for case in cases {
                    case.test.visit(f);
                    if let Some(b) = &case.body {
                        b.visit(f);
                    }
                }
                if let Some(d) = default {
                    d.visit(f);
                }
            }
            Construct::Cond { clauses, default } => {
                for clause in clauses {
                    clause.condition.tests().into_iter().for_each(|c| c.visit(f));
                    clause.body.visit(f);
                }
                if let Some(d) = default {
                    d.visit(f);
                }
            }
            Construct::Raw { blocks } => blocks.iter().for_each(|b| b.body.visit(f)),
        }
    }
}
