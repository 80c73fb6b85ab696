//! Pushed-down predicate tree.

use std::ops::Bound;

use crate::literal::Literal;

/// Logical expression over column filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// A filter the engine re-applies itself; pushing it is a hint only.
    Optional(Box<Expr>),
    Pred(Filter),
}

impl Expr {
    /// Build an AND of filters.
    #[inline]
    pub fn all_of(fs: Vec<Filter>) -> Expr {
        Expr::And(fs.into_iter().map(Expr::Pred).collect())
    }

    /// Build an OR of filters.
    #[inline]
    pub fn any_of(fs: Vec<Filter>) -> Expr {
        Expr::Or(fs.into_iter().map(Expr::Pred).collect())
    }

    #[inline]
    pub fn optional(e: Expr) -> Expr {
        Expr::Optional(Box::new(e))
    }

    /// Column indices referenced anywhere in the tree, ascending and deduplicated.
    pub fn columns(&self) -> Vec<usize> {
        fn walk(e: &Expr, out: &mut Vec<usize>) {
            match e {
                Expr::And(children) | Expr::Or(children) => {
                    children.iter().for_each(|c| walk(c, out))
                }
                Expr::Optional(inner) => walk(inner, out),
                Expr::Pred(f) => {
                    out.push(f.column);
                    if let Operator::Pattern {
                        target: PatternTarget::Column(c),
                        ..
                    } = &f.op
                    {
                        out.push(*c);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Single predicate against a column (by tuple descriptor position).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: usize,
    pub op: Operator,
}

impl Filter {
    pub fn new(column: usize, op: Operator) -> Self {
        Self { column, op }
    }

    pub fn compare(column: usize, op: CompareOp, value: impl Into<Literal>) -> Self {
        Self::new(
            column,
            Operator::Compare {
                op,
                value: value.into(),
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// SQL `LIKE` pattern with `%`, `_` and `\` escapes.
    Like,
    StartsWith,
    EndsWith,
    Contains,
}

/// What a pattern function matches against.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternTarget {
    Literal(String),
    /// Another column; never pushed down.
    Column(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Compare {
        op: CompareOp,
        value: Literal,
    },
    Range {
        lower: Bound<Literal>,
        upper: Bound<Literal>,
    },
    In(Vec<Literal>),
    IsNull,
    IsNotNull,
    Pattern {
        kind: PatternKind,
        target: PatternTarget,
        case_insensitive: bool,
    },
    /// A filter shape with no pushdown equivalent (for example a dynamic
    /// filter or an arbitrary function); always rechecked downstream.
    Opaque(String),
}
