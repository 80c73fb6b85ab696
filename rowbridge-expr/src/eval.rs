//! Per-value evaluation of pushed-down predicates during streaming reads.
//!
//! [`compile`] binds a predicate tree to the row-store types of a tuple
//! descriptor: literals are converted into the row store's value domain once
//! (epoch-shifted dates, numerics as base-10000 digits) so that each row is
//! tested on its raw datum without building the columnar value first.

use std::fmt;

use rowbridge_codec::temporal::{date_from_columnar, timestamp_from_columnar};
use rowbridge_codec::text::text_value;
use rowbridge_codec::{DecodeContext, NumericVar};
use rowbridge_result::Result;
use rowbridge_types::{Datum, MICROS_PER_DAY, RowType, TupleDesc};
use tracing::trace;

use crate::Translation;
use crate::expr::{Expr, Filter, Operator};
use crate::literal::Literal;
use crate::predicate::Predicate;

/// Positional access to the attributes of one deformed row.
pub trait RowValues {
    /// `None` when the attribute is NULL.
    fn value(&self, column: usize) -> Option<&Datum>;
}

impl RowValues for [Option<Datum>] {
    #[inline]
    fn value(&self, column: usize) -> Option<&Datum> {
        self.get(column).and_then(Option::as_ref)
    }
}

impl RowValues for Vec<Option<Datum>> {
    #[inline]
    fn value(&self, column: usize) -> Option<&Datum> {
        self.as_slice().value(column)
    }
}

/// Compiled predicate tree.
#[derive(Clone)]
pub struct ValueFilter {
    root: Node,
}

#[derive(Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Leaf { column: usize, test: Test },
}

#[derive(Clone, Copy)]
enum Word {
    Char,
    Int2,
    Int4,
    Int8,
}

#[derive(Clone)]
enum Test {
    IsNull,
    IsNotNull,
    Bool(Predicate<bool>),
    Int { pred: Predicate<i64>, word: Word },
    Float { pred: Predicate<f64>, single: bool },
    Numeric(Predicate<NumericVar>),
    Text { pred: Predicate<String>, trim_padding: bool },
}

impl fmt::Debug for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn count(n: &Node) -> usize {
            match n {
                Node::And(c) | Node::Or(c) => c.iter().map(count).sum(),
                Node::Leaf { .. } => 1,
            }
        }
        f.debug_struct("ValueFilter")
            .field("leaves", &count(&self.root))
            .finish()
    }
}

impl ValueFilter {
    /// Evaluate against one row. NULL fails every test except `IS NULL`.
    pub fn matches(&self, row: &(impl RowValues + ?Sized), ctx: &DecodeContext<'_>) -> Result<bool> {
        eval_node(&self.root, row, ctx)
    }
}

fn eval_node(node: &Node, row: &(impl RowValues + ?Sized), ctx: &DecodeContext<'_>) -> Result<bool> {
    match node {
        Node::And(children) => {
            for child in children {
                if !eval_node(child, row, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Node::Or(children) => {
            for child in children {
                if eval_node(child, row, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Node::Leaf { column, test } => {
            let Some(datum) = row.value(*column) else {
                return Ok(matches!(test, Test::IsNull));
            };
            Ok(match test {
                Test::IsNull => false,
                Test::IsNotNull => true,
                Test::Bool(p) => p.matches(&datum.as_bool()?),
                Test::Int { pred, word } => {
                    let v = match word {
                        Word::Char => i64::from(datum.as_char()?),
                        Word::Int2 => i64::from(datum.as_i16()?),
                        Word::Int4 => i64::from(datum.as_i32()?),
                        Word::Int8 => datum.as_i64()?,
                    };
                    pred.matches(&v)
                }
                Test::Float { pred, single } => {
                    let v = if *single {
                        f64::from(datum.as_f32()?)
                    } else {
                        datum.as_f64()?
                    };
                    pred.matches(&v)
                }
                Test::Numeric(p) => p.matches(&NumericVar::parse(ctx.payload(datum)?)?),
                Test::Text { pred, trim_padding } => {
                    pred.matches(text_value(ctx.payload(datum)?, *trim_padding)?)
                }
            })
        }
    }
}

/// Compile `expr` for the columns of `desc`.
///
/// Conjunctions skip dropped children; a disjunction with a dropped child is
/// dropped as a whole. Any unsupported mandatory child makes the enclosing
/// branch unsupported.
pub fn compile(expr: &Expr, desc: &TupleDesc) -> Translation<ValueFilter> {
    compile_node(expr, desc).map(|root| ValueFilter { root })
}

fn compile_node(expr: &Expr, desc: &TupleDesc) -> Translation<Node> {
    match expr {
        Expr::And(children) => {
            let mut nodes = Vec::with_capacity(children.len());
            for child in children {
                match compile_node(child, desc) {
                    Translation::Pushed(n) => nodes.push(n),
                    Translation::Dropped => {}
                    Translation::Unsupported(r) => return Translation::Unsupported(r),
                }
            }
            match nodes.len() {
                0 => Translation::Dropped,
                1 => nodes.pop().map_or(Translation::Dropped, Translation::Pushed),
                _ => Translation::Pushed(Node::And(nodes)),
            }
        }
        Expr::Or(children) => {
            let mut nodes = Vec::with_capacity(children.len());
            for child in children {
                match compile_node(child, desc) {
                    Translation::Pushed(n) => nodes.push(n),
                    Translation::Dropped => return Translation::Dropped,
                    Translation::Unsupported(r) => return Translation::Unsupported(r),
                }
            }
            Translation::Pushed(Node::Or(nodes))
        }
        Expr::Optional(inner) => match compile_node(inner, desc) {
            Translation::Unsupported(reason) => {
                trace!(%reason, "optional filter left to the engine");
                Translation::Dropped
            }
            other => other,
        },
        Expr::Pred(filter) => compile_filter(filter, desc),
    }
}

fn compile_filter(filter: &Filter, desc: &TupleDesc) -> Translation<Node> {
    let Some(column) = desc.column(filter.column) else {
        return Translation::Unsupported(format!("no column at position {}", filter.column));
    };
    let leaf = |test| Translation::Pushed(Node::Leaf {
        column: filter.column,
        test,
    });
    match &filter.op {
        Operator::IsNull => return leaf(Test::IsNull),
        Operator::IsNotNull => return leaf(Test::IsNotNull),
        Operator::Opaque(what) => return Translation::Unsupported(what.clone()),
        _ => {}
    }

    let op = &filter.op;
    let int = |word| {
        Predicate::build(op, int_literal).map(|pred| Test::Int { pred, word })
    };
    let test = match &column.ty {
        RowType::Bool => Predicate::build(op, |l| match l {
            Literal::Bool(b) => Some(*b),
            _ => None,
        })
        .map(Test::Bool),
        RowType::Char => int(Word::Char),
        RowType::Int2 => int(Word::Int2),
        RowType::Int4 => int(Word::Int4),
        RowType::Int8 => int(Word::Int8),
        RowType::Float4 | RowType::Float8 => Predicate::build(op, float_literal).map(|pred| {
            Test::Float {
                pred,
                single: column.ty == RowType::Float4,
            }
        }),
        RowType::Numeric { .. } => Predicate::build(op, numeric_literal).map(Test::Numeric),
        ty if ty.is_textual() => Predicate::build(op, |l| match l {
            Literal::Utf8(s) => Some(s.clone()),
            _ => None,
        })
        .map(|pred| Test::Text {
            pred,
            trim_padding: *ty == RowType::Bpchar,
        }),
        RowType::Date => Predicate::build(op, |l| match l {
            Literal::Date32(d) => date_from_columnar(*d).ok().map(i64::from),
            _ => None,
        })
        .map(|pred| Test::Int {
            pred,
            word: Word::Int4,
        }),
        RowType::Timestamp | RowType::TimestampTz => Predicate::build(op, timestamp_literal)
            .map(|pred| Test::Int {
                pred,
                word: Word::Int8,
            }),
        _ => None,
    };
    match test {
        Some(test) if !matches!(test, Test::Text { .. }) && is_pattern(op) => {
            Translation::Unsupported(format!("pattern match on {} column", column.ty))
        }
        Some(test) => leaf(test),
        None => Translation::Unsupported(format!(
            "cannot evaluate {op:?} on {} column \"{}\"",
            column.ty, column.name
        )),
    }
}

fn is_pattern(op: &Operator) -> bool {
    matches!(op, Operator::Pattern { .. })
}

fn int_literal(l: &Literal) -> Option<i64> {
    match l {
        Literal::Int(v) => Some(*v),
        Literal::Decimal { value, scale } if *scale >= 0 => {
            let factor = 10i128.checked_pow(*scale as u32)?;
            if value % factor != 0 {
                return None;
            }
            i64::try_from(value / factor).ok()
        }
        _ => None,
    }
}

fn float_literal(l: &Literal) -> Option<f64> {
    match l {
        Literal::Float(v) => Some(*v),
        Literal::Int(v) => Some(*v as f64),
        Literal::Decimal { value, scale } => Some(*value as f64 / 10f64.powi(i32::from(*scale))),
        _ => None,
    }
}

fn numeric_literal(l: &Literal) -> Option<NumericVar> {
    match l {
        Literal::Int(v) => Some(NumericVar::from_scaled_i128(i128::from(*v), 0)),
        Literal::Decimal { value, scale } if *scale >= 0 => {
            Some(NumericVar::from_scaled_i128(*value, *scale as u8))
        }
        Literal::Decimal { value, scale } => {
            let factor = 10i128.checked_pow(u32::from(scale.unsigned_abs()))?;
            Some(NumericVar::from_scaled_i128(value.checked_mul(factor)?, 0))
        }
        Literal::Float(v) => Some(NumericVar::from_f64(*v)),
        _ => None,
    }
}

fn timestamp_literal(l: &Literal) -> Option<i64> {
    let columnar = match l {
        Literal::TimestampMicros(t) => *t,
        Literal::Date32(d) => match *d {
            i32::MAX => i64::MAX,
            d if d == -i32::MAX => -i64::MAX,
            d => i64::from(d).checked_mul(MICROS_PER_DAY)?,
        },
        _ => return None,
    };
    timestamp_from_columnar(columnar).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{CompareOp, PatternKind, PatternTarget};
    use rowbridge_codec::varlena::make_varlena;
    use rowbridge_codec::{NoToast, ScratchPool};
    use rowbridge_types::ColumnDesc;

    fn desc() -> TupleDesc {
        TupleDesc::new(vec![
            ColumnDesc::new("id", RowType::Int4),
            ColumnDesc::new("name", RowType::Bpchar),
            ColumnDesc::new("amount", RowType::numeric(12, 3)),
            ColumnDesc::new("day", RowType::Date),
            ColumnDesc::new("blob", RowType::Bytea),
        ])
    }

    fn text(s: &str) -> Datum {
        Datum::from_bytes(make_varlena(s.as_bytes()))
    }

    fn numeric(s: &str) -> Datum {
        let var: NumericVar = s.parse().unwrap();
        Datum::from_bytes(make_varlena(&var.to_bytes().unwrap()))
    }

    fn pushed(t: Translation<ValueFilter>) -> ValueFilter {
        match t {
            Translation::Pushed(f) => f,
            other => panic!("expected compiled filter, got {other:?}"),
        }
    }

    fn check(f: &ValueFilter, row: &[Option<Datum>]) -> bool {
        let pool = ScratchPool::new();
        f.matches(row, &DecodeContext::new(&NoToast, &pool)).unwrap()
    }

    #[test]
    fn conjunction_of_typed_leaves() {
        let f = pushed(compile(
            &Expr::all_of(vec![
                Filter::compare(0, CompareOp::Gt, 10),
                Filter::compare(1, CompareOp::Eq, "abc"),
                Filter::compare(
                    2,
                    CompareOp::LtEq,
                    Literal::Decimal {
                        value: 15_500,
                        scale: 3,
                    },
                ),
            ]),
            &desc(),
        ));
        let row = vec![
            Some(Datum::from_i32(11)),
            Some(text("abc   ")),
            Some(numeric("15.5")),
        ];
        assert!(check(&f, &row));
        let row = vec![
            Some(Datum::from_i32(11)),
            Some(text("abc")),
            Some(numeric("15.501")),
        ];
        assert!(!check(&f, &row));
        let row = vec![None, Some(text("abc")), Some(numeric("1"))];
        assert!(!check(&f, &row));
    }

    #[test]
    fn null_tests() {
        let f = pushed(compile(&Expr::Pred(Filter::new(0, Operator::IsNull)), &desc()));
        assert!(check(&f, &[None]));
        assert!(!check(&f, &[Some(Datum::from_i32(0))]));
        // Short rows read as NULL.
        assert!(check(&f, &[]));
    }

    #[test]
    fn dates_compare_in_row_store_domain() {
        let f = pushed(compile(
            &Expr::Pred(Filter::compare(3, CompareOp::Eq, Literal::Date32(10_957))),
            &desc(),
        ));
        let row = vec![None, None, None, Some(Datum::from_i32(0))];
        assert!(check(&f, &row));
    }

    #[test]
    fn unsupported_shapes() {
        let on_bytea = Expr::Pred(Filter::compare(4, CompareOp::Eq, "x"));
        assert!(matches!(compile(&on_bytea, &desc()), Translation::Unsupported(_)));

        let like_on_int = Expr::Pred(Filter::new(
            0,
            Operator::Pattern {
                kind: PatternKind::Like,
                target: PatternTarget::Literal("1%".into()),
                case_insensitive: false,
            },
        ));
        assert!(matches!(compile(&like_on_int, &desc()), Translation::Unsupported(_)));

        let optional = Expr::And(vec![
            Expr::optional(on_bytea.clone()),
            Expr::Pred(Filter::new(0, Operator::IsNotNull)),
        ]);
        assert!(matches!(compile(&optional, &desc()), Translation::Pushed(_)));
        assert!(matches!(
            compile(&Expr::optional(on_bytea), &desc()),
            Translation::Dropped
        ));
    }
}
