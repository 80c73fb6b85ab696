//! Fully typed predicates evaluated against decoded row values.
//!
//! [`Predicate::build`] lowers a logical [`Operator`] once per scan, with the
//! caller supplying the literal conversion for the column's value domain.
//! [`Predicate::matches`] then runs per row without further allocation.

use std::cmp::Ordering;
use std::ops::Bound;

use rowbridge_codec::NumericVar;

use crate::expr::{CompareOp, Operator, PatternKind, PatternTarget};
use crate::like::{escape_like, like_match};
use crate::literal::Literal;

/// Value that can participate in typed predicate evaluation.
pub trait PredicateValue: Clone {
    type Borrowed<'a>: ?Sized
    where
        Self: 'a;

    fn compare(value: &Self::Borrowed<'_>, target: &Self) -> Option<Ordering>;

    fn equals(value: &Self::Borrowed<'_>, target: &Self) -> bool {
        matches!(Self::compare(value, target), Some(Ordering::Equal))
    }

    /// `LIKE` match; only text values support it.
    fn like(value: &Self::Borrowed<'_>, pattern: &str, case_insensitive: bool) -> bool {
        let _ = (value, pattern, case_insensitive);
        false
    }
}

macro_rules! impl_ord_predicate_value {
    ($($t:ty),*) => {
        $(
            impl PredicateValue for $t {
                type Borrowed<'a> = $t;

                #[inline]
                fn compare(value: &$t, target: &$t) -> Option<Ordering> {
                    Some(value.cmp(target))
                }
            }
        )*
    };
}

impl_ord_predicate_value!(bool, i64);

impl PredicateValue for f64 {
    type Borrowed<'a> = f64;

    /// NaN equals NaN and sorts above every other value.
    fn compare(value: &f64, target: &f64) -> Option<Ordering> {
        Some(match (value.is_nan(), target.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => value.partial_cmp(target).unwrap_or(Ordering::Equal),
        })
    }
}

impl PredicateValue for NumericVar {
    type Borrowed<'a> = NumericVar;

    fn compare(value: &NumericVar, target: &NumericVar) -> Option<Ordering> {
        Some(value.cmp_value(target))
    }
}

impl PredicateValue for String {
    type Borrowed<'a> = str;

    fn compare(value: &str, target: &String) -> Option<Ordering> {
        Some(value.cmp(target.as_str()))
    }

    fn like(value: &str, pattern: &str, case_insensitive: bool) -> bool {
        like_match(value, pattern, case_insensitive)
    }
}

/// Fully typed predicate ready to be matched against borrowed values.
#[derive(Debug, Clone)]
pub enum Predicate<V>
where
    V: PredicateValue,
{
    /// Never true (comparison against NULL, empty `IN`).
    Nothing,
    Equals(V),
    NotEquals(V),
    GreaterThan(V),
    GreaterThanOrEquals(V),
    LessThan(V),
    LessThanOrEquals(V),
    Range { lower: Bound<V>, upper: Bound<V> },
    In(Vec<V>),
    Like { pattern: String, case_insensitive: bool },
}

impl<V> Predicate<V>
where
    V: PredicateValue,
{
    /// Lower `op` using `convert` for literals; `None` when some literal has
    /// no representation in this domain or the operator does not apply.
    pub fn build(op: &Operator, convert: impl Fn(&Literal) -> Option<V>) -> Option<Self> {
        let lower_bound = |b: &Bound<Literal>| -> Option<Option<Bound<V>>> {
            Some(match b {
                Bound::Unbounded => Some(Bound::Unbounded),
                Bound::Included(Literal::Null) | Bound::Excluded(Literal::Null) => None,
                Bound::Included(l) => Some(Bound::Included(convert(l)?)),
                Bound::Excluded(l) => Some(Bound::Excluded(convert(l)?)),
            })
        };
        match op {
            Operator::Compare { value: Literal::Null, .. } => Some(Predicate::Nothing),
            Operator::Compare { op, value } => {
                let v = convert(value)?;
                Some(match op {
                    CompareOp::Eq => Predicate::Equals(v),
                    CompareOp::NotEq => Predicate::NotEquals(v),
                    CompareOp::Lt => Predicate::LessThan(v),
                    CompareOp::LtEq => Predicate::LessThanOrEquals(v),
                    CompareOp::Gt => Predicate::GreaterThan(v),
                    CompareOp::GtEq => Predicate::GreaterThanOrEquals(v),
                })
            }
            Operator::Range { lower, upper } => {
                match (lower_bound(lower)?, lower_bound(upper)?) {
                    (Some(lower), Some(upper)) => Some(Predicate::Range { lower, upper }),
                    _ => Some(Predicate::Nothing),
                }
            }
            Operator::In(values) => {
                let values = values
                    .iter()
                    .filter(|l| !l.is_null())
                    .map(&convert)
                    .collect::<Option<Vec<_>>>()?;
                if values.is_empty() {
                    Some(Predicate::Nothing)
                } else {
                    Some(Predicate::In(values))
                }
            }
            Operator::Pattern {
                kind,
                target: PatternTarget::Literal(raw),
                case_insensitive,
            } => {
                let pattern = match kind {
                    PatternKind::Like => raw.clone(),
                    PatternKind::StartsWith => format!("{}%", escape_like(raw)),
                    PatternKind::EndsWith => format!("%{}", escape_like(raw)),
                    PatternKind::Contains => format!("%{}%", escape_like(raw)),
                };
                Some(Predicate::Like {
                    pattern,
                    case_insensitive: *case_insensitive,
                })
            }
            Operator::Pattern { .. }
            | Operator::IsNull
            | Operator::IsNotNull
            | Operator::Opaque(_) => None,
        }
    }

    /// Return `true` when `value` satisfies the predicate variant.
    pub fn matches(&self, value: &V::Borrowed<'_>) -> bool {
        match self {
            Predicate::Nothing => false,
            Predicate::Equals(target) => V::equals(value, target),
            Predicate::NotEquals(target) => {
                matches!(V::compare(value, target), Some(Ordering::Less | Ordering::Greater))
            }
            Predicate::GreaterThan(target) => {
                matches!(V::compare(value, target), Some(Ordering::Greater))
            }
            Predicate::GreaterThanOrEquals(target) => matches!(
                V::compare(value, target),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::LessThan(target) => {
                matches!(V::compare(value, target), Some(Ordering::Less))
            }
            Predicate::LessThanOrEquals(target) => matches!(
                V::compare(value, target),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::Range { lower, upper } => {
                let lower_ok = match lower {
                    Bound::Included(target) => matches!(
                        V::compare(value, target),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    Bound::Excluded(target) => {
                        matches!(V::compare(value, target), Some(Ordering::Greater))
                    }
                    Bound::Unbounded => true,
                };
                lower_ok
                    && match upper {
                        Bound::Included(target) => matches!(
                            V::compare(value, target),
                            Some(Ordering::Less | Ordering::Equal)
                        ),
                        Bound::Excluded(target) => {
                            matches!(V::compare(value, target), Some(Ordering::Less))
                        }
                        Bound::Unbounded => true,
                    }
            }
            Predicate::In(values) => values.iter().any(|target| V::equals(value, target)),
            Predicate::Like {
                pattern,
                case_insensitive,
            } => V::like(value, pattern, *case_insensitive),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(l: &Literal) -> Option<i64> {
        match l {
            Literal::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[test]
    fn integer_range_edges() {
        let op = Operator::Range {
            lower: Bound::Excluded(Literal::Int(10)),
            upper: Bound::Included(Literal::Int(20)),
        };
        let p = Predicate::<i64>::build(&op, int).unwrap();
        assert!(!p.matches(&10));
        assert!(p.matches(&11));
        assert!(p.matches(&20));
        assert!(!p.matches(&21));
    }

    #[test]
    fn null_literals_match_nothing() {
        let eq_null = Operator::Compare {
            op: CompareOp::Eq,
            value: Literal::Null,
        };
        let p = Predicate::<i64>::build(&eq_null, int).unwrap();
        assert!(!p.matches(&0));

        let in_nulls = Operator::In(vec![Literal::Null, Literal::Int(3)]);
        let p = Predicate::<i64>::build(&in_nulls, int).unwrap();
        assert!(p.matches(&3));
        assert!(!p.matches(&0));
    }

    #[test]
    fn unconvertible_literal_is_rejected() {
        let op = Operator::Compare {
            op: CompareOp::Eq,
            value: Literal::Utf8("x".into()),
        };
        assert!(Predicate::<i64>::build(&op, int).is_none());
    }

    #[test]
    fn float_nan_sorts_last() {
        let p = Predicate::<f64>::GreaterThan(1.0e300);
        assert!(p.matches(&f64::NAN));
        assert!(Predicate::<f64>::Equals(f64::NAN).matches(&f64::NAN));
        assert!(!Predicate::<f64>::LessThan(f64::INFINITY).matches(&f64::NAN));
    }

    #[test]
    fn text_patterns() {
        let op = Operator::Pattern {
            kind: PatternKind::StartsWith,
            target: PatternTarget::Literal("a_".into()),
            case_insensitive: false,
        };
        let p = Predicate::<String>::build(&op, |_| None).unwrap();
        assert!(p.matches("a_bc"));
        assert!(!p.matches("abc"));
    }
}
