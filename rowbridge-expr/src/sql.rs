//! Textual translation of pushed-down predicates (row-store SQL dialect).
//!
//! The output is embedded in the `WHERE` clause of a delegated sub-query, so
//! every identifier is double-quoted and every string constant
//! single-quoted with the quote character doubled. Pattern functions become
//! `LIKE` with an explicit `ESCAPE '\'`.

use std::ops::Bound;

use rowbridge_codec::NumericVar;
use rowbridge_codec::temporal::{
    COLUMNAR_DATE_NEG_INF, COLUMNAR_DATE_POS_INF, COLUMNAR_TS_NEG_INF, COLUMNAR_TS_POS_INF,
};
use rowbridge_types::{MICROS_PER_DAY, RowType, TupleDesc};
use time::macros::format_description;
use time::{Date, Duration, PrimitiveDateTime, Time};
use tracing::debug;

use crate::Translation;
use crate::expr::{CompareOp, Expr, Filter, Operator, PatternKind, PatternTarget};
use crate::like::escape_like;
use crate::literal::Literal;

/// Translate `expr` into a SQL boolean expression over the columns of `desc`.
pub fn translate(expr: &Expr, desc: &TupleDesc) -> Translation<String> {
    match expr {
        Expr::And(children) => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                match translate(child, desc) {
                    Translation::Pushed(sql) => parts.push(sql),
                    Translation::Dropped => {}
                    unsupported @ Translation::Unsupported(_) => return unsupported,
                }
            }
            join(parts, " AND ")
        }
        Expr::Or(children) => {
            let mut parts = Vec::with_capacity(children.len());
            let mut dropped = false;
            for child in children {
                match translate(child, desc) {
                    Translation::Pushed(sql) => parts.push(sql),
                    Translation::Dropped => dropped = true,
                    unsupported @ Translation::Unsupported(_) => return unsupported,
                }
            }
            // A disjunct that is not applied could admit any row.
            if dropped {
                Translation::Dropped
            } else if parts.is_empty() {
                Translation::Pushed("FALSE".to_string())
            } else {
                join(parts, " OR ")
            }
        }
        Expr::Optional(inner) => match translate(inner, desc) {
            Translation::Unsupported(reason) => {
                debug!(%reason, "dropping optional filter");
                Translation::Dropped
            }
            other => other,
        },
        Expr::Pred(filter) => translate_filter(filter, desc),
    }
}

fn join(parts: Vec<String>, sep: &str) -> Translation<String> {
    match parts.len() {
        0 => Translation::Dropped,
        1 => Translation::Pushed(parts.into_iter().next().unwrap_or_default()),
        _ => Translation::Pushed(format!("({})", parts.join(sep))),
    }
}

fn translate_filter(filter: &Filter, desc: &TupleDesc) -> Translation<String> {
    let Some(column) = desc.column(filter.column) else {
        return Translation::Unsupported(format!("no column at position {}", filter.column));
    };
    let col = quote_ident(&column.name);
    let sql = match &filter.op {
        Operator::IsNull => format!("{col} IS NULL"),
        Operator::IsNotNull => format!("{col} IS NOT NULL"),
        Operator::Compare { op, value } => match literal_sql(value, &column.ty) {
            Some(lit) => format!("{col} {} {lit}", op.as_sql()),
            None => return unsupported_literal(value),
        },
        Operator::Range { lower, upper } => {
            let mut parts = Vec::with_capacity(2);
            for (bound, inclusive, exclusive) in [
                (lower, CompareOp::GtEq, CompareOp::Gt),
                (upper, CompareOp::LtEq, CompareOp::Lt),
            ] {
                let (op, value) = match bound {
                    Bound::Unbounded => continue,
                    Bound::Included(v) => (inclusive, v),
                    Bound::Excluded(v) => (exclusive, v),
                };
                match literal_sql(value, &column.ty) {
                    Some(lit) => parts.push(format!("{col} {} {lit}", op.as_sql())),
                    None => return unsupported_literal(value),
                }
            }
            match parts.len() {
                0 => format!("{col} IS NOT NULL"),
                1 => parts.remove(0),
                _ => format!("({})", parts.join(" AND ")),
            }
        }
        Operator::In(values) => {
            if values.is_empty() {
                return Translation::Pushed("FALSE".to_string());
            }
            let mut list = String::new();
            for (i, value) in values.iter().enumerate() {
                let Some(lit) = literal_sql(value, &column.ty) else {
                    return unsupported_literal(value);
                };
                if i > 0 {
                    list.push_str(", ");
                }
                list.push_str(&lit);
            }
            format!("{col} IN ({list})")
        }
        Operator::Pattern {
            kind,
            target,
            case_insensitive,
        } => {
            let PatternTarget::Literal(raw) = target else {
                return Translation::Unsupported(
                    "pattern target is not a constant string".to_string(),
                );
            };
            let pattern = match kind {
                PatternKind::Like => raw.clone(),
                PatternKind::StartsWith => format!("{}%", escape_like(raw)),
                PatternKind::EndsWith => format!("%{}", escape_like(raw)),
                PatternKind::Contains => format!("%{}%", escape_like(raw)),
            };
            let keyword = if *case_insensitive { "ILIKE" } else { "LIKE" };
            format!("{col} {keyword} {} ESCAPE '\\'", quote_literal(&pattern))
        }
        Operator::Opaque(what) => return Translation::Unsupported(what.clone()),
    };
    Translation::Pushed(sql)
}

fn unsupported_literal(value: &Literal) -> Translation<String> {
    Translation::Unsupported(format!("no SQL form for {} literal", value.type_name()))
}

/// `"name"` with embedded double quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `'text'` with embedded single quotes doubled.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// SQL constant for `value` compared against a column of type `column`.
/// `None` when the value has no faithful textual form.
fn literal_sql(value: &Literal, column: &RowType) -> Option<String> {
    Some(match value {
        Literal::Null => return None,
        Literal::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Literal::Int(v) => v.to_string(),
        Literal::Float(v) if v.is_nan() => "'NaN'::float8".to_string(),
        Literal::Float(v) if v.is_infinite() => {
            let sign = if *v > 0.0 { "" } else { "-" };
            format!("'{sign}Infinity'::float8")
        }
        Literal::Float(v) => format!("{v:?}::float8"),
        Literal::Decimal { value, scale } => {
            let var = if *scale >= 0 {
                NumericVar::from_scaled_i128(*value, *scale as u8)
            } else {
                let factor = 10i128.checked_pow(u32::from(scale.unsigned_abs()))?;
                NumericVar::from_scaled_i128(value.checked_mul(factor)?, 0)
            };
            format!("'{var}'::numeric")
        }
        Literal::Utf8(s) => quote_literal(s),
        Literal::Date32(days) => match *days {
            COLUMNAR_DATE_POS_INF => "'infinity'::date".to_string(),
            COLUMNAR_DATE_NEG_INF => "'-infinity'::date".to_string(),
            d => format!("'{}'::date", date_text(d)?),
        },
        Literal::TimestampMicros(micros) => {
            // Columnar timestamps are UTC; pin the zone for tz columns.
            let (zone, cast) = match column {
                RowType::TimestampTz => ("+00", "timestamptz"),
                _ => ("", "timestamp"),
            };
            match *micros {
                COLUMNAR_TS_POS_INF => format!("'infinity'::{cast}"),
                COLUMNAR_TS_NEG_INF => format!("'-infinity'::{cast}"),
                t => format!("'{}'::{cast}", timestamp_text(t, zone)?),
            }
        }
    })
}

/// Julian day number of 1970-01-01, the columnar day zero.
const UNIX_EPOCH_JULIAN_DAY: i32 = 2_440_588;

fn columnar_date(days: i32) -> Option<Date> {
    Date::from_julian_day(UNIX_EPOCH_JULIAN_DAY.checked_add(days)?).ok()
}

/// `YYYY-MM-DD` plus whether the year is before 1 AD, which the row store
/// writes as a positive year with a trailing ` BC`.
fn calendar_text(date: Date) -> (String, bool) {
    let (year, month, day) = date.to_calendar_date();
    let month = u8::from(month);
    if year > 0 {
        (format!("{year:04}-{month:02}-{day:02}"), false)
    } else {
        (format!("{:04}-{month:02}-{day:02}", 1 - year), true)
    }
}

fn date_text(days: i32) -> Option<String> {
    let (text, bc) = calendar_text(columnar_date(days)?);
    Some(if bc { format!("{text} BC") } else { text })
}

fn timestamp_text(micros: i64, zone: &str) -> Option<String> {
    let days = i32::try_from(micros.div_euclid(MICROS_PER_DAY)).ok()?;
    let stamp = PrimitiveDateTime::new(columnar_date(days)?, Time::MIDNIGHT)
        .checked_add(Duration::microseconds(micros.rem_euclid(MICROS_PER_DAY)))?;
    let clock = if stamp.microsecond() == 0 {
        stamp.time().format(format_description!("[hour]:[minute]:[second]"))
    } else {
        stamp
            .time()
            .format(format_description!("[hour]:[minute]:[second].[subsecond digits:6]"))
    }
    .ok()?;
    let (day, bc) = calendar_text(stamp.date());
    let era = if bc { " BC" } else { "" };
    Some(format!("{day} {clock}{zone}{era}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbridge_types::{ColumnDesc, RowType};

    fn desc() -> TupleDesc {
        TupleDesc::new(vec![
            ColumnDesc::new("id", RowType::Int4),
            ColumnDesc::new("we\"ird", RowType::Text),
            ColumnDesc::new("born", RowType::Date),
            ColumnDesc::new("price", RowType::numeric(10, 2)),
        ])
    }

    fn pushed(t: Translation<String>) -> String {
        match t {
            Translation::Pushed(s) => s,
            other => panic!("expected pushed translation, got {other:?}"),
        }
    }

    #[test]
    fn comparisons_and_quoting() {
        let e = Expr::all_of(vec![
            Filter::compare(0, CompareOp::GtEq, 5),
            Filter::compare(1, CompareOp::Eq, "it's"),
        ]);
        assert_eq!(
            pushed(translate(&e, &desc())),
            "(\"id\" >= 5 AND \"we\"\"ird\" = 'it''s')"
        );
    }

    #[test]
    fn range_decomposes_into_bounds() {
        let f = Filter::new(
            0,
            Operator::Range {
                lower: Bound::Excluded(Literal::Int(1)),
                upper: Bound::Included(Literal::Int(9)),
            },
        );
        assert_eq!(
            pushed(translate(&Expr::Pred(f), &desc())),
            "(\"id\" > 1 AND \"id\" <= 9)"
        );
        let open = Filter::new(
            0,
            Operator::Range {
                lower: Bound::Unbounded,
                upper: Bound::Excluded(Literal::Int(3)),
            },
        );
        assert_eq!(pushed(translate(&Expr::Pred(open), &desc())), "\"id\" < 3");
    }

    #[test]
    fn pattern_functions_escape_metacharacters() {
        let f = Filter::new(
            1,
            Operator::Pattern {
                kind: PatternKind::Contains,
                target: PatternTarget::Literal("5%_o'k".into()),
                case_insensitive: true,
            },
        );
        assert_eq!(
            pushed(translate(&Expr::Pred(f), &desc())),
            "\"we\"\"ird\" ILIKE '%5\\%\\_o''k%' ESCAPE '\\'"
        );

        let by_column = Filter::new(
            1,
            Operator::Pattern {
                kind: PatternKind::StartsWith,
                target: PatternTarget::Column(0),
                case_insensitive: false,
            },
        );
        assert!(matches!(
            translate(&Expr::Pred(by_column), &desc()),
            Translation::Unsupported(_)
        ));
    }

    #[test]
    fn typed_literals() {
        let e = Expr::all_of(vec![
            Filter::compare(2, CompareOp::Lt, Literal::Date32(0)),
            Filter::compare(
                3,
                CompareOp::Eq,
                Literal::Decimal {
                    value: -1250,
                    scale: 2,
                },
            ),
        ]);
        assert_eq!(
            pushed(translate(&e, &desc())),
            "(\"born\" < '1970-01-01'::date AND \"price\" = '-12.50'::numeric)"
        );
        assert_eq!(date_text(10957).as_deref(), Some("2000-01-01"));
        assert_eq!(date_text(-719_163).as_deref(), Some("0001-12-31 BC"));
        assert_eq!(
            timestamp_text(-1, "").as_deref(),
            Some("1969-12-31 23:59:59.999999")
        );
        assert_eq!(
            timestamp_text(86_400_000_000 + 3_723_000_000, "").as_deref(),
            Some("1970-01-02 01:02:03")
        );
    }

    #[test]
    fn timestamps_carry_the_zone_for_tz_columns() {
        let desc = TupleDesc::new(vec![
            ColumnDesc::new("at", RowType::Timestamp),
            ColumnDesc::new("at_tz", RowType::TimestampTz),
        ]);
        let noon = Literal::TimestampMicros(43_200_000_000);
        let plain = Expr::Pred(Filter::compare(0, CompareOp::Gt, noon.clone()));
        let zoned = Expr::Pred(Filter::compare(1, CompareOp::Gt, noon));
        assert_eq!(
            pushed(translate(&plain, &desc)),
            "\"at\" > '1970-01-01 12:00:00'::timestamp"
        );
        assert_eq!(
            pushed(translate(&zoned, &desc)),
            "\"at_tz\" > '1970-01-01 12:00:00+00'::timestamptz"
        );
        let forever = Expr::Pred(Filter::compare(
            1,
            CompareOp::Lt,
            Literal::TimestampMicros(COLUMNAR_TS_POS_INF),
        ));
        assert_eq!(
            pushed(translate(&forever, &desc)),
            "\"at_tz\" < 'infinity'::timestamptz"
        );
    }

    #[test]
    fn dates_outside_the_calendar_are_not_pushed() {
        assert_eq!(date_text(i32::MAX - 1), None);
        assert_eq!(timestamp_text(i64::MAX - 1, ""), None);
        let far = Expr::Pred(Filter::compare(2, CompareOp::Lt, Literal::Date32(i32::MAX - 1)));
        assert!(matches!(translate(&far, &desc()), Translation::Unsupported(_)));
    }

    #[test]
    fn optional_and_mandatory_failures() {
        let opaque = Expr::Pred(Filter::new(0, Operator::Opaque("dynamic filter".into())));
        let keep = Expr::Pred(Filter::new(0, Operator::IsNotNull));

        let with_optional = Expr::And(vec![keep.clone(), Expr::optional(opaque.clone())]);
        assert_eq!(pushed(translate(&with_optional, &desc())), "\"id\" IS NOT NULL");

        let mandatory = Expr::And(vec![keep.clone(), opaque.clone()]);
        assert!(matches!(
            translate(&mandatory, &desc()),
            Translation::Unsupported(ref r) if r == "dynamic filter"
        ));

        let or_dropped = Expr::Or(vec![keep, Expr::optional(opaque)]);
        assert_eq!(translate(&or_dropped, &desc()), Translation::Dropped);
    }

    #[test]
    fn empty_in_list_is_false() {
        let f = Filter::new(0, Operator::In(vec![]));
        assert_eq!(pushed(translate(&Expr::Pred(f), &desc())), "FALSE");
        let f = Filter::new(0, Operator::In(vec![Literal::Int(1), Literal::Int(2)]));
        assert_eq!(pushed(translate(&Expr::Pred(f), &desc())), "\"id\" IN (1, 2)");
    }
}
