//! The value evaluator must agree with evaluating the same predicate on the
//! decoded columnar value of every row.

use std::ops::Bound;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{Date32Type, Decimal128Type, Int64Type};
use rowbridge_codec::varlena::make_varlena;
use rowbridge_codec::{
    ColumnAppender, DecodeContext, MappingOptions, NoEnums, NoToast, NumericVar, ScratchPool,
    bind_column,
};
use rowbridge_expr::{
    CompareOp, Expr, Filter, Literal, Operator, PatternKind, PatternTarget, Translation, compile,
};
use rowbridge_test_utils::init_tracing_for_tests;
use rowbridge_types::{ColumnDesc, Datum, RowType, TupleDesc};

fn desc() -> TupleDesc {
    TupleDesc::new(vec![
        ColumnDesc::new("n", RowType::Int8),
        ColumnDesc::new("s", RowType::Text),
        ColumnDesc::new("d", RowType::numeric(9, 2)),
        ColumnDesc::new("day", RowType::Date),
    ])
}

fn rows() -> Vec<Vec<Option<Datum>>> {
    let words = ["apple", "Apricot", "banana", "grape_fruit", "100%", "", "cherry"];
    (0..70i64)
        .map(|i| {
            let null = i % 11 == 0;
            let n = (!null).then(|| Datum::from_i64(i * 7 - 200));
            let s = (i % 13 != 0)
                .then(|| Datum::from_bytes(make_varlena(words[i as usize % words.len()].as_bytes())));
            let d = (i % 17 != 0).then(|| {
                let var = NumericVar::from_scaled_i128(i128::from(i * 37 - 900), 2);
                Datum::from_bytes(make_varlena(&var.to_bytes().unwrap()))
            });
            // Row-store days since 2000-01-01.
            let day = Some(Datum::from_i32((i as i32 - 35) * 100));
            vec![n, s, d, day]
        })
        .collect()
}

/// Decode column `idx` of every row through the row-to-column path.
fn decode(idx: usize, rows: &[Vec<Option<Datum>>]) -> arrow::array::ArrayRef {
    let desc = desc();
    let kind = bind_column(
        desc.column(idx).unwrap(),
        &NoEnums,
        &MappingOptions::default(),
    )
    .unwrap();
    let pool = ScratchPool::new();
    let ctx = DecodeContext::new(&NoToast, &pool);
    let mut appender = ColumnAppender::new(&kind, rows.len()).unwrap();
    for row in rows {
        appender.append(row[idx].as_ref(), &ctx).unwrap();
    }
    appender.finish().unwrap()
}

fn evaluate(expr: &Expr, rows: &[Vec<Option<Datum>>]) -> Vec<bool> {
    let filter = match compile(expr, &desc()) {
        Translation::Pushed(f) => f,
        other => panic!("expected a compiled filter, got {other:?}"),
    };
    let pool = ScratchPool::new();
    let ctx = DecodeContext::new(&NoToast, &pool);
    rows.iter()
        .map(|row| filter.matches(row, &ctx).unwrap())
        .collect()
}

#[test]
fn integer_comparisons_agree() {
    init_tracing_for_tests();
    let rows = rows();
    let decoded = decode(0, &rows);
    let ints = decoded.as_primitive::<Int64Type>();

    let cases: Vec<(Operator, Box<dyn Fn(i64) -> bool>)> = vec![
        (
            Operator::Compare {
                op: CompareOp::Lt,
                value: Literal::Int(0),
            },
            Box::new(|v: i64| v < 0),
        ),
        (
            Operator::Compare {
                op: CompareOp::NotEq,
                value: Literal::Int(-18),
            },
            Box::new(|v: i64| v != -18),
        ),
        (
            Operator::Range {
                lower: Bound::Included(Literal::Int(-53)),
                upper: Bound::Excluded(Literal::Int(100)),
            },
            Box::new(|v: i64| (-53..100).contains(&v)),
        ),
        (
            Operator::In(vec![Literal::Int(-200), Literal::Int(3), Literal::Null]),
            Box::new(|v: i64| v == -200 || v == 3),
        ),
    ];

    for (op, reference) in cases {
        let got = evaluate(&Expr::Pred(Filter::new(0, op.clone())), &rows);
        for (row, matched) in got.iter().enumerate() {
            let expected = ints.is_valid(row) && reference(ints.value(row));
            assert_eq!(*matched, expected, "{op:?} row {row}");
        }
    }
}

#[test]
fn text_patterns_agree() {
    init_tracing_for_tests();
    let rows = rows();
    let decoded = decode(1, &rows);
    let strings = decoded.as_string::<i32>();

    let pattern = |kind, raw: &str, case_insensitive| Operator::Pattern {
        kind,
        target: PatternTarget::Literal(raw.to_string()),
        case_insensitive,
    };
    let cases: Vec<(Operator, Box<dyn Fn(&str) -> bool>)> = vec![
        (pattern(PatternKind::StartsWith, "ap", false), Box::new(|s: &str| s.starts_with("ap"))),
        (
            pattern(PatternKind::StartsWith, "ap", true),
            Box::new(|s: &str| s.to_lowercase().starts_with("ap")),
        ),
        (pattern(PatternKind::EndsWith, "%", false), Box::new(|s: &str| s.ends_with('%'))),
        (pattern(PatternKind::Contains, "e_f", false), Box::new(|s: &str| s.contains("e_f"))),
        (pattern(PatternKind::Like, "_a%", false), Box::new(|s: &str| s.chars().nth(1) == Some('a'))),
        (
            Operator::Compare {
                op: CompareOp::GtEq,
                value: Literal::from("banana"),
            },
            Box::new(|s: &str| s >= "banana"),
        ),
    ];

    for (op, reference) in cases {
        let got = evaluate(&Expr::Pred(Filter::new(1, op.clone())), &rows);
        for (row, matched) in got.iter().enumerate() {
            let expected = strings.is_valid(row) && reference(strings.value(row));
            assert_eq!(*matched, expected, "{op:?} row {row}");
        }
    }
}

#[test]
fn numeric_and_date_agree() {
    init_tracing_for_tests();
    let rows = rows();
    let decimals = decode(2, &rows);
    let decimals = decimals.as_primitive::<Decimal128Type>();
    let days = decode(3, &rows);
    let days = days.as_primitive::<Date32Type>();

    let expr = Expr::Or(vec![
        Expr::all_of(vec![
            Filter::compare(
                2,
                CompareOp::Gt,
                Literal::Decimal {
                    value: 155,
                    scale: 2,
                },
            ),
            Filter::compare(3, CompareOp::Lt, Literal::Date32(12_000)),
        ]),
        Expr::Pred(Filter::new(2, Operator::IsNull)),
    ]);
    let got = evaluate(&expr, &rows);
    for (row, matched) in got.iter().enumerate() {
        let left = decimals.is_valid(row)
            && decimals.value(row) > 155
            && days.is_valid(row)
            && days.value(row) < 12_000;
        let expected = left || decimals.is_null(row);
        assert_eq!(*matched, expected, "row {row}");
    }
}
