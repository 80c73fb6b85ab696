use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Decimal128Array, DictionaryArray,
    FixedSizeBinaryArray, Int32Builder, Int64Array, ListBuilder, StringArray,
    TimestampMicrosecondArray, UInt8Array,
};
use arrow::datatypes::{DataType, UInt8Type};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rowbridge::codec::{EnumCatalog, encode_value};
use rowbridge::heap::{HeapRelation, MemHeap};
use rowbridge::types::{ColumnDesc, EnumDictionary, EnumMember, RowType, TupleDesc};
use rowbridge::{
    CompareOp, Expr, Filter, Literal, Operator, ScanOptions, ScanPlan, ScanRequest, collect,
    execute,
};
use rowbridge_test_utils::init_tracing_for_tests;

const ROWS: usize = 300;
const MOOD_TYPE: u32 = 70_001;
const MOODS: [&str; 3] = ["sad", "ok", "happy"];

fn mood_dictionary() -> EnumDictionary {
    let members = MOODS
        .iter()
        .enumerate()
        .map(|(i, label)| EnumMember {
            oid: 80_000 + (i as u32) * 7,
            label: label.to_string(),
        })
        .collect();
    EnumDictionary::new(MOOD_TYPE, "mood", members)
}

fn desc() -> TupleDesc {
    TupleDesc::new(vec![
        ColumnDesc::new("id", RowType::Int8),
        ColumnDesc::new("name", RowType::Text),
        ColumnDesc::new("price", RowType::numeric(18, 4)),
        ColumnDesc::new("day", RowType::Date),
        ColumnDesc::new("at", RowType::Timestamp),
        ColumnDesc::new("flag", RowType::Bool),
        ColumnDesc::new("token", RowType::Uuid),
        ColumnDesc::new("mood", RowType::Enum { type_id: MOOD_TYPE }),
        ColumnDesc::new("grid", RowType::array_of(RowType::Int4, 2)),
    ])
}

fn source_batch(rng: &mut StdRng) -> Vec<ArrayRef> {
    let ids: Vec<i64> = (0..ROWS as i64).collect();
    let names: Vec<Option<String>> = (0..ROWS)
        .map(|i| (i % 11 != 0).then(|| format!("item-{i:03}")))
        .collect();
    let prices: Vec<Option<i128>> = (0..ROWS)
        .map(|i| {
            (i % 13 != 0).then(|| i128::from(rng.random_range(-100_000_000_000_000i64..100_000_000_000_000)))
        })
        .collect();
    let days: Vec<i32> = (0..ROWS).map(|_| rng.random_range(-40_000..40_000)).collect();
    let ats: Vec<i64> = (0..ROWS)
        .map(|_| rng.random_range(-2_208_988_800_000_000i64..4_102_444_800_000_000))
        .collect();
    let flags: Vec<bool> = (0..ROWS).map(|i| i % 3 == 0).collect();
    let tokens: Vec<[u8; 16]> = (0..ROWS).map(|_| rng.random::<[u8; 16]>()).collect();
    let moods = UInt8Array::from((0..ROWS).map(|i| (i % MOODS.len()) as u8).collect::<Vec<_>>());

    let mut grid = ListBuilder::new(ListBuilder::new(Int32Builder::new()));
    for i in 0..ROWS as i32 {
        for r in 0..2 {
            for c in 0..3 {
                grid.values().values().append_value(i * 10 + r * 3 + c);
            }
            grid.values().append(true);
        }
        grid.append(true);
    }

    vec![
        Arc::new(Int64Array::from(ids)),
        Arc::new(StringArray::from(names)),
        Arc::new(
            Decimal128Array::from(prices)
                .with_precision_and_scale(18, 4)
                .unwrap(),
        ),
        Arc::new(Date32Array::from(days)),
        Arc::new(TimestampMicrosecondArray::from(ats)),
        Arc::new(BooleanArray::from(flags)),
        Arc::new(FixedSizeBinaryArray::try_from_iter(tokens.into_iter()).unwrap()),
        Arc::new(
            DictionaryArray::<UInt8Type>::try_new(moods, Arc::new(StringArray::from(MOODS.to_vec())))
                .unwrap(),
        ),
        Arc::new(grid.finish()),
    ]
}

/// Heap filled by encoding every source value into its row-store form.
fn load(columns: &[ArrayRef]) -> MemHeap {
    let heap = MemHeap::new(20_000, "public.wide", desc())
        .with_tuples_per_page(16)
        .with_enum(mood_dictionary());
    let desc = heap.tuple_desc().clone();
    for row in 0..ROWS {
        let values = columns
            .iter()
            .zip(desc.columns())
            .map(|(array, column)| encode_value(array.as_ref(), row, &column.ty, heap.enums()))
            .collect::<rowbridge::Result<Vec<_>>>()
            .unwrap();
        heap.insert_frozen(values).unwrap();
    }
    heap
}

fn scan(heap: Arc<MemHeap>, filters: Vec<Expr>, threads: usize) -> Vec<RecordBatch> {
    let snapshot = heap.txn_manager().read_snapshot();
    let mut request = ScanRequest::new(heap, snapshot);
    request.filters = filters;
    let options = ScanOptions {
        batch_capacity: 50,
        max_threads: threads,
        ..ScanOptions::default()
    };
    let plan = ScanPlan::bind(request, options).unwrap();
    if threads == 1 {
        collect(&plan).unwrap()
    } else {
        execute(&plan).unwrap()
    }
}

#[test]
fn values_survive_row_store_and_back() {
    init_tracing_for_tests();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let columns = source_batch(&mut rng);
    let heap = Arc::new(load(&columns));
    let batches = scan(Arc::clone(&heap), vec![], 1);
    let schema = batches[0].schema();
    assert_eq!(schema.field(2).data_type(), &DataType::Decimal128(18, 4));
    assert_eq!(
        schema.field(7).data_type(),
        &DataType::Dictionary(Box::new(DataType::UInt8), Box::new(DataType::Utf8))
    );
    let out = arrow::compute::concat_batches(&schema, &batches).unwrap();
    assert_eq!(out.num_rows(), ROWS);

    for (i, source) in columns.iter().enumerate() {
        if i == 7 {
            continue;
        }
        assert_eq!(out.column(i).as_ref(), source.as_ref(), "column {}", schema.field(i).name());
    }
    let moods = out.column(7).as_dictionary::<UInt8Type>();
    let expected = columns[7].as_dictionary::<UInt8Type>();
    assert_eq!(moods.keys(), expected.keys());
    let labels = moods.values().as_string::<i32>();
    for (pos, label) in MOODS.iter().enumerate() {
        assert_eq!(labels.value(pos), *label);
    }
    assert_eq!(heap.outstanding_pins(), 0);
}

#[test]
fn pushed_filters_match_direct_evaluation() {
    let mut rng = StdRng::seed_from_u64(42);
    let columns = source_batch(&mut rng);
    let heap = Arc::new(load(&columns));

    let names = columns[1].as_string::<i32>();
    let days = columns[3].as_primitive::<arrow::datatypes::Date32Type>();
    let flags = columns[5].as_boolean();

    let filters = vec![
        Expr::any_of(vec![
            Filter::new(
                1,
                Operator::Pattern {
                    kind: rowbridge::PatternKind::EndsWith,
                    target: rowbridge::PatternTarget::Literal("7".into()),
                    case_insensitive: false,
                },
            ),
            Filter::compare(5, CompareOp::Eq, true),
        ]),
        Expr::Pred(Filter::compare(3, CompareOp::GtEq, Literal::Date32(0))),
    ];
    let expected: Vec<i64> = (0..ROWS)
        .filter(|&i| {
            let ends = names.is_valid(i) && names.value(i).ends_with('7');
            (ends || flags.value(i)) && days.value(i) >= 0
        })
        .map(|i| i as i64)
        .collect();

    let batches = scan(heap, filters, 3);
    let mut got: Vec<i64> = batches
        .iter()
        .flat_map(|b| b.column(0).as_primitive::<arrow::datatypes::Int64Type>().values().to_vec())
        .collect();
    got.sort_unstable();
    assert_eq!(got, expected);
}
