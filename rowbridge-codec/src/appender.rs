//! Row-to-column conversion: one appender per projected column.
//!
//! An appender wraps the Arrow builder chosen at bind time and accepts row
//! datums one at a time. `finish` hands back the column array and leaves the
//! appender empty and ready for the next batch.

use std::sync::Arc;

use arrow::array::{
    ArrayBuilder, ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder,
    DictionaryArray, FixedSizeBinaryBuilder, Float32Builder, Float64Builder, Int8Builder,
    Int16Builder, Int32Builder, Int64Builder, IntervalMonthDayNanoBuilder, ListArray,
    StringArray, StringBuilder, Time64MicrosecondBuilder, TimestampMicrosecondBuilder,
    UInt8Array, UInt16Array, UInt32Array,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{Field, UInt8Type, UInt16Type, UInt32Type};
use rowbridge_result::{Error, Result};
use rowbridge_types::{Datum, EnumDictionary, EnumKeyWidth, RowType};

use crate::array::parse_array;
use crate::enums::enum_oid_to_key;
use crate::mapping::{ColumnKind, DecimalWidth, UTC};
use crate::numeric::NumericVar;
use crate::scratch::ScratchPool;
use crate::text::text_value;
use crate::temporal;
use crate::varlena::{ToastFetcher, detoast};

/// Borrowed services a conversion may need.
pub struct DecodeContext<'a> {
    pub toast: &'a dyn ToastFetcher,
    pub pool: &'a ScratchPool,
}

impl<'a> DecodeContext<'a> {
    pub fn new(toast: &'a dyn ToastFetcher, pool: &'a ScratchPool) -> Self {
        Self { toast, pool }
    }

    /// Payload of a varlena datum, detoasted into the batch pool when needed.
    pub fn payload<'d>(&self, datum: &'d Datum) -> Result<&'d [u8]>
    where
        'a: 'd,
    {
        detoast(datum.bytes()?, self.toast, self.pool)
    }
}

/// Builder for one output column.
pub enum ColumnAppender {
    Bool(BooleanBuilder),
    Char(Int8Builder),
    Int2(Int16Builder),
    Int4(Int32Builder),
    Int8(Int64Builder),
    Float4(Float32Builder),
    Float8(Float64Builder),
    Decimal {
        builder: Decimal128Builder,
        scale: i8,
        width: DecimalWidth,
    },
    NumericAsDouble(Float64Builder),
    Text {
        builder: StringBuilder,
        trim_padding: bool,
    },
    Bytea(BinaryBuilder),
    Date(Date32Builder),
    Time(Time64MicrosecondBuilder),
    Timestamp(TimestampMicrosecondBuilder),
    Interval(IntervalMonthDayNanoBuilder),
    Uuid(FixedSizeBinaryBuilder),
    Enum {
        dict: Arc<EnumDictionary>,
        keys: Vec<Option<u32>>,
    },
    List(Box<ListAppender>),
}

/// Nested list builder for array columns.
///
/// `offsets[0]` holds one entry per row; deeper levels hold one entry per
/// sub-list. Only the outermost level can be NULL.
pub struct ListAppender {
    element_type: RowType,
    ndims: usize,
    offsets: Vec<Vec<i32>>,
    validity: Vec<bool>,
    element: ColumnAppender,
}

fn decimal_to_scale(value: i128, from: i32, to: i8) -> Result<i128> {
    let to = i32::from(to);
    if from == to {
        return Ok(value);
    }
    if from > to {
        return Err(Error::overflow(format_args!(
            "numeric with scale {from} does not fit a column of scale {to}"
        )));
    }
    10i128
        .checked_pow((to - from) as u32)
        .and_then(|f| value.checked_mul(f))
        .ok_or_else(|| Error::overflow(format_args!("rescaling {value} to scale {to}")))
}

impl ColumnAppender {
    pub fn new(kind: &ColumnKind, capacity: usize) -> Result<Self> {
        Ok(match kind {
            ColumnKind::Bool => ColumnAppender::Bool(BooleanBuilder::with_capacity(capacity)),
            ColumnKind::Char => ColumnAppender::Char(Int8Builder::with_capacity(capacity)),
            ColumnKind::Int2 => ColumnAppender::Int2(Int16Builder::with_capacity(capacity)),
            ColumnKind::Int4 => ColumnAppender::Int4(Int32Builder::with_capacity(capacity)),
            ColumnKind::Int8 => ColumnAppender::Int8(Int64Builder::with_capacity(capacity)),
            ColumnKind::Float4 => ColumnAppender::Float4(Float32Builder::with_capacity(capacity)),
            ColumnKind::Float8 => ColumnAppender::Float8(Float64Builder::with_capacity(capacity)),
            ColumnKind::Decimal {
                precision,
                scale,
                width,
            } => ColumnAppender::Decimal {
                builder: Decimal128Builder::with_capacity(capacity)
                    .with_precision_and_scale(*precision, *scale)?,
                scale: *scale,
                width: *width,
            },
            ColumnKind::NumericAsDouble => {
                ColumnAppender::NumericAsDouble(Float64Builder::with_capacity(capacity))
            }
            ColumnKind::Text { trim_padding } => ColumnAppender::Text {
                builder: StringBuilder::with_capacity(capacity, capacity * 8),
                trim_padding: *trim_padding,
            },
            ColumnKind::Bytea => {
                ColumnAppender::Bytea(BinaryBuilder::with_capacity(capacity, capacity * 8))
            }
            ColumnKind::Date => ColumnAppender::Date(Date32Builder::with_capacity(capacity)),
            ColumnKind::Time => {
                ColumnAppender::Time(Time64MicrosecondBuilder::with_capacity(capacity))
            }
            ColumnKind::Timestamp => {
                ColumnAppender::Timestamp(TimestampMicrosecondBuilder::with_capacity(capacity))
            }
            ColumnKind::TimestampTz => ColumnAppender::Timestamp(
                TimestampMicrosecondBuilder::with_capacity(capacity).with_timezone(UTC),
            ),
            ColumnKind::Interval => {
                ColumnAppender::Interval(IntervalMonthDayNanoBuilder::with_capacity(capacity))
            }
            ColumnKind::Uuid => {
                ColumnAppender::Uuid(FixedSizeBinaryBuilder::with_capacity(capacity, 16))
            }
            ColumnKind::Enum(dict) => ColumnAppender::Enum {
                dict: Arc::clone(dict),
                keys: Vec::with_capacity(capacity),
            },
            ColumnKind::List {
                element,
                element_type,
                ndims,
            } => {
                let mut offsets = vec![vec![0i32]; *ndims];
                offsets[0].reserve(capacity);
                ColumnAppender::List(Box::new(ListAppender {
                    element_type: element_type.clone(),
                    ndims: *ndims,
                    offsets,
                    validity: Vec::with_capacity(capacity),
                    element: ColumnAppender::new(element, capacity)?,
                }))
            }
        })
    }

    /// Rows appended since the last `finish`.
    pub fn len(&self) -> usize {
        match self {
            ColumnAppender::Bool(b) => b.len(),
            ColumnAppender::Char(b) => b.len(),
            ColumnAppender::Int2(b) => b.len(),
            ColumnAppender::Int4(b) => b.len(),
            ColumnAppender::Int8(b) => b.len(),
            ColumnAppender::Float4(b) => b.len(),
            ColumnAppender::Float8(b) | ColumnAppender::NumericAsDouble(b) => b.len(),
            ColumnAppender::Decimal { builder, .. } => builder.len(),
            ColumnAppender::Text { builder, .. } => builder.len(),
            ColumnAppender::Bytea(b) => b.len(),
            ColumnAppender::Date(b) => b.len(),
            ColumnAppender::Time(b) => b.len(),
            ColumnAppender::Timestamp(b) => b.len(),
            ColumnAppender::Interval(b) => b.len(),
            ColumnAppender::Uuid(b) => b.len(),
            ColumnAppender::Enum { keys, .. } => keys.len(),
            ColumnAppender::List(l) => l.validity.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append_null(&mut self) {
        match self {
            ColumnAppender::Bool(b) => b.append_null(),
            ColumnAppender::Char(b) => b.append_null(),
            ColumnAppender::Int2(b) => b.append_null(),
            ColumnAppender::Int4(b) => b.append_null(),
            ColumnAppender::Int8(b) => b.append_null(),
            ColumnAppender::Float4(b) => b.append_null(),
            ColumnAppender::Float8(b) | ColumnAppender::NumericAsDouble(b) => b.append_null(),
            ColumnAppender::Decimal { builder, .. } => builder.append_null(),
            ColumnAppender::Text { builder, .. } => builder.append_null(),
            ColumnAppender::Bytea(b) => b.append_null(),
            ColumnAppender::Date(b) => b.append_null(),
            ColumnAppender::Time(b) => b.append_null(),
            ColumnAppender::Timestamp(b) => b.append_null(),
            ColumnAppender::Interval(b) => b.append_null(),
            ColumnAppender::Uuid(b) => b.append_null(),
            ColumnAppender::Enum { keys, .. } => keys.push(None),
            ColumnAppender::List(l) => l.append_null(),
        }
    }

    /// Convert one row value and append it. `None` appends NULL.
    pub fn append(&mut self, datum: Option<&Datum>, ctx: &DecodeContext<'_>) -> Result<()> {
        let Some(datum) = datum else {
            self.append_null();
            return Ok(());
        };
        match self {
            ColumnAppender::Bool(b) => b.append_value(datum.as_bool()?),
            ColumnAppender::Char(b) => b.append_value(datum.as_char()?),
            ColumnAppender::Int2(b) => b.append_value(datum.as_i16()?),
            ColumnAppender::Int4(b) => b.append_value(datum.as_i32()?),
            ColumnAppender::Int8(b) => b.append_value(datum.as_i64()?),
            ColumnAppender::Float4(b) => b.append_value(datum.as_f32()?),
            ColumnAppender::Float8(b) => b.append_value(datum.as_f64()?),
            ColumnAppender::Decimal {
                builder,
                scale,
                width,
            } => {
                let var = NumericVar::parse(ctx.payload(datum)?)?;
                let scaled = match width {
                    DecimalWidth::I16 => i128::from(var.to_scaled::<i16>()?),
                    DecimalWidth::I32 => i128::from(var.to_scaled::<i32>()?),
                    DecimalWidth::I64 => i128::from(var.to_scaled::<i64>()?),
                    DecimalWidth::I128 => var.to_scaled::<i128>()?,
                };
                builder.append_value(decimal_to_scale(scaled, var.dscale, *scale)?);
            }
            ColumnAppender::NumericAsDouble(b) => {
                b.append_value(NumericVar::parse(ctx.payload(datum)?)?.to_f64());
            }
            ColumnAppender::Text {
                builder,
                trim_padding,
            } => builder.append_value(text_value(ctx.payload(datum)?, *trim_padding)?),
            ColumnAppender::Bytea(b) => b.append_value(ctx.payload(datum)?),
            ColumnAppender::Date(b) => b.append_value(temporal::date_to_columnar(datum.as_i32()?)?),
            ColumnAppender::Time(b) => b.append_value(datum.as_i64()?),
            ColumnAppender::Timestamp(b) => {
                b.append_value(temporal::timestamp_to_columnar(datum.as_i64()?)?)
            }
            ColumnAppender::Interval(b) => {
                b.append_value(temporal::interval_to_columnar(datum.bytes()?)?)
            }
            ColumnAppender::Uuid(b) => b.append_value(datum.bytes()?)?,
            ColumnAppender::Enum { dict, keys } => {
                keys.push(Some(enum_oid_to_key(dict, datum.as_oid()?)?))
            }
            ColumnAppender::List(l) => l.append_array(datum, ctx)?,
        }
        Ok(())
    }

    /// Build the column array and reset for the next batch.
    pub fn finish(&mut self) -> Result<ArrayRef> {
        Ok(match self {
            ColumnAppender::Bool(b) => Arc::new(b.finish()),
            ColumnAppender::Char(b) => Arc::new(b.finish()),
            ColumnAppender::Int2(b) => Arc::new(b.finish()),
            ColumnAppender::Int4(b) => Arc::new(b.finish()),
            ColumnAppender::Int8(b) => Arc::new(b.finish()),
            ColumnAppender::Float4(b) => Arc::new(b.finish()),
            ColumnAppender::Float8(b) | ColumnAppender::NumericAsDouble(b) => Arc::new(b.finish()),
            ColumnAppender::Decimal { builder, .. } => Arc::new(builder.finish()),
            ColumnAppender::Text { builder, .. } => Arc::new(builder.finish()),
            ColumnAppender::Bytea(b) => Arc::new(b.finish()),
            ColumnAppender::Date(b) => Arc::new(b.finish()),
            ColumnAppender::Time(b) => Arc::new(b.finish()),
            ColumnAppender::Timestamp(b) => Arc::new(b.finish()),
            ColumnAppender::Interval(b) => Arc::new(b.finish()),
            ColumnAppender::Uuid(b) => Arc::new(b.finish()),
            ColumnAppender::Enum { dict, keys } => {
                let keys = std::mem::take(keys);
                finish_enum(dict, keys)?
            }
            ColumnAppender::List(l) => l.finish()?,
        })
    }
}

fn finish_enum(dict: &EnumDictionary, keys: Vec<Option<u32>>) -> Result<ArrayRef> {
    let values: ArrayRef = Arc::new(StringArray::from_iter_values(
        dict.members().iter().map(|m| m.label.as_str()),
    ));
    Ok(match dict.key_width() {
        EnumKeyWidth::U8 => {
            let keys: UInt8Array = keys.into_iter().map(|k| k.map(|k| k as u8)).collect();
            Arc::new(DictionaryArray::<UInt8Type>::try_new(keys, values)?)
        }
        EnumKeyWidth::U16 => {
            let keys: UInt16Array = keys.into_iter().map(|k| k.map(|k| k as u16)).collect();
            Arc::new(DictionaryArray::<UInt16Type>::try_new(keys, values)?)
        }
        EnumKeyWidth::U32 => {
            let keys: UInt32Array = keys.into_iter().collect();
            Arc::new(DictionaryArray::<UInt32Type>::try_new(keys, values)?)
        }
    })
}

impl ListAppender {
    fn push_list(&mut self, level: usize, len: usize) -> Result<()> {
        let offsets = &mut self.offsets[level];
        let last = *offsets.last().unwrap_or(&0);
        let len = i32::try_from(len).map_err(|_| Error::overflow("list longer than i32::MAX"))?;
        let next = last
            .checked_add(len)
            .ok_or_else(|| Error::overflow("list offsets exceed i32::MAX"))?;
        offsets.push(next);
        Ok(())
    }

    fn append_null(&mut self) {
        let last = *self.offsets[0].last().unwrap_or(&0);
        self.offsets[0].push(last);
        self.validity.push(false);
    }

    fn append_array(&mut self, datum: &Datum, ctx: &DecodeContext<'_>) -> Result<()> {
        let payload = ctx.payload(datum)?;
        let array = parse_array(payload, &self.element_type)?;

        if array.ndim() == 0 {
            self.push_list(0, 0)?;
            self.validity.push(true);
            return Ok(());
        }
        if array.ndim() != self.ndims {
            return Err(Error::InvalidArgumentError(format!(
                "array has {} dimensions, column declares {}",
                array.ndim(),
                self.ndims
            )));
        }

        // Level d holds prod(dims[..d]) lists, each of length dims[d].
        let mut lists_at_level = 1usize;
        for (level, &len) in array.dims.iter().enumerate() {
            for _ in 0..lists_at_level {
                self.push_list(level, len)?;
            }
            lists_at_level *= len;
        }
        for element in &array.elements {
            self.element.append(element.as_ref(), ctx)?;
        }
        self.validity.push(true);
        Ok(())
    }

    fn finish(&mut self) -> Result<ArrayRef> {
        let mut values = self.element.finish()?;
        for level in (0..self.ndims).rev() {
            let offsets = std::mem::replace(&mut self.offsets[level], vec![0]);
            let nulls = if level == 0 {
                let validity = std::mem::take(&mut self.validity);
                Some(NullBuffer::from(validity)).filter(|n| n.null_count() > 0)
            } else {
                None
            };
            let field = Arc::new(Field::new("item", values.data_type().clone(), true));
            values = Arc::new(ListArray::try_new(
                field,
                OffsetBuffer::new(offsets.into()),
                values,
                nulls,
            )?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::build_array;
    use crate::mapping::{MappingOptions, NoEnums, bind_column};
    use crate::varlena::{NoToast, make_varlena};
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{Decimal128Type, Int32Type};
    use rowbridge_types::ColumnDesc;

    fn appender(ty: RowType) -> ColumnAppender {
        let kind = bind_column(&ColumnDesc::new("c", ty), &NoEnums, &MappingOptions::default())
            .unwrap();
        ColumnAppender::new(&kind, 4).unwrap()
    }

    fn numeric(s: &str) -> Datum {
        let var: NumericVar = s.parse().unwrap();
        Datum::from_bytes(make_varlena(&var.to_bytes().unwrap()))
    }

    #[test]
    fn decimals_land_at_column_scale() {
        let pool = ScratchPool::new();
        let ctx = DecodeContext::new(&NoToast, &pool);
        let mut app = appender(RowType::numeric(9, 2));
        app.append(Some(&numeric("123.45")), &ctx).unwrap();
        app.append(None, &ctx).unwrap();
        app.append(Some(&numeric("-0.05")), &ctx).unwrap();
        let arr = app.finish().unwrap();
        let dec = arr.as_primitive::<Decimal128Type>();
        assert_eq!(dec.value(0), 12_345);
        assert!(dec.is_null(1));
        assert_eq!(dec.value(2), -5);
        assert_eq!(dec.scale(), 2);
        assert!(app.is_empty());
    }

    #[test]
    fn bpchar_is_trimmed() {
        let pool = ScratchPool::new();
        let ctx = DecodeContext::new(&NoToast, &pool);
        let mut app = appender(RowType::Bpchar);
        app.append(Some(&Datum::from_bytes(make_varlena(b"ab   "))), &ctx)
            .unwrap();
        let arr = app.finish().unwrap();
        assert_eq!(arr.as_string::<i32>().value(0), "ab");
    }

    #[test]
    fn nested_arrays_become_nested_lists() {
        let pool = ScratchPool::new();
        let ctx = DecodeContext::new(&NoToast, &pool);
        let mut app = appender(RowType::array_of(RowType::Int4, 2));
        let elements: Vec<Option<Datum>> = (1..=4).map(|v| Some(Datum::from_i32(v))).collect();
        let arr_bytes = build_array(&elements, &[2, 2], &RowType::Int4).unwrap();
        app.append(Some(&Datum::from_bytes(arr_bytes)), &ctx).unwrap();
        app.append(None, &ctx).unwrap();
        let empty = build_array(&[], &[0], &RowType::Int4).unwrap();
        app.append(Some(&Datum::from_bytes(empty)), &ctx).unwrap();

        let arr = app.finish().unwrap();
        let outer = arr.as_list::<i32>();
        assert_eq!(outer.len(), 3);
        assert!(outer.is_null(1));
        assert_eq!(outer.value(2).len(), 0);
        let rows = outer.value(0);
        let inner = rows.as_list::<i32>();
        assert_eq!(inner.len(), 2);
        let second = inner.value(1);
        let second = second.as_primitive::<Int32Type>();
        assert_eq!(second.values().to_vec(), vec![3, 4]);
    }

    #[test]
    fn array_dimension_mismatch_is_rejected() {
        let pool = ScratchPool::new();
        let ctx = DecodeContext::new(&NoToast, &pool);
        let mut app = appender(RowType::array_of(RowType::Int4, 1));
        let elements: Vec<Option<Datum>> = (1..=4).map(|v| Some(Datum::from_i32(v))).collect();
        let arr_bytes = build_array(&elements, &[2, 2], &RowType::Int4).unwrap();
        assert!(app.append(Some(&Datum::from_bytes(arr_bytes)), &ctx).is_err());
    }
}
