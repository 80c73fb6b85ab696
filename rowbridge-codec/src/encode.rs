//! Column-to-row conversion.
//!
//! Produces row-store datums from Arrow values, the direction used when
//! columnar results are written back into the row store. Scalars are
//! converted one at a time; list values are first measured to fix their
//! shape, then flattened into a buffer sized for exactly that many elements.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    Date32Type, Decimal128Type, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type,
    Int64Type, IntervalMonthDayNanoType, Time64MicrosecondType, TimestampMicrosecondType,
};
use rowbridge_result::{Error, Result};
use rowbridge_types::{Datum, RowType};

use crate::array::{MAX_DIMS, build_array, element_count};
use crate::enums::enum_key_to_oid;
use crate::mapping::EnumCatalog;
use crate::numeric::NumericVar;
use crate::temporal;
use crate::varlena::make_varlena;

fn mismatch(array: &dyn Array, ty: &RowType) -> Error {
    Error::InvalidArgumentError(format!(
        "cannot convert {} values into a {ty} column",
        array.data_type()
    ))
}

macro_rules! primitive {
    ($array:expr, $ty:expr, $arrow:ty, $row:expr) => {
        $array
            .as_primitive_opt::<$arrow>()
            .ok_or_else(|| mismatch($array, $ty))?
            .value($row)
    };
}

/// Convert `array[row]` into a datum for a column of type `ty`.
pub fn encode_value(
    array: &dyn Array,
    row: usize,
    ty: &RowType,
    enums: &dyn EnumCatalog,
) -> Result<Option<Datum>> {
    if array.is_null(row) {
        return Ok(None);
    }
    let datum = match ty {
        RowType::Bool => Datum::from_bool(
            array
                .as_boolean_opt()
                .ok_or_else(|| mismatch(array, ty))?
                .value(row),
        ),
        RowType::Char => Datum::from_char(primitive!(array, ty, Int8Type, row)),
        RowType::Int2 => Datum::from_i16(primitive!(array, ty, Int16Type, row)),
        RowType::Int4 => Datum::from_i32(primitive!(array, ty, Int32Type, row)),
        RowType::Int8 => Datum::from_i64(primitive!(array, ty, Int64Type, row)),
        RowType::Float4 => Datum::from_f32(primitive!(array, ty, Float32Type, row)),
        RowType::Float8 => Datum::from_f64(primitive!(array, ty, Float64Type, row)),
        RowType::Numeric { .. } => {
            let var = if let Some(dec) = array.as_primitive_opt::<Decimal128Type>() {
                let scale = u8::try_from(dec.scale()).map_err(|_| {
                    Error::InvalidArgumentError(format!(
                        "negative decimal scale {} is not supported",
                        dec.scale()
                    ))
                })?;
                NumericVar::from_scaled_i128(dec.value(row), scale)
            } else {
                NumericVar::from_f64(primitive!(array, ty, Float64Type, row))
            };
            Datum::from_bytes(make_varlena(&var.to_bytes()?))
        }
        RowType::Text | RowType::Varchar | RowType::Bpchar | RowType::Json => {
            let s = array
                .as_string_opt::<i32>()
                .ok_or_else(|| mismatch(array, ty))?
                .value(row);
            Datum::from_bytes(make_varlena(s.as_bytes()))
        }
        RowType::Bytea => {
            let b = array
                .as_binary_opt::<i32>()
                .ok_or_else(|| mismatch(array, ty))?
                .value(row);
            Datum::from_bytes(make_varlena(b))
        }
        RowType::Date => Datum::from_i32(temporal::date_from_columnar(primitive!(
            array, ty, Date32Type, row
        ))?),
        RowType::Time => Datum::from_i64(primitive!(array, ty, Time64MicrosecondType, row)),
        RowType::Timestamp | RowType::TimestampTz => Datum::from_i64(
            temporal::timestamp_from_columnar(primitive!(array, ty, TimestampMicrosecondType, row))?,
        ),
        RowType::Interval => Datum::from_bytes(
            temporal::interval_from_columnar(primitive!(array, ty, IntervalMonthDayNanoType, row))
                .to_vec(),
        ),
        RowType::Uuid => {
            let b = array
                .as_fixed_size_binary_opt()
                .filter(|a| a.value_length() == 16)
                .ok_or_else(|| mismatch(array, ty))?
                .value(row);
            Datum::from_bytes(b.to_vec())
        }
        RowType::Enum { type_id } => {
            let dict = enums.enum_dictionary(*type_id).ok_or(Error::NotFound)?;
            let keys = array
                .as_any_dictionary_opt()
                .ok_or_else(|| mismatch(array, ty))?
                .normalized_keys();
            Datum::from_oid(enum_key_to_oid(&dict, keys[row])?)
        }
        RowType::Array { element, ndims } => {
            return encode_list(array, row, element, *ndims, enums);
        }
    };
    Ok(Some(datum))
}

fn list_values(values: &dyn Array, ty: &RowType) -> Result<Vec<Option<ArrayRef>>> {
    let list = values
        .as_list_opt::<i32>()
        .ok_or_else(|| mismatch(values, ty))?;
    Ok((0..list.len())
        .map(|i| (!list.is_null(i)).then(|| list.value(i)))
        .collect())
}

/// Record the length of `values` at `depth`, then descend.
fn measure(values: &ArrayRef, depth: usize, dims: &mut [Option<usize>], ty: &RowType) -> Result<()> {
    let found = values.len();
    match dims[depth] {
        None => dims[depth] = Some(found),
        Some(expected) if expected != found => {
            return Err(Error::JaggedArrayInput {
                dimension: depth + 1,
                expected,
                found,
            });
        }
        Some(_) => {}
    }
    if depth + 1 < dims.len() {
        for child in list_values(values.as_ref(), ty)? {
            let child = child.ok_or_else(|| {
                Error::InvalidArgumentError(format!(
                    "list contains a NULL at intermediate dimension {}",
                    depth + 2
                ))
            })?;
            measure(&child, depth + 1, dims, ty)?;
        }
    }
    Ok(())
}

fn flatten(
    values: &ArrayRef,
    depth: usize,
    ndims: usize,
    element: &RowType,
    enums: &dyn EnumCatalog,
    out: &mut Vec<Option<Datum>>,
) -> Result<()> {
    if depth + 1 == ndims {
        for i in 0..values.len() {
            out.push(encode_value(values.as_ref(), i, element, enums)?);
        }
        return Ok(());
    }
    for child in list_values(values.as_ref(), element)?.into_iter().flatten() {
        flatten(&child, depth + 1, ndims, element, enums, out)?;
    }
    Ok(())
}

fn encode_list(
    array: &dyn Array,
    row: usize,
    element: &RowType,
    ndims: usize,
    enums: &dyn EnumCatalog,
) -> Result<Option<Datum>> {
    if ndims == 0 || ndims > MAX_DIMS {
        return Err(Error::InvalidArgumentError(format!(
            "unsupported array dimensionality {ndims}"
        )));
    }
    let list = array
        .as_list_opt::<i32>()
        .ok_or_else(|| mismatch(array, element))?;
    let top = list.value(row);

    let mut dims = vec![None; ndims];
    measure(&top, 0, &mut dims, element)?;
    // An empty list leaves the deeper dimensions unmeasured: that is an empty array.
    let dims: Vec<usize> = if dims.iter().any(|d| d.is_none_or(|n| n == 0)) {
        Vec::new()
    } else {
        dims.into_iter().flatten().collect()
    };

    let mut elements = Vec::with_capacity(if dims.is_empty() { 0 } else { element_count(&dims)? });
    if !dims.is_empty() {
        flatten(&top, 0, ndims, element, enums, &mut elements)?;
    }
    Ok(Some(Datum::from_bytes(build_array(&elements, &dims, element)?)))
}
