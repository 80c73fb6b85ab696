//! Bind-time mapping from row-store column types to Arrow types.
//!
//! Every per-column decision (decimal width, double fallback for numerics
//! that do not fit a decimal, enum dictionary) is made here once, so value
//! conversion never has to choose a representation per value.

use std::sync::Arc;

use arrow::datatypes::{DataType, Field, TimeUnit};
use rowbridge_result::{Error, Result};
use rowbridge_types::{
    ColumnDesc, EnumDictionary, EnumKeyWidth, MAX_DECIMAL_PRECISION, RowType, TypeId, VARHDRSZ,
};

/// Timezone attached to timestamp-with-time-zone columns.
pub const UTC: &str = "UTC";

/// Native integer width a decimal is accumulated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalWidth {
    I16,
    I32,
    I64,
    I128,
}

impl DecimalWidth {
    pub fn for_precision(precision: u8) -> Self {
        match precision {
            0..=4 => DecimalWidth::I16,
            5..=9 => DecimalWidth::I32,
            10..=18 => DecimalWidth::I64,
            _ => DecimalWidth::I128,
        }
    }
}

/// Resolved conversion plan for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Bool,
    Char,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Decimal {
        precision: u8,
        scale: i8,
        width: DecimalWidth,
    },
    /// Numeric without a usable precision/scale, read as a double.
    NumericAsDouble,
    Text {
        trim_padding: bool,
    },
    Bytea,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    /// Enum with its member side vector attached.
    Enum(Arc<EnumDictionary>),
    List {
        element: Box<ColumnKind>,
        element_type: RowType,
        ndims: usize,
    },
}

/// Options that influence type mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingOptions {
    /// Read numerics without a fitting precision/scale as doubles instead of failing.
    pub convert_unsupported_numeric_to_double: bool,
}

/// Source of enum member lists.
pub trait EnumCatalog {
    fn enum_dictionary(&self, type_id: TypeId) -> Option<Arc<EnumDictionary>>;
}

/// Catalog without any enum types.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnums;

impl EnumCatalog for NoEnums {
    fn enum_dictionary(&self, _type_id: TypeId) -> Option<Arc<EnumDictionary>> {
        None
    }
}

/// Precision and scale packed in a numeric typmod, or `None` when unconstrained.
pub fn numeric_precision_scale(typmod: i32) -> Option<(i32, i32)> {
    if typmod < VARHDRSZ as i32 {
        return None;
    }
    let t = typmod - VARHDRSZ as i32;
    let precision = (t >> 16) & 0xffff;
    let scale = ((t & 0x7ff) ^ 1024) - 1024;
    Some((precision, scale))
}

fn numeric_kind(typmod: i32) -> Option<ColumnKind> {
    let (precision, scale) = numeric_precision_scale(typmod)?;
    let max = i32::from(MAX_DECIMAL_PRECISION);
    if !(1..=max).contains(&precision) || !(0..=max).contains(&scale) || scale > precision {
        return None;
    }
    let precision = precision as u8;
    Some(ColumnKind::Decimal {
        precision,
        scale: scale as i8,
        width: DecimalWidth::for_precision(precision),
    })
}

fn bind_type(
    column: &str,
    ty: &RowType,
    enums: &dyn EnumCatalog,
    options: &MappingOptions,
) -> Result<ColumnKind> {
    let unsupported = || Error::UnsupportedType {
        column: column.to_string(),
        type_name: ty.to_string(),
    };
    Ok(match ty {
        RowType::Bool => ColumnKind::Bool,
        RowType::Char => ColumnKind::Char,
        RowType::Int2 => ColumnKind::Int2,
        RowType::Int4 => ColumnKind::Int4,
        RowType::Int8 => ColumnKind::Int8,
        RowType::Float4 => ColumnKind::Float4,
        RowType::Float8 => ColumnKind::Float8,
        RowType::Numeric { typmod } => match numeric_kind(*typmod) {
            Some(kind) => kind,
            None if options.convert_unsupported_numeric_to_double => {
                tracing::warn!(column, %ty, "numeric has no fitting decimal type, reading as double");
                ColumnKind::NumericAsDouble
            }
            None => return Err(unsupported()),
        },
        RowType::Text | RowType::Varchar | RowType::Json => {
            ColumnKind::Text { trim_padding: false }
        }
        RowType::Bpchar => ColumnKind::Text { trim_padding: true },
        RowType::Bytea => ColumnKind::Bytea,
        RowType::Date => ColumnKind::Date,
        RowType::Time => ColumnKind::Time,
        RowType::Timestamp => ColumnKind::Timestamp,
        RowType::TimestampTz => ColumnKind::TimestampTz,
        RowType::Interval => ColumnKind::Interval,
        RowType::Uuid => ColumnKind::Uuid,
        RowType::Enum { type_id } => {
            ColumnKind::Enum(enums.enum_dictionary(*type_id).ok_or_else(unsupported)?)
        }
        RowType::Array { element, ndims } => {
            if matches!(element.as_ref(), RowType::Array { .. }) || *ndims == 0 {
                return Err(unsupported());
            }
            ColumnKind::List {
                element: Box::new(bind_type(column, element, enums, options)?),
                element_type: element.as_ref().clone(),
                ndims: *ndims,
            }
        }
    })
}

/// Resolve the conversion plan for `column`.
pub fn bind_column(
    column: &ColumnDesc,
    enums: &dyn EnumCatalog,
    options: &MappingOptions,
) -> Result<ColumnKind> {
    bind_type(&column.name, &column.ty, enums, options)
}

fn list_of(inner: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", inner, true)))
}

impl ColumnKind {
    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnKind::Bool => DataType::Boolean,
            ColumnKind::Char => DataType::Int8,
            ColumnKind::Int2 => DataType::Int16,
            ColumnKind::Int4 => DataType::Int32,
            ColumnKind::Int8 => DataType::Int64,
            ColumnKind::Float4 => DataType::Float32,
            ColumnKind::Float8 | ColumnKind::NumericAsDouble => DataType::Float64,
            ColumnKind::Decimal {
                precision, scale, ..
            } => DataType::Decimal128(*precision, *scale),
            ColumnKind::Text { .. } => DataType::Utf8,
            ColumnKind::Bytea => DataType::Binary,
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Time => DataType::Time64(TimeUnit::Microsecond),
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnKind::TimestampTz => {
                DataType::Timestamp(TimeUnit::Microsecond, Some(Arc::from(UTC)))
            }
            ColumnKind::Interval => DataType::Interval(arrow::datatypes::IntervalUnit::MonthDayNano),
            ColumnKind::Uuid => DataType::FixedSizeBinary(16),
            ColumnKind::Enum(dict) => {
                let key = match dict.key_width() {
                    EnumKeyWidth::U8 => DataType::UInt8,
                    EnumKeyWidth::U16 => DataType::UInt16,
                    EnumKeyWidth::U32 => DataType::UInt32,
                };
                DataType::Dictionary(Box::new(key), Box::new(DataType::Utf8))
            }
            ColumnKind::List { element, ndims, .. } => {
                (0..*ndims).fold(element.arrow_type(), |inner, _| list_of(inner))
            }
        }
    }

    pub fn field(&self, name: &str) -> Field {
        Field::new(name, self.arrow_type(), true)
    }
}
