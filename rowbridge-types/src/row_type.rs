//! Row-store column types.
//!
//! [`RowType`] describes a column the way the row store's catalog does: the
//! type family plus any modifier (numeric typmod, enum type id, array element
//! type and dimensionality). Physical layout facts needed to walk array
//! element data (storage class and alignment) are attached here too.

use std::fmt;

use crate::constants::VARHDRSZ;
use crate::ids::{Oid, TypeId};

/// A row-store column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowType {
    Bool,
    /// Single-byte internal `"char"`.
    Char,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// Arbitrary precision numeric. `typmod` is `-1` when unconstrained.
    Numeric {
        typmod: i32,
    },
    Text,
    Varchar,
    /// Blank-padded fixed-length character type.
    Bpchar,
    Bytea,
    Json,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    Enum {
        type_id: TypeId,
    },
    Array {
        element: Box<RowType>,
        ndims: usize,
    },
}

/// How a value of a type is stored inside a tuple or array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeStorage {
    /// Pass-by-value, fixed length in bytes.
    ByValue(usize),
    /// Pass-by-reference, fixed length in bytes.
    FixedRef(usize),
    /// Variable length with a varlena header.
    Varlena,
}

/// Alignment requirement of a type inside array data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeAlign {
    Char,
    Short,
    Int,
    Double,
}

impl TypeAlign {
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            TypeAlign::Char => 1,
            TypeAlign::Short => 2,
            TypeAlign::Int => 4,
            TypeAlign::Double => 8,
        }
    }

    /// Round `offset` up to this alignment.
    #[inline]
    pub const fn align(self, offset: usize) -> usize {
        let a = self.bytes();
        (offset + a - 1) & !(a - 1)
    }
}

impl RowType {
    /// Numeric constrained to `precision` digits with `scale` fractional digits.
    pub fn numeric(precision: u16, scale: u16) -> Self {
        RowType::Numeric {
            typmod: ((i32::from(precision) << 16) | i32::from(scale)) + VARHDRSZ as i32,
        }
    }

    /// Unconstrained numeric.
    pub fn numeric_any() -> Self {
        RowType::Numeric { typmod: -1 }
    }

    pub fn array_of(element: RowType, ndims: usize) -> Self {
        RowType::Array {
            element: Box::new(element),
            ndims,
        }
    }

    /// Catalog id of the type; enum types report their own type id.
    pub fn oid(&self) -> Oid {
        match self {
            RowType::Bool => 16,
            RowType::Bytea => 17,
            RowType::Char => 18,
            RowType::Int8 => 20,
            RowType::Int2 => 21,
            RowType::Int4 => 23,
            RowType::Text => 25,
            RowType::Json => 114,
            RowType::Float4 => 700,
            RowType::Float8 => 701,
            RowType::Bpchar => 1042,
            RowType::Varchar => 1043,
            RowType::Date => 1082,
            RowType::Time => 1083,
            RowType::Timestamp => 1114,
            RowType::TimestampTz => 1184,
            RowType::Interval => 1186,
            RowType::Numeric { .. } => 1700,
            RowType::Uuid => 2950,
            RowType::Enum { type_id } => *type_id,
            RowType::Array { element, .. } => match element.as_ref() {
                RowType::Bool => 1000,
                RowType::Int2 => 1005,
                RowType::Int4 => 1007,
                RowType::Text => 1009,
                RowType::Int8 => 1016,
                RowType::Float4 => 1021,
                RowType::Float8 => 1022,
                RowType::Varchar => 1015,
                RowType::Date => 1182,
                RowType::Timestamp => 1115,
                RowType::Numeric { .. } => 1231,
                _ => 0,
            },
        }
    }

    pub fn storage(&self) -> TypeStorage {
        match self {
            RowType::Bool | RowType::Char => TypeStorage::ByValue(1),
            RowType::Int2 => TypeStorage::ByValue(2),
            RowType::Int4 | RowType::Float4 | RowType::Date | RowType::Enum { .. } => {
                TypeStorage::ByValue(4)
            }
            RowType::Int8
            | RowType::Float8
            | RowType::Time
            | RowType::Timestamp
            | RowType::TimestampTz => TypeStorage::ByValue(8),
            RowType::Interval | RowType::Uuid => TypeStorage::FixedRef(16),
            RowType::Numeric { .. }
            | RowType::Text
            | RowType::Varchar
            | RowType::Bpchar
            | RowType::Bytea
            | RowType::Json
            | RowType::Array { .. } => TypeStorage::Varlena,
        }
    }

    pub fn align(&self) -> TypeAlign {
        match self {
            RowType::Bool | RowType::Char | RowType::Uuid => TypeAlign::Char,
            RowType::Int2 => TypeAlign::Short,
            RowType::Int8
            | RowType::Float8
            | RowType::Time
            | RowType::Timestamp
            | RowType::TimestampTz
            | RowType::Interval => TypeAlign::Double,
            RowType::Array { element, .. } if element.align() == TypeAlign::Double => {
                TypeAlign::Double
            }
            _ => TypeAlign::Int,
        }
    }

    pub fn is_varlena(&self) -> bool {
        matches!(self.storage(), TypeStorage::Varlena)
    }

    /// Whether values compare as strings after detoasting.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            RowType::Text | RowType::Varchar | RowType::Bpchar | RowType::Json
        )
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowType::Bool => f.write_str("boolean"),
            RowType::Char => f.write_str("\"char\""),
            RowType::Int2 => f.write_str("smallint"),
            RowType::Int4 => f.write_str("integer"),
            RowType::Int8 => f.write_str("bigint"),
            RowType::Float4 => f.write_str("real"),
            RowType::Float8 => f.write_str("double precision"),
            RowType::Numeric { typmod } if *typmod < VARHDRSZ as i32 => f.write_str("numeric"),
            RowType::Numeric { typmod } => {
                let t = typmod - VARHDRSZ as i32;
                write!(f, "numeric({},{})", (t >> 16) & 0xffff, t & 0xffff)
            }
            RowType::Text => f.write_str("text"),
            RowType::Varchar => f.write_str("character varying"),
            RowType::Bpchar => f.write_str("character"),
            RowType::Bytea => f.write_str("bytea"),
            RowType::Json => f.write_str("json"),
            RowType::Date => f.write_str("date"),
            RowType::Time => f.write_str("time without time zone"),
            RowType::Timestamp => f.write_str("timestamp without time zone"),
            RowType::TimestampTz => f.write_str("timestamp with time zone"),
            RowType::Interval => f.write_str("interval"),
            RowType::Uuid => f.write_str("uuid"),
            RowType::Enum { type_id } => write!(f, "enum({type_id})"),
            RowType::Array { element, ndims } => {
                write!(f, "{element}")?;
                for _ in 0..*ndims {
                    f.write_str("[]")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_typmod_encodes_precision_and_scale() {
        let RowType::Numeric { typmod } = RowType::numeric(10, 2) else {
            panic!("expected numeric");
        };
        assert_eq!(typmod, (10 << 16 | 2) + 4);
        assert_eq!(RowType::numeric(10, 2).to_string(), "numeric(10,2)");
        assert_eq!(RowType::numeric_any().to_string(), "numeric");
    }

    #[test]
    fn alignment_rounds_up() {
        assert_eq!(TypeAlign::Int.align(5), 8);
        assert_eq!(TypeAlign::Double.align(8), 8);
        assert_eq!(TypeAlign::Short.align(3), 4);
        assert_eq!(TypeAlign::Char.align(3), 3);
    }

    #[test]
    fn array_display_repeats_brackets() {
        assert_eq!(RowType::array_of(RowType::Int4, 2).to_string(), "integer[][]");
    }
}
