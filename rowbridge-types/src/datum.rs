use std::sync::Arc;

use rowbridge_result::{Error, Result};

use crate::ids::Oid;

/// A single row-store value as it sits in a heap tuple.
///
/// Pass-by-value types occupy one machine word and are reinterpreted
/// according to the column type. Everything else (varlena values, 16-byte
/// uuids and intervals) is carried as the raw on-page bytes, including any
/// varlena header, so the codec can detoast it.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Word(u64),
    Bytes(Arc<[u8]>),
}

impl Datum {
    #[inline]
    pub fn from_bool(v: bool) -> Self {
        Datum::Word(u64::from(v))
    }

    #[inline]
    pub fn from_char(v: i8) -> Self {
        Datum::Word(v as i64 as u64)
    }

    #[inline]
    pub fn from_i16(v: i16) -> Self {
        Datum::Word(v as i64 as u64)
    }

    #[inline]
    pub fn from_i32(v: i32) -> Self {
        Datum::Word(v as i64 as u64)
    }

    #[inline]
    pub fn from_i64(v: i64) -> Self {
        Datum::Word(v as u64)
    }

    #[inline]
    pub fn from_f32(v: f32) -> Self {
        Datum::Word(u64::from(v.to_bits()))
    }

    #[inline]
    pub fn from_f64(v: f64) -> Self {
        Datum::Word(v.to_bits())
    }

    #[inline]
    pub fn from_oid(v: Oid) -> Self {
        Datum::Word(u64::from(v))
    }

    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Datum::Bytes(bytes.into())
    }

    /// The pass-by-value word, or an error for by-reference datums.
    #[inline]
    pub fn word(&self) -> Result<u64> {
        match self {
            Datum::Word(w) => Ok(*w),
            Datum::Bytes(_) => Err(Error::corrupt("expected pass-by-value datum")),
        }
    }

    /// The raw bytes of a by-reference datum.
    #[inline]
    pub fn bytes(&self) -> Result<&[u8]> {
        match self {
            Datum::Bytes(b) => Ok(b),
            Datum::Word(_) => Err(Error::corrupt("expected pass-by-reference datum")),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        Ok(self.word()? & 0xff != 0)
    }

    pub fn as_char(&self) -> Result<i8> {
        Ok(self.word()? as i8)
    }

    pub fn as_i16(&self) -> Result<i16> {
        Ok(self.word()? as i16)
    }

    pub fn as_i32(&self) -> Result<i32> {
        Ok(self.word()? as i32)
    }

    pub fn as_i64(&self) -> Result<i64> {
        Ok(self.word()? as i64)
    }

    pub fn as_f32(&self) -> Result<f32> {
        Ok(f32::from_bits(self.word()? as u32))
    }

    pub fn as_f64(&self) -> Result<f64> {
        Ok(f64::from_bits(self.word()?))
    }

    pub fn as_oid(&self) -> Result<Oid> {
        Ok(self.word()? as u32)
    }
}
