//! Exact conversion of the row store's base-10000 numeric format.
//!
//! On disk a numeric is a header followed by base-10000 digits
//! (`NBASE = 10000`, four decimal digits per base digit). `weight` is the
//! power of `NBASE` of the first digit and `dscale` the number of decimal
//! digits after the point. Two header layouts exist:
//!
//! * compact: one `u16` holding sign, a 6-bit dscale and a 7-bit signed weight,
//!   used whenever both fit;
//! * extended: a `u16` holding sign and a 14-bit dscale, followed by an `i16`
//!   weight.
//!
//! NaN and the two infinities are encoded as compact headers with the
//! special sign bits and no digits.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rowbridge_result::{Error, Result};

pub const NBASE: i64 = 10_000;
pub const DEC_DIGITS: i32 = 4;

const SIGN_MASK: u16 = 0xC000;
const POS: u16 = 0x0000;
const NEG: u16 = 0x4000;
const SHORT: u16 = 0x8000;
const SPECIAL: u16 = 0xC000;

const EXT_SIGN_MASK: u16 = 0xF000;
const NAN: u16 = 0xC000;
const PINF: u16 = 0xD000;
const NINF: u16 = 0xF000;

const DSCALE_MASK: u16 = 0x3FFF;

const SHORT_SIGN_MASK: u16 = 0x2000;
const SHORT_DSCALE_MASK: u16 = 0x1F80;
const SHORT_DSCALE_SHIFT: u16 = 7;
const SHORT_DSCALE_MAX: i32 = (SHORT_DSCALE_MASK >> SHORT_DSCALE_SHIFT) as i32;
const SHORT_WEIGHT_SIGN_MASK: u16 = 0x0040;
const SHORT_WEIGHT_MASK: u16 = 0x003F;
const SHORT_WEIGHT_MAX: i32 = SHORT_WEIGHT_MASK as i32;
const SHORT_WEIGHT_MIN: i32 = -(SHORT_WEIGHT_MASK as i32) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericSign {
    Positive,
    Negative,
    NaN,
    PosInfinity,
    NegInfinity,
}

/// Unpacked numeric: sign, weight, display scale and base-10000 digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericVar {
    pub sign: NumericSign,
    pub weight: i32,
    pub dscale: i32,
    pub digits: Vec<i16>,
}

/// Whether a value with this scale and weight uses the compact header.
#[inline]
pub fn can_be_short(dscale: i32, weight: i32) -> bool {
    dscale <= SHORT_DSCALE_MAX && (SHORT_WEIGHT_MIN..=SHORT_WEIGHT_MAX).contains(&weight)
}

impl NumericVar {
    pub fn zero(dscale: i32) -> Self {
        Self {
            sign: NumericSign::Positive,
            weight: 0,
            dscale,
            digits: Vec::new(),
        }
    }

    pub fn special(sign: NumericSign) -> Self {
        Self {
            sign,
            weight: 0,
            dscale: 0,
            digits: Vec::new(),
        }
    }

    #[inline]
    pub fn is_special(&self) -> bool {
        matches!(
            self.sign,
            NumericSign::NaN | NumericSign::PosInfinity | NumericSign::NegInfinity
        )
    }

    /// Unpack a detoasted numeric payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let header = payload
            .get(0..2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .ok_or_else(|| Error::corrupt("numeric shorter than its header"))?;

        if header & SIGN_MASK == SPECIAL {
            let sign = match header & EXT_SIGN_MASK {
                NAN => NumericSign::NaN,
                PINF => NumericSign::PosInfinity,
                NINF => NumericSign::NegInfinity,
                other => {
                    return Err(Error::corrupt(format_args!(
                        "invalid numeric special header {other:#06x}"
                    )));
                }
            };
            return Ok(Self::special(sign));
        }

        let (sign, weight, dscale, body) = if header & SIGN_MASK == SHORT {
            let sign = if header & SHORT_SIGN_MASK != 0 {
                NumericSign::Negative
            } else {
                NumericSign::Positive
            };
            let dscale = i32::from((header & SHORT_DSCALE_MASK) >> SHORT_DSCALE_SHIFT);
            let mut weight = i32::from(header & SHORT_WEIGHT_MASK);
            if header & SHORT_WEIGHT_SIGN_MASK != 0 {
                weight -= SHORT_WEIGHT_MASK as i32 + 1;
            }
            (sign, weight, dscale, &payload[2..])
        } else {
            let weight = payload
                .get(2..4)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .ok_or_else(|| Error::corrupt("numeric missing extended weight"))?;
            let sign = if header & SIGN_MASK == NEG {
                NumericSign::Negative
            } else {
                NumericSign::Positive
            };
            (
                sign,
                i32::from(weight),
                i32::from(header & DSCALE_MASK),
                &payload[4..],
            )
        };

        if body.len() % 2 != 0 {
            return Err(Error::corrupt("numeric digit array has odd length"));
        }
        let digits = body
            .chunks_exact(2)
            .map(|c| {
                let d = i16::from_le_bytes([c[0], c[1]]);
                if (0..NBASE as i16).contains(&d) {
                    Ok(d)
                } else {
                    Err(Error::corrupt(format_args!("numeric digit {d} out of range")))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sign,
            weight,
            dscale,
            digits,
        })
    }

    /// Pack into on-disk payload bytes (no varlena header).
    ///
    /// Picks the compact header whenever scale and weight fit it. Returns
    /// [`Error::OverflowOnConvert`] when weight or dscale cannot be
    /// represented by the extended header either.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let special = match self.sign {
            NumericSign::NaN => Some(NAN),
            NumericSign::PosInfinity => Some(PINF),
            NumericSign::NegInfinity => Some(NINF),
            NumericSign::Positive | NumericSign::Negative => None,
        };
        if let Some(header) = special {
            return Ok(header.to_le_bytes().to_vec());
        }
        if self.dscale < 0 {
            return Err(Error::overflow(format_args!(
                "negative display scale {}",
                self.dscale
            )));
        }

        let negative = self.sign == NumericSign::Negative;
        let mut out = Vec::with_capacity(4 + self.digits.len() * 2);
        if can_be_short(self.dscale, self.weight) {
            let mut header = SHORT | ((self.dscale as u16) << SHORT_DSCALE_SHIFT);
            if negative {
                header |= SHORT_SIGN_MASK;
            }
            if self.weight < 0 {
                header |= SHORT_WEIGHT_SIGN_MASK;
            }
            header |= (self.weight as u16) & SHORT_WEIGHT_MASK;
            out.extend_from_slice(&header.to_le_bytes());
        } else {
            let sign_bits = if negative { NEG } else { POS };
            let header = sign_bits | (self.dscale as u16 & DSCALE_MASK);
            out.extend_from_slice(&header.to_le_bytes());
            out.extend_from_slice(&(self.weight as i16).to_le_bytes());
        }
        for d in &self.digits {
            out.extend_from_slice(&d.to_le_bytes());
        }

        let check = Self::parse(&out)?;
        if check.weight != self.weight || check.dscale != self.dscale {
            return Err(Error::overflow(format_args!(
                "numeric weight {} / scale {} exceed the storage format",
                self.weight, self.dscale
            )));
        }
        Ok(out)
    }

    /// Strip leading and trailing zero digits; a zero becomes positive with weight 0.
    pub fn normalize(&mut self) {
        let lead = self.digits.iter().take_while(|&&d| d == 0).count();
        if lead > 0 {
            self.digits.drain(..lead);
            self.weight -= lead as i32;
        }
        while self.digits.last() == Some(&0) {
            self.digits.pop();
        }
        if self.digits.is_empty() && !self.is_special() {
            self.weight = 0;
            self.sign = NumericSign::Positive;
        }
    }

    /// Build from a scaled integer (`value / 10^scale`).
    pub fn from_scaled_i128(value: i128, scale: u8) -> Self {
        let dscale = i32::from(scale);
        if value == 0 {
            return Self::zero(dscale);
        }
        let negative = value < 0;
        let abs = value.unsigned_abs();
        let factor = 10u128.pow(u32::from(scale));
        let mut integer_part = abs / factor;
        let mut fractional_part = abs % factor;

        let mut integral_digits = Vec::new();
        while integer_part > 0 {
            integral_digits.push((integer_part % NBASE as u128) as i16);
            integer_part /= NBASE as u128;
        }
        integral_digits.reverse();
        let integral_ndigits = integral_digits.len() as i32;

        // Fractional base digits are left aligned: pad the last group with zeros.
        let fractional_ndigits = (dscale + DEC_DIGITS - 1) / DEC_DIGITS;
        let pad = (fractional_ndigits * DEC_DIGITS - dscale) as u32;
        let mut fractional_digits = vec![0i16; fractional_ndigits as usize];
        for (i, slot) in fractional_digits.iter_mut().rev().enumerate() {
            if i == 0 {
                let width = 10u128.pow(DEC_DIGITS as u32 - pad);
                *slot = ((fractional_part % width) * 10u128.pow(pad)) as i16;
                fractional_part /= width;
            } else {
                *slot = (fractional_part % NBASE as u128) as i16;
                fractional_part /= NBASE as u128;
            }
        }

        let mut digits = integral_digits;
        digits.extend(fractional_digits);
        let mut var = Self {
            sign: if negative {
                NumericSign::Negative
            } else {
                NumericSign::Positive
            },
            weight: integral_ndigits - 1,
            dscale,
            digits,
        };
        var.normalize();
        var
    }

    /// Value scaled by `10^dscale` in the target width.
    pub fn to_scaled<T: DecimalNative>(&self) -> Result<T> {
        if self.is_special() {
            return Err(Error::overflow(format_args!(
                "cannot store {self} in a decimal column"
            )));
        }
        convert_decimal::<T>(self).ok_or_else(|| {
            Error::overflow(format_args!("{self} does not fit in {}", T::NAME))
        })
    }

    /// Lossy floating-point value.
    pub fn to_f64(&self) -> f64 {
        match self.sign {
            NumericSign::NaN => f64::NAN,
            NumericSign::PosInfinity => f64::INFINITY,
            NumericSign::NegInfinity => f64::NEG_INFINITY,
            NumericSign::Positive | NumericSign::Negative => {
                let scaled = convert_decimal::<f64>(self).unwrap_or(f64::NAN);
                scaled / 10f64.powi(self.dscale)
            }
        }
    }

    /// Nearest numeric to a double, through its shortest decimal rendering.
    pub fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            Self::special(NumericSign::NaN)
        } else if v == f64::INFINITY {
            Self::special(NumericSign::PosInfinity)
        } else if v == f64::NEG_INFINITY {
            Self::special(NumericSign::NegInfinity)
        } else {
            // `{}` on a finite f64 never uses exponent notation.
            format!("{v}")
                .parse()
                .unwrap_or_else(|_| Self::special(NumericSign::NaN))
        }
    }
}

impl NumericVar {
    /// Total order over numerics: NaN equals NaN and sorts above +Infinity,
    /// which sorts above every finite value.
    pub fn cmp_value(&self, other: &Self) -> Ordering {
        fn rank(sign: NumericSign) -> u8 {
            match sign {
                NumericSign::NegInfinity => 0,
                NumericSign::Positive | NumericSign::Negative => 1,
                NumericSign::PosInfinity => 2,
                NumericSign::NaN => 3,
            }
        }
        let (ra, rb) = (rank(self.sign), rank(other.sign));
        if ra != 1 || rb != 1 {
            return ra.cmp(&rb);
        }
        let (wa, da) = self.significant();
        let (wb, db) = other.significant();
        let signum = |sign: NumericSign, digits: &[i16]| -> i8 {
            match (digits.is_empty(), sign) {
                (true, _) => 0,
                (false, NumericSign::Negative) => -1,
                _ => 1,
            }
        };
        let (sa, sb) = (signum(self.sign, da), signum(other.sign, db));
        if sa != sb || sa == 0 {
            return sa.cmp(&sb);
        }
        let abs = cmp_abs(wa, da, wb, db);
        if sa < 0 { abs.reverse() } else { abs }
    }

    fn significant(&self) -> (i32, &[i16]) {
        let lead = self.digits.iter().take_while(|&&d| d == 0).count();
        let trail = self.digits[lead..]
            .iter()
            .rev()
            .take_while(|&&d| d == 0)
            .count();
        (
            self.weight - lead as i32,
            &self.digits[lead..self.digits.len() - trail],
        )
    }
}

fn cmp_abs(wa: i32, da: &[i16], wb: i32, db: &[i16]) -> Ordering {
    if wa != wb {
        return wa.cmp(&wb);
    }
    let n = da.len().max(db.len());
    for i in 0..n {
        let a = da.get(i).copied().unwrap_or(0);
        let b = db.get(i).copied().unwrap_or(0);
        if a != b {
            return a.cmp(&b);
        }
    }
    Ordering::Equal
}

/// Integer (or floating) target of a decimal decode.
pub trait DecimalNative: Copy {
    const NAME: &'static str;
    fn from_i64(v: i64) -> Option<Self>;
    fn mul(self, rhs: Self) -> Option<Self>;
    fn add(self, rhs: Self) -> Option<Self>;
    fn neg(self) -> Option<Self>;
    fn pow10(exp: u32) -> Option<Self>;
}

macro_rules! impl_decimal_native_int {
    ($($t:ty => $name:literal),+ $(,)?) => {
        $(
            impl DecimalNative for $t {
                const NAME: &'static str = $name;

                #[inline]
                fn from_i64(v: i64) -> Option<Self> {
                    <$t>::try_from(v).ok()
                }

                #[inline]
                fn mul(self, rhs: Self) -> Option<Self> {
                    self.checked_mul(rhs)
                }

                #[inline]
                fn add(self, rhs: Self) -> Option<Self> {
                    self.checked_add(rhs)
                }

                #[inline]
                fn neg(self) -> Option<Self> {
                    self.checked_neg()
                }

                #[inline]
                fn pow10(exp: u32) -> Option<Self> {
                    (10 as $t).checked_pow(exp)
                }
            }
        )+
    };
}

impl_decimal_native_int!(i16 => "int16", i32 => "int32", i64 => "int64", i128 => "int128");

impl DecimalNative for f64 {
    const NAME: &'static str = "double";

    fn from_i64(v: i64) -> Option<Self> {
        Some(v as f64)
    }

    fn mul(self, rhs: Self) -> Option<Self> {
        Some(self * rhs)
    }

    fn add(self, rhs: Self) -> Option<Self> {
        Some(self + rhs)
    }

    fn neg(self) -> Option<Self> {
        Some(-self)
    }

    fn pow10(exp: u32) -> Option<Self> {
        Some(10f64.powi(exp as i32))
    }
}

/// Accumulate the digits of `var` into `T`, scaled by `10^dscale`.
///
/// The integral digits are folded most significant first and multiplied by
/// `10^dscale`. The fractional digits carry `(ndigits - weight - 1) * 4`
/// decimal places; when that does not land on `dscale`, the last digit (and
/// its base) is divided or multiplied by the power of ten that corrects it.
fn convert_decimal<T: DecimalNative>(var: &NumericVar) -> Option<T> {
    let ndigits = var.digits.len() as i32;
    let zero = T::from_i64(0)?;
    if ndigits == 0 {
        return Some(zero);
    }
    let nbase = T::from_i64(NBASE)?;
    let digit = |i: i32| T::from_i64(i64::from(var.digits[i as usize]));
    let dscale = u32::try_from(var.dscale).ok()?;

    let mut integral_part = zero;
    if var.weight >= 0 {
        integral_part = digit(0)?;
        for i in 1..=var.weight {
            integral_part = integral_part.mul(nbase)?;
            if i < ndigits {
                integral_part = integral_part.add(digit(i)?)?;
            }
        }
        integral_part = integral_part.mul(T::pow10(dscale)?)?;
    }

    let mut fractional_part = zero;
    if ndigits > var.weight + 1 {
        let fractional_power = (ndigits - var.weight - 1) * DEC_DIGITS;
        let correction = fractional_power - var.dscale;
        for i in (var.weight + 1).max(0)..ndigits {
            if i + 1 < ndigits {
                fractional_part = fractional_part.mul(nbase)?.add(digit(i)?)?;
                continue;
            }
            let (final_base, final_digit) = if correction >= 0 {
                let pow = 10i64.checked_pow(correction as u32)?;
                (
                    T::from_i64(NBASE / pow)?,
                    T::from_i64(i64::from(var.digits[i as usize]) / pow)?,
                )
            } else {
                let pow = T::pow10((-correction) as u32)?;
                (nbase.mul(pow)?, digit(i)?.mul(pow)?)
            };
            fractional_part = fractional_part.mul(final_base)?.add(final_digit)?;
        }
    }

    let result = integral_part.add(fractional_part)?;
    if var.sign == NumericSign::Negative {
        result.neg()
    } else {
        Some(result)
    }
}

impl fmt::Display for NumericVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sign {
            NumericSign::NaN => return f.write_str("NaN"),
            NumericSign::PosInfinity => return f.write_str("Infinity"),
            NumericSign::NegInfinity => return f.write_str("-Infinity"),
            NumericSign::Negative if !self.digits.is_empty() => f.write_str("-")?,
            _ => {}
        }
        let digit_at = |idx: i32| -> i16 {
            usize::try_from(idx)
                .ok()
                .and_then(|i| self.digits.get(i).copied())
                .unwrap_or(0)
        };
        if self.weight < 0 {
            f.write_str("0")?;
        } else {
            for d in 0..=self.weight {
                if d == 0 {
                    write!(f, "{}", digit_at(d))?;
                } else {
                    write!(f, "{:04}", digit_at(d))?;
                }
            }
        }
        if self.dscale > 0 {
            f.write_str(".")?;
            for j in 0..self.dscale {
                let base_digit = digit_at(self.weight + 1 + j / DEC_DIGITS);
                let shift = (DEC_DIGITS - 1 - j % DEC_DIGITS) as u32;
                write!(f, "{}", (base_digit / 10i16.pow(shift)) % 10)?;
            }
        }
        Ok(())
    }
}

impl FromStr for NumericVar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        match t.to_ascii_lowercase().as_str() {
            "nan" => return Ok(Self::special(NumericSign::NaN)),
            "infinity" | "+infinity" | "inf" => {
                return Ok(Self::special(NumericSign::PosInfinity));
            }
            "-infinity" | "-inf" => return Ok(Self::special(NumericSign::NegInfinity)),
            _ => {}
        }
        let invalid = || Error::InvalidArgumentError(format!("invalid numeric literal \"{s}\""));
        let (negative, unsigned) = match t.as_bytes().first() {
            Some(b'-') => (true, &t[1..]),
            Some(b'+') => (false, &t[1..]),
            _ => (false, t),
        };
        let (int_str, frac_str) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int_str.is_empty() && frac_str.is_empty() {
            return Err(invalid());
        }
        if !int_str.bytes().chain(frac_str.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let int_pad = (DEC_DIGITS as usize - int_str.len() % DEC_DIGITS as usize) % DEC_DIGITS as usize;
        let frac_pad = (DEC_DIGITS as usize - frac_str.len() % DEC_DIGITS as usize) % DEC_DIGITS as usize;
        let mut decimal: Vec<u8> = Vec::with_capacity(int_pad + unsigned.len() + frac_pad);
        decimal.extend(std::iter::repeat_n(0u8, int_pad));
        decimal.extend(int_str.bytes().map(|b| b - b'0'));
        decimal.extend(frac_str.bytes().map(|b| b - b'0'));
        decimal.extend(std::iter::repeat_n(0u8, frac_pad));

        let digits: Vec<i16> = decimal
            .chunks_exact(DEC_DIGITS as usize)
            .map(|c| c.iter().fold(0i16, |acc, &d| acc * 10 + i16::from(d)))
            .collect();
        let int_groups = ((int_pad + int_str.len()) / DEC_DIGITS as usize) as i32;

        let mut var = Self {
            sign: if negative {
                NumericSign::Negative
            } else {
                NumericSign::Positive
            },
            weight: int_groups - 1,
            dscale: frac_str.len() as i32,
            digits,
        };
        var.normalize();
        Ok(var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> NumericVar {
        s.parse().unwrap()
    }

    #[test]
    fn parse_literal_into_base_digits() {
        let v = num("12345.678");
        assert_eq!(v.weight, 1);
        assert_eq!(v.dscale, 3);
        assert_eq!(v.digits, vec![1, 2345, 6780]);
        assert_eq!(v.to_string(), "12345.678");

        let tiny = num("0.00001234");
        assert_eq!(tiny.weight, -2);
        assert_eq!(tiny.digits, vec![1234]);
        assert_eq!(tiny.to_string(), "0.00001234");

        assert_eq!(num("-0.00").sign, NumericSign::Positive);
        assert_eq!(num("10000").digits, vec![1]);
        assert_eq!(num("10000").weight, 1);
    }

    #[test]
    fn decode_applies_radix_correction() {
        // dscale 1 lands mid-digit: 5000 is divided by 10^3.
        assert_eq!(num("1.5").to_scaled::<i32>().unwrap(), 15);
        // dscale beyond the stored digits multiplies the last digit.
        let mut wide = num("1.5");
        wide.dscale = 6;
        assert_eq!(wide.to_scaled::<i64>().unwrap(), 1_500_000);
        assert_eq!(num("-12345.678").to_scaled::<i64>().unwrap(), -12_345_678);
        assert_eq!(num("0.00001234").to_scaled::<i32>().unwrap(), 1234);
        assert_eq!(num("10000").to_scaled::<i16>().unwrap(), 10_000);
        assert_eq!(num("0").to_scaled::<i16>().unwrap(), 0);
    }

    #[test]
    fn decode_overflow_reports_width() {
        let err = num("40000").to_scaled::<i16>().unwrap_err();
        assert!(matches!(err, Error::OverflowOnConvert(ref m) if m.contains("int16")), "{err}");
        assert!(num("NaN").to_scaled::<i64>().is_err());
    }

    #[test]
    fn double_path_handles_specials() {
        assert_eq!(num("12.25").to_f64(), 12.25);
        assert!(num("NaN").to_f64().is_nan());
        assert_eq!(num("-Infinity").to_f64(), f64::NEG_INFINITY);
        assert_eq!(NumericVar::from_f64(0.125).to_string(), "0.125");
    }

    #[test]
    fn header_selection() {
        let small = num("123.45").to_bytes().unwrap();
        let header = u16::from_le_bytes([small[0], small[1]]);
        assert_eq!(header & SIGN_MASK, SHORT);
        assert_eq!(small.len(), 2 + 2 * 2);

        // Weight 64 does not fit the 7-bit compact weight.
        let mut big = num("1");
        big.weight = 64;
        let bytes = big.to_bytes().unwrap();
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]) & SIGN_MASK, POS);
        assert_eq!(NumericVar::parse(&bytes).unwrap(), big);

        // dscale 64 does not fit the 6-bit compact dscale.
        let mut scaled = num("-0.5");
        scaled.dscale = 64;
        let bytes = scaled.to_bytes().unwrap();
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]) & SIGN_MASK, NEG);
        assert_eq!(NumericVar::parse(&bytes).unwrap(), scaled);

        let mut neg_weight = num("0.0001");
        assert_eq!(neg_weight.weight, -1);
        neg_weight.weight = -64;
        assert!(can_be_short(neg_weight.dscale, neg_weight.weight));
        let bytes = neg_weight.to_bytes().unwrap();
        assert_eq!(NumericVar::parse(&bytes).unwrap().weight, -64);
    }

    #[test]
    fn header_overflow_is_signaled() {
        let mut v = num("1");
        v.weight = i32::from(i16::MAX) + 1;
        assert!(matches!(v.to_bytes(), Err(Error::OverflowOnConvert(_))));
        let mut v = num("1");
        v.dscale = 0x4000;
        assert!(matches!(v.to_bytes(), Err(Error::OverflowOnConvert(_))));
    }

    #[test]
    fn scaled_integer_encode() {
        let v = NumericVar::from_scaled_i128(1_234_567, 3);
        assert_eq!(v.to_string(), "1234.567");
        assert_eq!(v.digits, vec![1234, 5670]);
        let v = NumericVar::from_scaled_i128(-5, 5);
        assert_eq!(v.to_string(), "-0.00005");
        assert_eq!(v.weight, -2);
        assert_eq!(v.digits, vec![5000]);
        assert_eq!(NumericVar::from_scaled_i128(0, 2), NumericVar::zero(2));
        let max = 10i128.pow(38) - 1;
        let v = NumericVar::from_scaled_i128(max, 10);
        assert_eq!(v.to_scaled::<i128>().unwrap(), max);
        assert_eq!(NumericVar::from_scaled_i128(-max, 10).to_scaled::<i128>().unwrap(), -max);
    }

    #[test]
    fn special_headers_roundtrip() {
        for sign in [NumericSign::NaN, NumericSign::PosInfinity, NumericSign::NegInfinity] {
            let v = NumericVar::special(sign);
            let bytes = v.to_bytes().unwrap();
            assert_eq!(bytes.len(), 2);
            assert_eq!(NumericVar::parse(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn corrupt_payloads() {
        assert!(NumericVar::parse(&[0x00]).is_err());
        assert!(NumericVar::parse(&[0x00, 0x80, 0x01]).is_err());
        // digit 10000 is out of range
        assert!(NumericVar::parse(&[0x00, 0x80, 0x10, 0x27]).is_err());
    }

    #[test]
    fn ordering_follows_value() {
        let ordered = [
            "-Infinity", "-100", "-1.5", "-0.0001", "0", "0.00001234", "0.5", "1", "1.0001",
            "10000", "Infinity", "NaN",
        ];
        for pair in ordered.windows(2) {
            assert_eq!(num(pair[0]).cmp_value(&num(pair[1])), Ordering::Less, "{pair:?}");
            assert_eq!(num(pair[1]).cmp_value(&num(pair[0])), Ordering::Greater, "{pair:?}");
        }
        assert_eq!(num("1.50").cmp_value(&num("1.5")), Ordering::Equal);
        assert_eq!(num("NaN").cmp_value(&num("NaN")), Ordering::Equal);
    }
}
