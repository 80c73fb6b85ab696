//! The row store's multi-dimensional array format.
//!
//! Layout of a detoasted array (offsets include the 4-byte length word):
//!
//! ```text
//! 0   vl_len     u32   total length << 2
//! 4   ndim       i32
//! 8   dataoffset i32   0 when there is no null bitmap
//! 12  elemtype   u32
//! 16  dims       i32 x ndim
//! ..  lbounds    i32 x ndim
//! ..  nullbitmap (optional, one bit per element, 1 = present)
//! ..  data       MAXALIGN'ed, elements in row-major order
//! ```
//!
//! Elements follow the element type's own storage and alignment rules.
//! Varlena elements with a 1-byte header are never aligned, which is
//! detected by the first byte being non-zero (padding is always zero).

use rowbridge_result::{Error, Result};
use rowbridge_types::{Datum, MAXIMUM_ALIGNOF, RowType, TypeAlign, TypeStorage, VARHDRSZ};

use crate::varlena::{self, Varlena};

/// Deepest nesting the row store accepts.
pub const MAX_DIMS: usize = 6;

const FIXED_HEADER: usize = 16;

/// An array unpacked into its shape and flat element datums.
#[derive(Debug, Clone, PartialEq)]
pub struct RowArray {
    pub dims: Vec<usize>,
    pub lower_bounds: Vec<i32>,
    /// Elements in row-major order; `None` is a NULL element.
    pub elements: Vec<Option<Datum>>,
}

impl RowArray {
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32> {
    bytes
        .get(at..at + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::corrupt("truncated array header"))
}

#[inline]
fn max_align(offset: usize) -> usize {
    (offset + MAXIMUM_ALIGNOF - 1) & !(MAXIMUM_ALIGNOF - 1)
}

/// Number of elements for `dims`, rejecting overflow.
pub fn element_count(dims: &[usize]) -> Result<usize> {
    dims.iter().try_fold(1usize, |acc, &d| {
        acc.checked_mul(d)
            .ok_or_else(|| Error::corrupt("array size overflows"))
    })
}

/// Unpack a detoasted array payload (everything after the length word).
pub fn parse_array(payload: &[u8], element: &RowType) -> Result<RowArray> {
    // Work in datum coordinates so alignment matches the on-disk layout.
    let at = |off: usize| off - VARHDRSZ;
    let ndim = read_i32(payload, at(4))?;
    let ndim = usize::try_from(ndim)
        .ok()
        .filter(|&n| n <= MAX_DIMS)
        .ok_or_else(|| Error::corrupt(format_args!("invalid array dimensionality {ndim}")))?;
    let data_offset = read_i32(payload, at(8))?;

    let mut dims = Vec::with_capacity(ndim);
    let mut lower_bounds = Vec::with_capacity(ndim);
    for i in 0..ndim {
        let d = read_i32(payload, at(FIXED_HEADER + 4 * i))?;
        dims.push(
            usize::try_from(d)
                .map_err(|_| Error::corrupt(format_args!("negative array dimension {d}")))?,
        );
        lower_bounds.push(read_i32(payload, at(FIXED_HEADER + 4 * (ndim + i)))?);
    }
    let nitems = if ndim == 0 { 0 } else { element_count(&dims)? };
    // Each element takes at least one data byte or one null-bitmap bit.
    if nitems > payload.len().saturating_mul(8) {
        return Err(Error::corrupt(format_args!(
            "array claims {nitems} elements in {} bytes",
            payload.len()
        )));
    }
    let header_end = FIXED_HEADER + 8 * ndim;

    let (bitmap, data_start) = if data_offset != 0 {
        let bitmap_len = nitems.div_ceil(8);
        let start = usize::try_from(data_offset)
            .ok()
            .filter(|&start| start >= header_end + bitmap_len)
            .ok_or_else(|| {
                Error::corrupt(format_args!("array data offset {data_offset} overlaps its header"))
            })?;
        let bitmap = payload
            .get(at(header_end)..at(header_end) + bitmap_len)
            .ok_or_else(|| Error::corrupt("truncated array null bitmap"))?;
        (Some(bitmap), start)
    } else {
        (None, max_align(header_end))
    };

    let mut elements = Vec::with_capacity(nitems);
    let mut pos = data_start;
    for i in 0..nitems {
        let present = bitmap.is_none_or(|b| b[i / 8] & (1 << (i % 8)) != 0);
        if !present {
            elements.push(None);
            continue;
        }
        let (datum, next) = read_element(payload, pos, data_start, element)?;
        elements.push(Some(datum));
        pos = next;
    }

    Ok(RowArray {
        dims,
        lower_bounds,
        elements,
    })
}

fn align_from(data_start: usize, pos: usize, align: TypeAlign) -> usize {
    data_start + align.align(pos - data_start)
}

fn read_element(
    payload: &[u8],
    pos: usize,
    data_start: usize,
    element: &RowType,
) -> Result<(Datum, usize)> {
    let slice = |start: usize, len: usize| {
        start
            .checked_sub(VARHDRSZ)
            .and_then(|from| payload.get(from..from.checked_add(len)?))
            .ok_or_else(|| Error::corrupt("array element runs past the end of the array"))
    };
    match element.storage() {
        TypeStorage::ByValue(len) => {
            let start = align_from(data_start, pos, element.align());
            let raw = slice(start, len)?;
            let mut word = [0u8; 8];
            word[..len].copy_from_slice(raw);
            Ok((Datum::Word(u64::from_le_bytes(word)), start + len))
        }
        TypeStorage::FixedRef(len) => {
            let start = align_from(data_start, pos, element.align());
            Ok((Datum::from_bytes(slice(start, len)?), start + len))
        }
        TypeStorage::Varlena => {
            let first = *slice(pos, 1)?.first().unwrap_or(&0);
            let start = if first != 0 {
                pos
            } else {
                align_from(data_start, pos, element.align())
            };
            let rest = start
                .checked_sub(VARHDRSZ)
                .and_then(|from| payload.get(from..))
                .ok_or_else(|| Error::corrupt("array element runs past the end of the array"))?;
            let len = varlena::stored_len(rest)?;
            Ok((Datum::from_bytes(slice(start, len)?), start + len))
        }
    }
}

/// Serialize an array as a complete varlena (4-byte header included).
///
/// `dims` must multiply to `elements.len()`. An empty array is written with
/// zero dimensions. Varlena elements must already be inline and uncompressed.
pub fn build_array(elements: &[Option<Datum>], dims: &[usize], element: &RowType) -> Result<Vec<u8>> {
    if dims.len() > MAX_DIMS {
        return Err(Error::InvalidArgumentError(format!(
            "number of array dimensions ({}) exceeds the maximum allowed ({MAX_DIMS})",
            dims.len()
        )));
    }
    let nitems = if dims.is_empty() { 0 } else { element_count(dims)? };
    if nitems != elements.len() {
        return Err(Error::Internal(format!(
            "array shape holds {nitems} elements, {} supplied",
            elements.len()
        )));
    }
    let dims: &[usize] = if nitems == 0 { &[] } else { dims };
    let ndim = dims.len();
    let has_nulls = elements.iter().any(Option::is_none);

    let header_end = FIXED_HEADER + 8 * ndim;
    let bitmap_len = if has_nulls { nitems.div_ceil(8) } else { 0 };
    let data_start = max_align(header_end + bitmap_len);

    let mut out = vec![0u8; data_start];
    out[4..8].copy_from_slice(&(ndim as i32).to_le_bytes());
    let data_offset = if has_nulls { data_start as i32 } else { 0 };
    out[8..12].copy_from_slice(&data_offset.to_le_bytes());
    out[12..16].copy_from_slice(&element.oid().to_le_bytes());
    for (i, &d) in dims.iter().enumerate() {
        let at = FIXED_HEADER + 4 * i;
        out[at..at + 4].copy_from_slice(&(d as i32).to_le_bytes());
        let at = FIXED_HEADER + 4 * (ndim + i);
        out[at..at + 4].copy_from_slice(&1i32.to_le_bytes());
    }
    if has_nulls {
        for (i, e) in elements.iter().enumerate() {
            if e.is_some() {
                out[header_end + i / 8] |= 1 << (i % 8);
            }
        }
    }

    for datum in elements.iter().flatten() {
        write_element(&mut out, data_start, datum, element)?;
    }

    let total = u32::try_from(out.len())
        .ok()
        .filter(|&t| t <= 0x3fff_ffff)
        .ok_or_else(|| Error::overflow("array exceeds the maximum varlena size"))?;
    out[0..4].copy_from_slice(&(total << 2).to_le_bytes());
    Ok(out)
}

fn pad_to(out: &mut Vec<u8>, data_start: usize, align: TypeAlign) {
    let target = align_from(data_start, out.len(), align);
    out.resize(target, 0);
}

fn write_element(out: &mut Vec<u8>, data_start: usize, datum: &Datum, element: &RowType) -> Result<()> {
    match element.storage() {
        TypeStorage::ByValue(len) => {
            pad_to(out, data_start, element.align());
            out.extend_from_slice(&datum.word()?.to_le_bytes()[..len]);
        }
        TypeStorage::FixedRef(len) => {
            let bytes = datum.bytes()?;
            if bytes.len() != len {
                return Err(Error::corrupt(format_args!(
                    "{element} element has {} bytes, expected {len}",
                    bytes.len()
                )));
            }
            pad_to(out, data_start, element.align());
            out.extend_from_slice(bytes);
        }
        TypeStorage::Varlena => {
            let bytes = datum.bytes()?;
            if !matches!(varlena::parse(bytes)?, Varlena::Inline(_)) {
                return Err(Error::InvalidArgumentError(
                    "array elements must be detoasted before packing".into(),
                ));
            }
            if bytes[0] & 0x01 == 0 {
                pad_to(out, data_start, element.align());
            }
            out.extend_from_slice(&bytes[..varlena::stored_len(bytes)?]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varlena::{make_varlena, make_varlena_4b};

    fn ints(values: &[Option<i32>]) -> Vec<Option<Datum>> {
        values.iter().map(|v| v.map(Datum::from_i32)).collect()
    }

    fn roundtrip(elements: Vec<Option<Datum>>, dims: &[usize], ty: &RowType) -> RowArray {
        let bytes = build_array(&elements, dims, ty).unwrap();
        assert_eq!(varlena::stored_len(&bytes).unwrap(), bytes.len());
        let parsed = parse_array(&bytes[VARHDRSZ..], ty).unwrap();
        assert_eq!(parsed.elements.len(), elements.len());
        for (a, b) in parsed.elements.iter().zip(&elements) {
            match (a, b) {
                (Some(Datum::Word(x)), Some(Datum::Word(y))) => {
                    let len = match ty.storage() {
                        TypeStorage::ByValue(len) => len,
                        _ => unreachable!(),
                    };
                    let mask = if len == 8 { u64::MAX } else { (1u64 << (len * 8)) - 1 };
                    assert_eq!(x & mask, y & mask);
                }
                (a, b) => assert_eq!(a, b),
            }
        }
        parsed
    }

    #[test]
    fn two_dimensional_ints() {
        let parsed = roundtrip(
            ints(&[Some(1), Some(2), Some(3), Some(4)]),
            &[2, 2],
            &RowType::Int4,
        );
        assert_eq!(parsed.dims, vec![2, 2]);
        assert_eq!(parsed.lower_bounds, vec![1, 1]);
        assert_eq!(parsed.elements[3].as_ref().unwrap().as_i32().unwrap(), 4);
    }

    #[test]
    fn nulls_use_bitmap() {
        let parsed = roundtrip(ints(&[Some(-1), None, Some(7)]), &[3], &RowType::Int4);
        assert!(parsed.elements[1].is_none());
        assert_eq!(parsed.elements[0].as_ref().unwrap().as_i32().unwrap(), -1);
    }

    #[test]
    fn mixed_varlena_headers() {
        let long = "x".repeat(200);
        let elements = vec![
            Some(Datum::from_bytes(make_varlena(b"a"))),
            Some(Datum::from_bytes(make_varlena_4b(b"bcd"))),
            None,
            Some(Datum::from_bytes(make_varlena(long.as_bytes()))),
        ];
        roundtrip(elements, &[4], &RowType::Text);
    }

    #[test]
    fn int8_alignment_after_nulls() {
        let elements: Vec<Option<Datum>> = vec![None, Some(Datum::from_i64(i64::MIN)), Some(Datum::from_i64(42))];
        let parsed = roundtrip(elements, &[3], &RowType::Int8);
        assert_eq!(parsed.elements[1].as_ref().unwrap().as_i64().unwrap(), i64::MIN);
    }

    #[test]
    fn empty_array_has_no_dimensions() {
        let bytes = build_array(&[], &[0], &RowType::Int4).unwrap();
        let parsed = parse_array(&bytes[VARHDRSZ..], &RowType::Int4).unwrap();
        assert_eq!(parsed.ndim(), 0);
        assert!(parsed.is_empty());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        assert!(build_array(&ints(&[Some(1)]), &[2], &RowType::Int4).is_err());
        assert!(build_array(&ints(&[Some(1)]), &[1; 7], &RowType::Int4).is_err());
    }

    #[test]
    fn corrupt_headers_are_rejected_without_panicking() {
        let with_nulls = build_array(&ints(&[Some(1), None, Some(3)]), &[3], &RowType::Int4).unwrap();
        let mut bad_offset = with_nulls.clone();
        bad_offset[8..12].copy_from_slice(&2i32.to_le_bytes());
        let err = parse_array(&bad_offset[VARHDRSZ..], &RowType::Int4).unwrap_err();
        assert!(matches!(err, Error::CorruptDatum(_)), "{err}");

        let plain = build_array(&ints(&[Some(1), Some(2), Some(3)]), &[3], &RowType::Int4).unwrap();
        let mut huge = plain.clone();
        huge[FIXED_HEADER..FIXED_HEADER + 4].copy_from_slice(&i32::MAX.to_le_bytes());
        let err = parse_array(&huge[VARHDRSZ..], &RowType::Int4).unwrap_err();
        assert!(matches!(err, Error::CorruptDatum(_)), "{err}");
    }
}
