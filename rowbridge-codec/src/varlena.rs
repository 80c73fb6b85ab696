//! Varlena headers and detoasting.
//!
//! Variable-length values carry a little-endian header in one of four forms:
//!
//! | first byte        | form                                      |
//! |-------------------|-------------------------------------------|
//! | `0x01`            | out-of-line pointer (tag byte follows)    |
//! | `xxxx_xxx1`       | short inline, 1-byte header, length <= 127 |
//! | `xxxx_xx00`       | inline, 4-byte header                     |
//! | `xxxx_xx10`       | inline compressed, 4-byte header + tcinfo |
//!
//! [`detoast`] turns any of them into the contiguous payload bytes, borrowing
//! from the input when no work is needed and allocating from the batch
//! [`ScratchPool`] otherwise.

use rowbridge_result::{Error, Result};
use rowbridge_types::{Oid, VARHDRSZ};

use crate::pglz;
use crate::scratch::ScratchPool;

/// Tag byte of an on-disk out-of-line pointer.
pub const VARTAG_ONDISK: u8 = 18;

const EXTERNAL_POINTER_LEN: usize = 16;
const EXT_SIZE_MASK: u32 = 0x3fff_ffff;
const COMPRESSION_SHIFT: u32 = 30;
const SHORT_MAX_LEN: usize = 0x7f;

/// Compression method recorded in a compressed or external value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Pglz,
    Lz4,
}

impl CompressionMethod {
    fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(CompressionMethod::Pglz),
            1 => Ok(CompressionMethod::Lz4),
            other => Err(Error::corrupt(format_args!(
                "unknown compression method id {other}"
            ))),
        }
    }

    fn bits(self) -> u32 {
        match self {
            CompressionMethod::Pglz => 0,
            CompressionMethod::Lz4 => 1,
        }
    }
}

/// Out-of-line pointer stored in place of a large value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToastPointer {
    /// Original size including a 4-byte header.
    pub raw_size: usize,
    /// Bytes stored out of line.
    pub ext_size: usize,
    pub compression: Option<CompressionMethod>,
    pub value_id: Oid,
    pub toast_relid: Oid,
}

/// Source of out-of-line value chunks.
pub trait ToastFetcher {
    /// Reassemble the `ext_size` stored bytes for `pointer`.
    fn fetch_toast(&self, pointer: &ToastPointer) -> Result<Vec<u8>>;
}

/// Fetcher for contexts that never see out-of-line values.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoToast;

impl ToastFetcher for NoToast {
    fn fetch_toast(&self, pointer: &ToastPointer) -> Result<Vec<u8>> {
        tracing::debug!(value_id = pointer.value_id, "toast fetch without toast store");
        Err(Error::NotFound)
    }
}

/// Decoded header form of a varlena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Varlena<'a> {
    Inline(&'a [u8]),
    Compressed {
        raw_len: usize,
        method: CompressionMethod,
        data: &'a [u8],
    },
    External(ToastPointer),
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| Error::corrupt("truncated varlena header"))
}

/// Total on-page length of the varlena starting at `bytes[0]`.
pub fn stored_len(bytes: &[u8]) -> Result<usize> {
    let first = *bytes
        .first()
        .ok_or_else(|| Error::corrupt("empty varlena"))?;
    if first == 0x01 {
        let tag = *bytes
            .get(1)
            .ok_or_else(|| Error::corrupt("truncated external pointer"))?;
        if tag != VARTAG_ONDISK {
            return Err(Error::corrupt(format_args!("unsupported vartag {tag}")));
        }
        Ok(2 + EXTERNAL_POINTER_LEN)
    } else if first & 0x01 == 0x01 {
        Ok(usize::from(first >> 1))
    } else {
        Ok((read_u32(bytes, 0)? >> 2) as usize)
    }
}

/// Classify the varlena at the start of `bytes`.
pub fn parse(bytes: &[u8]) -> Result<Varlena<'_>> {
    let len = stored_len(bytes)?;
    if len > bytes.len() {
        return Err(Error::corrupt(format_args!(
            "varlena claims {len} bytes, {} available",
            bytes.len()
        )));
    }
    let first = bytes[0];
    if first == 0x01 {
        let raw_size = read_u32(bytes, 2)? as usize;
        let ext_info = read_u32(bytes, 6)?;
        let ext_size = (ext_info & EXT_SIZE_MASK) as usize;
        let compression = if ext_size < raw_size.saturating_sub(VARHDRSZ) {
            Some(CompressionMethod::from_bits(ext_info >> COMPRESSION_SHIFT)?)
        } else {
            None
        };
        return Ok(Varlena::External(ToastPointer {
            raw_size,
            ext_size,
            compression,
            value_id: read_u32(bytes, 10)?,
            toast_relid: read_u32(bytes, 14)?,
        }));
    }
    if first & 0x01 == 0x01 {
        if len < 1 {
            return Err(Error::corrupt("short varlena shorter than its header"));
        }
        return Ok(Varlena::Inline(&bytes[1..len]));
    }
    if len < VARHDRSZ {
        return Err(Error::corrupt("varlena shorter than its header"));
    }
    if first & 0x03 == 0x02 {
        let tcinfo = read_u32(bytes, VARHDRSZ)?;
        if len < VARHDRSZ + 4 {
            return Err(Error::corrupt("compressed varlena missing tcinfo"));
        }
        return Ok(Varlena::Compressed {
            raw_len: (tcinfo & EXT_SIZE_MASK) as usize,
            method: CompressionMethod::from_bits(tcinfo >> COMPRESSION_SHIFT)?,
            data: &bytes[VARHDRSZ + 4..len],
        });
    }
    Ok(Varlena::Inline(&bytes[VARHDRSZ..len]))
}

fn decompress<'a>(
    method: CompressionMethod,
    data: &[u8],
    raw_len: usize,
    pool: &'a ScratchPool,
) -> Result<&'a [u8]> {
    let out = pool.alloc_zeroed(raw_len);
    match method {
        CompressionMethod::Pglz => pglz::decompress_into(data, out)?,
        CompressionMethod::Lz4 => {
            let n = lz4_flex::block::decompress_into(data, out)
                .map_err(|e| Error::corrupt(format_args!("lz4: {e}")))?;
            if n != raw_len {
                return Err(Error::corrupt(format_args!(
                    "lz4: produced {n} bytes, expected {raw_len}"
                )));
            }
        }
    }
    Ok(out)
}

/// Materialize the payload of a varlena into one contiguous buffer.
pub fn detoast<'a>(
    bytes: &'a [u8],
    toast: &dyn ToastFetcher,
    pool: &'a ScratchPool,
) -> Result<&'a [u8]> {
    match parse(bytes)? {
        Varlena::Inline(payload) => Ok(payload),
        Varlena::Compressed {
            raw_len,
            method,
            data,
        } => decompress(method, data, raw_len, pool),
        Varlena::External(pointer) => {
            let stored = toast.fetch_toast(&pointer)?;
            if stored.len() != pointer.ext_size {
                return Err(Error::corrupt(format_args!(
                    "toast value {} has {} bytes, pointer says {}",
                    pointer.value_id,
                    stored.len(),
                    pointer.ext_size
                )));
            }
            match pointer.compression {
                None => Ok(pool.copy(&stored)),
                Some(method) => {
                    let tcinfo = read_u32(&stored, 0)?;
                    let raw_len = (tcinfo & EXT_SIZE_MASK) as usize;
                    decompress(method, &stored[4..], raw_len, pool)
                }
            }
        }
    }
}

/// Inline varlena for `payload`, using the 1-byte header when it fits.
pub fn make_varlena(payload: &[u8]) -> Vec<u8> {
    if payload.len() < SHORT_MAX_LEN {
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push((((payload.len() + 1) << 1) | 0x01) as u8);
        out.extend_from_slice(payload);
        out
    } else {
        make_varlena_4b(payload)
    }
}

/// Inline varlena for `payload` with a 4-byte header.
pub fn make_varlena_4b(payload: &[u8]) -> Vec<u8> {
    let total = payload.len() + VARHDRSZ;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&((total as u32) << 2).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Compressed body as stored either inline or out of line: tcinfo then data.
pub fn compress_body(payload: &[u8], method: CompressionMethod) -> Vec<u8> {
    let data = match method {
        CompressionMethod::Pglz => pglz::compress(payload),
        CompressionMethod::Lz4 => lz4_flex::block::compress(payload),
    };
    let tcinfo = (payload.len() as u32 & EXT_SIZE_MASK) | (method.bits() << COMPRESSION_SHIFT);
    let mut out = Vec::with_capacity(data.len() + 4);
    out.extend_from_slice(&tcinfo.to_le_bytes());
    out.extend_from_slice(&data);
    out
}

/// Inline compressed varlena for `payload`.
pub fn make_compressed_varlena(payload: &[u8], method: CompressionMethod) -> Vec<u8> {
    let body = compress_body(payload, method);
    let total = body.len() + VARHDRSZ;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(((total as u32) << 2) | 0x02).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// On-page bytes of an out-of-line pointer.
pub fn make_external_pointer(pointer: &ToastPointer) -> Vec<u8> {
    let method_bits = pointer.compression.map_or(0, CompressionMethod::bits);
    let ext_info = (pointer.ext_size as u32 & EXT_SIZE_MASK) | (method_bits << COMPRESSION_SHIFT);
    let mut out = Vec::with_capacity(2 + EXTERNAL_POINTER_LEN);
    out.push(0x01);
    out.push(VARTAG_ONDISK);
    out.extend_from_slice(&(pointer.raw_size as u32).to_le_bytes());
    out.extend_from_slice(&ext_info.to_le_bytes());
    out.extend_from_slice(&pointer.value_id.to_le_bytes());
    out.extend_from_slice(&pointer.toast_relid.to_le_bytes());
    out
}
