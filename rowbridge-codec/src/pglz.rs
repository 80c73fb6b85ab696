//! The row store's native LZ-family compression format.
//!
//! A stream is a sequence of control bytes, each followed by up to eight
//! items. A set control bit marks a back-reference of two or three bytes
//! (4-bit length, 12-bit offset, optional length extension byte); a clear bit
//! marks a literal byte.

use rowbridge_result::{Error, Result};
use rustc_hash::FxHashMap;

const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 273;
const MAX_OFFSET: usize = 0x0fff;

/// Decompress `src` into `dst`, which must be exactly the raw size.
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<()> {
    let mut sp = 0usize;
    let mut dp = 0usize;

    while sp < src.len() && dp < dst.len() {
        let mut ctrl = src[sp];
        sp += 1;

        for _ in 0..8 {
            if sp >= src.len() || dp >= dst.len() {
                break;
            }
            if ctrl & 1 != 0 {
                if sp + 1 >= src.len() {
                    return Err(Error::corrupt("pglz: truncated back-reference"));
                }
                let mut len = usize::from(src[sp] & 0x0f) + MIN_MATCH;
                let off = (usize::from(src[sp] & 0xf0) << 4) | usize::from(src[sp + 1]);
                sp += 2;
                if len == 18 {
                    let Some(&ext) = src.get(sp) else {
                        return Err(Error::corrupt("pglz: truncated length extension"));
                    };
                    len += usize::from(ext);
                    sp += 1;
                }
                if off == 0 || off > dp {
                    return Err(Error::corrupt(format_args!(
                        "pglz: back-reference offset {off} at output position {dp}"
                    )));
                }
                let len = len.min(dst.len() - dp);
                // Byte-wise copy: source and destination may overlap.
                for _ in 0..len {
                    dst[dp] = dst[dp - off];
                    dp += 1;
                }
            } else {
                dst[dp] = src[sp];
                sp += 1;
                dp += 1;
            }
            ctrl >>= 1;
        }
    }

    if dp != dst.len() {
        return Err(Error::corrupt(format_args!(
            "pglz: produced {dp} bytes, expected {}",
            dst.len()
        )));
    }
    Ok(())
}

/// Greedy compressor producing a stream `decompress_into` accepts.
pub fn compress(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + src.len() / 8 + 1);
    let mut last_seen: FxHashMap<[u8; 3], usize> = FxHashMap::default();
    let mut pos = 0usize;

    let key_at = |p: usize| -> Option<[u8; 3]> {
        (p + MIN_MATCH <= src.len()).then(|| [src[p], src[p + 1], src[p + 2]])
    };

    while pos < src.len() {
        let ctrl_idx = out.len();
        out.push(0u8);
        let mut ctrl = 0u8;

        for bit in 0..8 {
            if pos >= src.len() {
                break;
            }
            let mut found = None;
            if let Some(key) = key_at(pos) {
                if let Some(&cand) = last_seen.get(&key)
                    && pos - cand <= MAX_OFFSET
                {
                    let limit = (src.len() - pos).min(MAX_MATCH);
                    let mut len = 0;
                    while len < limit && src[cand + len] == src[pos + len] {
                        len += 1;
                    }
                    if len >= MIN_MATCH {
                        found = Some((pos - cand, len));
                    }
                }
                last_seen.insert(key, pos);
            }

            match found {
                Some((off, len)) => {
                    ctrl |= 1 << bit;
                    let hi = ((off & 0xf00) >> 4) as u8;
                    if len >= 18 {
                        out.push(hi | 0x0f);
                        out.push((off & 0xff) as u8);
                        out.push((len - 18) as u8);
                    } else {
                        out.push(hi | (len - MIN_MATCH) as u8);
                        out.push((off & 0xff) as u8);
                    }
                    for p in pos + 1..pos + len {
                        if let Some(key) = key_at(p) {
                            last_seen.insert(key, p);
                        }
                    }
                    pos += len;
                }
                None => {
                    out.push(src[pos]);
                    pos += 1;
                }
            }
        }
        out[ctrl_idx] = ctrl;
    }
    out
}
