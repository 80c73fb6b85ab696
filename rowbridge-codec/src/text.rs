use rowbridge_result::{Error, Result};

/// Length of a blank-padded value without its trailing spaces.
#[inline]
pub fn bpchar_true_len(bytes: &[u8]) -> usize {
    bytes.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1)
}

/// Borrow a detoasted payload as UTF-8 text.
#[inline]
pub fn as_str(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::corrupt(format_args!("invalid UTF-8 in text value: {e}")))
}

/// Text of a value, with blank padding removed when `trim_padding` is set.
pub fn text_value(bytes: &[u8], trim_padding: bool) -> Result<&str> {
    if trim_padding {
        as_str(&bytes[..bpchar_true_len(bytes)])
    } else {
        as_str(bytes)
    }
}
