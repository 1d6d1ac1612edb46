/// Read the big-endian word starting at `index`.
///
/// Returns `None` when fewer than two bytes remain.
pub fn extract_word(bytes: &[u8], index: usize) -> Option<u16> {
    let hi = *bytes.get(index)?;
    let lo = *bytes.get(index + 1)?;
    Some(u16::from_be_bytes([hi, lo]))
}

/// Append `value` to `buf` in big-endian order.
pub fn append_word(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_word() {
        let bytes = [0x01, 0x03, 0x12, 0x34, 0xAB];
        assert_eq!(extract_word(&bytes, 2), Some(0x1234));
        assert_eq!(extract_word(&bytes, 3), Some(0x34AB));
        assert_eq!(extract_word(&bytes, 4), None);
    }

    #[test]
    fn test_append_word() {
        let mut buf = vec![0x01];
        append_word(&mut buf, 0xBEEF);
        append_word(&mut buf, 7);
        assert_eq!(buf, vec![0x01, 0xBE, 0xEF, 0x00, 0x07]);
    }
}
