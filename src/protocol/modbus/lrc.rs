/// Longitudinal redundancy check over a frame payload (address through data).
///
/// The 8-bit sum is complemented and incremented, i.e. its two's complement.
/// An empty payload has no meaningful LRC; callers always pass at least the
/// address and function code.
pub fn calc_lrc(payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte() {
        assert_eq!(calc_lrc(&[0x11]), 0xEF);
    }

    #[test]
    fn test_read_request() {
        // :010300000001FB
        assert_eq!(calc_lrc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0xFB);
    }

    #[test]
    fn test_sum_wraps() {
        assert_eq!(calc_lrc(&[0xFF, 0x01]), 0x00);
        assert_eq!(calc_lrc(&[0x80, 0x80, 0x01]), 0xFF);
    }

    #[test]
    fn test_payload_plus_lrc_sums_to_zero() {
        let payload = [0x11, 0x03, 0x00, 0x6B, 0x00, 0x03];
        let lrc = calc_lrc(&payload);
        let total = payload
            .iter()
            .chain(std::iter::once(&lrc))
            .fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(lrc, 0x7E);
        assert_eq!(total, 0);
    }
}
