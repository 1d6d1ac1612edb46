use crate::error::FrameError;

use super::calc_lrc;

/// Shortest acceptable line: ':' plus address, function, one data byte and LRC.
pub const MIN_FRAME_LEN: usize = 9;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Encode a payload that already carries its LRC as an ASCII frame, CRLF included.
pub fn encode_ascii(bytes: &[u8]) -> String {
    let mut msg = String::with_capacity(1 + bytes.len() * 2 + 2);
    msg.push(':');
    for byte in bytes {
        msg.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        msg.push(HEX_DIGITS[(byte & 0x0F) as usize] as char);
    }
    msg.push_str("\r\n");
    msg
}

/// Append the LRC to `payload` and encode the result.
pub fn seal(payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(payload.len() + 1);
    bytes.extend_from_slice(payload);
    bytes.push(calc_lrc(payload));
    encode_ascii(&bytes)
}

/// Validate one received line and return its payload with the LRC byte removed.
///
/// A trailing CR/LF left behind by the transport framing is ignored.
pub fn decode_ascii(line: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    let line = &line[..end];

    if line.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort(line.len()));
    }
    if line.len() % 2 == 0 {
        return Err(FrameError::OddLength(line.len()));
    }
    if line[0] != b':' {
        return Err(FrameError::BadStart);
    }

    let mut bytes = Vec::with_capacity(line.len() / 2);
    for (i, pair) in line[1..].chunks_exact(2).enumerate() {
        let pos = 1 + i * 2;
        let hi = hex_value(pair[0]).ok_or(FrameError::InvalidHex(pos))?;
        let lo = hex_value(pair[1]).ok_or(FrameError::InvalidHex(pos + 1))?;
        bytes.push((hi << 4) | lo);
    }

    // at least four bytes are guaranteed by the length check
    let received = bytes[bytes.len() - 1];
    bytes.truncate(bytes.len() - 1);
    let expected = calc_lrc(&bytes);
    if expected != received {
        return Err(FrameError::ChecksumMismatch { expected, received });
    }

    Ok(bytes)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uppercase_with_crlf() {
        assert_eq!(encode_ascii(&[0x01, 0x0A, 0xFB]), ":010AFB\r\n");
    }

    #[test]
    fn test_seal_read_request() {
        assert_eq!(seal(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), ":01030000000AF2\r\n");
    }

    #[test]
    fn test_round_trip() {
        let payloads: [&[u8]; 4] = [
            &[0x01, 0x03, 0x00],
            &[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A],
            &[0xFF, 0xFF, 0xFF, 0xFF, 0x00],
            &[0x11, 0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02],
        ];
        for payload in payloads {
            let line = seal(payload);
            assert_eq!(decode_ascii(line.as_bytes()).unwrap(), payload);
        }
    }

    #[test]
    fn test_decode_without_terminator() {
        let bytes = decode_ascii(b":01030000000AF2").unwrap();
        assert_eq!(bytes, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_decode_accepts_lowercase_hex() {
        let bytes = decode_ascii(b":01030000000af2").unwrap();
        assert_eq!(bytes[5], 0x0A);
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(decode_ascii(b":010301"), Err(FrameError::TooShort(7)));
        assert_eq!(decode_ascii(b""), Err(FrameError::TooShort(0)));
    }

    #[test]
    fn test_decode_even_length() {
        assert_eq!(decode_ascii(b":01030000000"), Err(FrameError::OddLength(12)));
    }

    #[test]
    fn test_decode_bad_start() {
        assert_eq!(decode_ascii(b"#01030000000AF2"), Err(FrameError::BadStart));
    }

    #[test]
    fn test_decode_checksum_mismatch() {
        assert_eq!(
            decode_ascii(b":01030000000AF3\r\n"),
            Err(FrameError::ChecksumMismatch {
                expected: 0xF2,
                received: 0xF3
            })
        );
    }

    #[test]
    fn test_decode_invalid_hex() {
        assert_eq!(decode_ascii(b":0103G000000AF2"), Err(FrameError::InvalidHex(5)));
    }
}
