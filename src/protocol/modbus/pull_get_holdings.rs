use crate::error::ProtocolError;

use super::{append_word, extract_word, FC_READ_HOLDINGS};

/// Build the payload (without LRC) polling `count` holding registers from `start`.
pub fn generate_pull_get_holdings_request(slave_addr: u8, start: u16, count: u16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(7);
    bytes.push(slave_addr);
    bytes.push(FC_READ_HOLDINGS);
    append_word(&mut bytes, start);
    append_word(&mut bytes, count);
    bytes
}

/// Validate a decoded 0x03 reply (LRC already stripped) and extract its register values.
pub fn parse_pull_get_holdings(
    slave_addr: u8,
    count: u16,
    bytes: &[u8],
) -> Result<Vec<u16>, ProtocolError> {
    if bytes.len() < 3 {
        return Err(ProtocolError::SizeMismatch {
            expected: 3 + count as usize * 2,
            actual: bytes.len(),
        });
    }
    if bytes[0] != slave_addr {
        return Err(ProtocolError::AddressMismatch {
            expected: slave_addr,
            received: bytes[0],
        });
    }
    if bytes[1] == FC_READ_HOLDINGS | 0x80 {
        return Err(ProtocolError::Exception {
            function: bytes[1],
            code: bytes[2],
        });
    }
    if bytes[1] != FC_READ_HOLDINGS {
        return Err(ProtocolError::FunctionCodeMismatch {
            expected: FC_READ_HOLDINGS,
            received: bytes[1],
        });
    }

    let byte_count = count as usize * 2;
    if bytes[2] as usize != byte_count {
        return Err(ProtocolError::SizeMismatch {
            expected: byte_count,
            actual: bytes[2] as usize,
        });
    }
    if bytes.len() != 3 + byte_count {
        return Err(ProtocolError::SizeMismatch {
            expected: 3 + byte_count,
            actual: bytes.len(),
        });
    }

    Ok((0..count as usize)
        .filter_map(|i| extract_word(bytes, 3 + i * 2))
        .collect())
}
