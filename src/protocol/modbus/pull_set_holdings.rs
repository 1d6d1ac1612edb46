use crate::error::ProtocolError;

use super::{append_word, FC_WRITE_HOLDING, FC_WRITE_HOLDINGS};

/// Build a frame payload writing a single holding register (function 0x06).
pub fn generate_pull_set_holding_request(slave_addr: u8, index: u16, value: u16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(7);
    bytes.push(slave_addr);
    bytes.push(FC_WRITE_HOLDING);
    append_word(&mut bytes, index);
    append_word(&mut bytes, value);
    bytes
}

/// Build a frame payload writing consecutive holding registers (function 0x10).
pub fn generate_pull_set_holdings_request(
    slave_addr: u8,
    start: u16,
    values: &[u16],
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(7 + values.len() * 2);
    bytes.push(slave_addr);
    bytes.push(FC_WRITE_HOLDINGS);
    append_word(&mut bytes, start);
    append_word(&mut bytes, values.len() as u16);
    bytes.push((values.len() * 2) as u8);
    for value in values {
        append_word(&mut bytes, *value);
    }
    bytes
}

/// Check a write acknowledgement against the request that produced it.
///
/// 0x06 replies echo the whole request; 0x10 replies echo its first six bytes.
pub fn parse_pull_set_echo(request: &[u8], reply: &[u8]) -> Result<(), ProtocolError> {
    if request.len() < 6 || reply.len() < 2 {
        return Err(ProtocolError::SizeMismatch {
            expected: 6,
            actual: reply.len(),
        });
    }
    if reply[0] != request[0] {
        return Err(ProtocolError::AddressMismatch {
            expected: request[0],
            received: reply[0],
        });
    }
    if reply[1] == request[1] | 0x80 {
        return Err(ProtocolError::Exception {
            function: reply[1],
            code: reply.get(2).copied().unwrap_or_default(),
        });
    }
    if reply[1] != request[1] {
        return Err(ProtocolError::FunctionCodeMismatch {
            expected: request[1],
            received: reply[1],
        });
    }
    if reply.len() != 6 {
        return Err(ProtocolError::SizeMismatch {
            expected: 6,
            actual: reply.len(),
        });
    }
    if reply[2..6] != request[2..6] {
        return Err(ProtocolError::EchoMismatch);
    }
    Ok(())
}
