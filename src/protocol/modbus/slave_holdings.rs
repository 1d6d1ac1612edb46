use super::{append_word, FC_READ_HOLDINGS, FC_WRITE_HOLDINGS};

/// Payload (without LRC) answering a read holding registers request.
pub fn build_slave_holdings_response(slave_addr: u8, values: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(3 + values.len() * 2);
    bytes.push(slave_addr);
    bytes.push(FC_READ_HOLDINGS);
    bytes.push((values.len() * 2) as u8);
    for value in values {
        append_word(&mut bytes, *value);
    }
    bytes
}

/// A single register write is acknowledged by echoing the request header.
pub fn build_slave_set_holding_response(request: &[u8]) -> Vec<u8> {
    request[..request.len().min(6)].to_vec()
}

/// Payload acknowledging a multiple register write: address, function, start and count.
pub fn build_slave_set_holdings_response(slave_addr: u8, start: u16, count: u16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(7);
    bytes.push(slave_addr);
    bytes.push(FC_WRITE_HOLDINGS);
    append_word(&mut bytes, start);
    append_word(&mut bytes, count);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_response() {
        assert_eq!(
            build_slave_holdings_response(1, &[0x0001, 0xFFFF]),
            vec![0x01, 0x03, 0x04, 0x00, 0x01, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_write_multiple_response() {
        assert_eq!(
            build_slave_set_holdings_response(1, 2, 3),
            vec![0x01, 0x10, 0x00, 0x02, 0x00, 0x03]
        );
    }
}
