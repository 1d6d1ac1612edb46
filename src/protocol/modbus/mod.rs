mod ascii;
mod lrc;
mod pull_get_holdings;
mod pull_set_holdings;
mod slave_holdings;
mod word;

pub use ascii::{decode_ascii, encode_ascii, seal, MIN_FRAME_LEN};
pub use lrc::calc_lrc;
pub use pull_get_holdings::{generate_pull_get_holdings_request, parse_pull_get_holdings};
pub use pull_set_holdings::{
    generate_pull_set_holding_request, generate_pull_set_holdings_request, parse_pull_set_echo,
};
pub use slave_holdings::{
    build_slave_holdings_response, build_slave_set_holding_response,
    build_slave_set_holdings_response,
};
pub use word::{append_word, extract_word};

/// Read holding registers.
pub const FC_READ_HOLDINGS: u8 = 0x03;
/// Write single holding register.
pub const FC_WRITE_HOLDING: u8 = 0x06;
/// Write multiple holding registers.
pub const FC_WRITE_HOLDINGS: u8 = 0x10;

/// Largest register count a single read or write may carry.
pub const MAX_REGISTERS: u16 = 125;

/// Render bytes the way frames are dumped in logs.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
