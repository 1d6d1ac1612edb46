/// Function-code table of the slave role
///
/// Handlers receive the decoded request (address and function code included, LRC
/// stripped) and the slave's memory block. They validate before touching any register
/// and return the reply payload together with the notifications the write produced.
use super::{block::Block, bus::ItemEvent};
use crate::{
    error::{Error, ProtocolError, RangeError},
    protocol::modbus::{
        build_slave_holdings_response, build_slave_set_holding_response,
        build_slave_set_holdings_response, extract_word, FC_READ_HOLDINGS, FC_WRITE_HOLDING,
        FC_WRITE_HOLDINGS, MAX_REGISTERS,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Reply payload without LRC.
    pub reply: Vec<u8>,
    pub events: Vec<ItemEvent>,
}

pub type Handler = fn(&mut Block, &[u8]) -> Result<Dispatched, Error>;

pub struct FunctionEntry {
    pub code: u8,
    pub name: &'static str,
    pub handler: Handler,
}

pub static FUNCTION_TABLE: &[FunctionEntry] = &[
    FunctionEntry {
        code: FC_READ_HOLDINGS,
        name: "read_holding_registers",
        handler: read_holding_registers,
    },
    FunctionEntry {
        code: FC_WRITE_HOLDING,
        name: "write_single_register",
        handler: write_single_register,
    },
    FunctionEntry {
        code: FC_WRITE_HOLDINGS,
        name: "write_multiple_registers",
        handler: write_multiple_registers,
    },
];

pub fn lookup(code: u8) -> Option<&'static FunctionEntry> {
    FUNCTION_TABLE.iter().find(|entry| entry.code == code)
}

/// Route a request already addressed to this slave.
pub fn dispatch(block: &mut Block, request: &[u8]) -> Result<Dispatched, Error> {
    let code = *request.get(1).ok_or(ProtocolError::SizeMismatch {
        expected: 2,
        actual: request.len(),
    })?;
    let entry = lookup(code).ok_or(ProtocolError::IllegalFunction(code))?;
    log::trace!("Dispatching {} for slave {}", entry.name, request[0]);
    (entry.handler)(block, request)
}

/// `1 <= count <= 125` and the range fits in `size` registers.
pub fn check_range(start: u16, count: u16, size: u16) -> Result<(), RangeError> {
    if count == 0 {
        return Err(RangeError::NoRegisters);
    }
    if count > MAX_REGISTERS {
        return Err(RangeError::TooManyRegisters(count));
    }
    if start as u32 + count as u32 > size as u32 {
        return Err(RangeError::OutOfBounds { start, count, size });
    }
    Ok(())
}

fn expect_len(request: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if request.len() != expected {
        return Err(ProtocolError::SizeMismatch {
            expected,
            actual: request.len(),
        });
    }
    Ok(())
}

fn header_words(request: &[u8]) -> Result<(u16, u16), ProtocolError> {
    match (extract_word(request, 2), extract_word(request, 4)) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(ProtocolError::SizeMismatch {
            expected: 6,
            actual: request.len(),
        }),
    }
}

fn read_holding_registers(block: &mut Block, request: &[u8]) -> Result<Dispatched, Error> {
    expect_len(request, 6)?;
    let (start, count) = header_words(request)?;
    check_range(start, count, block.store().len())?;

    let values = block.store().read(start, count)?;
    Ok(Dispatched {
        reply: build_slave_holdings_response(block.layout().slave_addr, &values),
        events: Vec::new(),
    })
}

fn write_single_register(block: &mut Block, request: &[u8]) -> Result<Dispatched, Error> {
    expect_len(request, 6)?;
    let (index, value) = header_words(request)?;
    check_range(index, 1, block.store().len())?;

    let events = block.set_registers(index, &[value])?;
    Ok(Dispatched {
        reply: build_slave_set_holding_response(request),
        events,
    })
}

fn write_multiple_registers(block: &mut Block, request: &[u8]) -> Result<Dispatched, Error> {
    let (start, count) = header_words(request)?;
    let byte_count = *request.get(6).ok_or(ProtocolError::SizeMismatch {
        expected: 7,
        actual: request.len(),
    })? as usize;

    if byte_count != count as usize * 2 {
        return Err(RangeError::ByteCountMismatch {
            expected: count as usize * 2,
            actual: byte_count,
        }
        .into());
    }
    expect_len(request, 7 + byte_count)?;
    check_range(start, count, block.store().len())?;

    let values: Vec<u16> = (0..count as usize)
        .filter_map(|i| extract_word(request, 7 + i * 2))
        .collect();
    let events = block.set_registers(start, &values)?;
    Ok(Dispatched {
        reply: build_slave_set_holdings_response(block.layout().slave_addr, start, count),
        events,
    })
}
