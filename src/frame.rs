//! Modbus RTU frame checks done before a response is handed to `rmodbus`.
//!
//! `rmodbus` builds the requests and decodes payloads. The checks here make sure a
//! frame is complete and really is the answer to the request that was sent.

use crate::error::Error;

/// Function code for "read holding registers".
pub const READ_HOLDINGS: u8 = 0x03;
/// Function code for "write single register".
pub const WRITE_SINGLE: u8 = 0x06;
/// Set on the function code of an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

/// unit id + function + exception code + 2 CRC.
pub const EXCEPTION_FRAME_LEN: usize = 5;
/// A write single register response echoes the 8 byte request.
pub const WRITE_RESPONSE_LEN: usize = 8;
/// Most registers a single read may ask for.
pub const MAX_READ_COUNT: u16 = 32;

/// Length of the response to a read of `count` holding registers:
/// unit id + function + byte count + data + 2 CRC.
pub const fn read_response_len(count: u16) -> usize {
    5 + 2 * count as usize
}

/// Length the frame in `received` will have once complete, given the length a
/// successful response would have.
pub fn target_len(received: &[u8], expected_len: usize) -> usize {
    match received.get(1) {
        Some(function) if function & EXCEPTION_BIT != 0 => EXCEPTION_FRAME_LEN,
        _ => expected_len,
    }
}

/// Modbus CRC-16 (poly 0xA001, init 0xFFFF). Sent low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Check the CRC, unit id and function code of a response frame.
///
/// Exception responses pass, their code is decoded by `rmodbus` afterwards.
pub fn validate<I: embedded_io::Error>(
    frame: &[u8],
    unit_id: u8,
    function: u8,
) -> Result<(), Error<I>> {
    if frame.len() < EXCEPTION_FRAME_LEN {
        log::warn!("Response too short - received={} bytes", frame.len());
        return Err(Error::InvalidResponse);
    }
    let (body, crc) = frame.split_at(frame.len() - 2);
    let received = u16::from_le_bytes([crc[0], crc[1]]);
    let calculated = crc16(body);
    if received != calculated {
        log::warn!(
            "Invalid CRC - calculated={:04X} received={:04X} frame={:02X?}",
            calculated,
            received,
            frame
        );
        return Err(Error::ModbusError(rmodbus::ErrorKind::FrameCRCError));
    }
    if frame[0] != unit_id {
        log::warn!(
            "Response from wrong unit - expected={} received={}",
            unit_id,
            frame[0]
        );
        return Err(Error::InvalidResponse);
    }
    if frame[1] & !EXCEPTION_BIT != function {
        log::warn!(
            "Function code mismatch - expected={:02X} received={:02X}",
            function,
            frame[1]
        );
        return Err(Error::InvalidResponse);
    }
    Ok(())
}

/// Append the CRC of `body` to it.
#[cfg(test)]
pub fn with_crc(body: &[u8]) -> Vec<u8> {
    let mut frame = body.to_vec();
    frame.extend_from_slice(&crc16(body).to_le_bytes());
    frame
}
