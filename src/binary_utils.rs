use crate::error::{Error, Result};

fn check_bounds(data: &[u8], pos: usize, needed: usize) -> Result<()> {
    match pos.checked_add(needed) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(Error::TruncatedInput {
            offset: pos,
            needed,
            len: data.len(),
        }),
    }
}

pub fn read_u16_le(data: &[u8], pos: usize) -> Result<u16> {
    check_bounds(data, pos, 2)?;
    Ok(u16::from_le_bytes([data[pos], data[pos + 1]]))
}

/// Colour and control words are stored high byte first.
pub fn read_u16_be(data: &[u8], pos: usize) -> Result<u16> {
    check_bounds(data, pos, 2)?;
    Ok(u16::from_be_bytes([data[pos], data[pos + 1]]))
}

pub fn read_u32_le(data: &[u8], pos: usize) -> Result<u32> {
    check_bounds(data, pos, 4)?;
    Ok(u32::from_le_bytes([
        data[pos],
        data[pos + 1],
        data[pos + 2],
        data[pos + 3],
    ]))
}

pub fn read_bytes(data: &[u8], pos: usize, length: usize) -> Result<&[u8]> {
    check_bounds(data, pos, length)?;
    Ok(&data[pos..pos + length])
}

pub fn write_u32(data: &mut [u8], value: u32, pos: usize) -> Result<()> {
    check_bounds(data, pos, 4)?;
    data[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    Ok(())
}
