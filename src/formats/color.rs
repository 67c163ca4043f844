/// Pack an RGB888 colour into RGB565 by truncating each channel.
pub fn to_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Expand RGB565 back to RGB888. Discarded low bits come back as zero.
pub fn from_rgb565(word: u16) -> [u8; 3] {
    let r = ((word & 0xF800) >> 8) as u8;
    let g = ((word & 0x07E0) >> 3) as u8;
    let b = ((word & 0x001F) << 3) as u8;
    [r, g, b]
}
