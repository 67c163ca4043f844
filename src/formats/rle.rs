use log::{debug, trace};

use super::color::{from_rgb565, to_rgb565};
use crate::binary_utils::{read_bytes, read_u16_be, read_u32_le, write_u32};
use crate::bitmap::{BitmapSink, BitmapSource};
use crate::error::{Error, Result};

// A blob is an 8 byte header (tag, payload length) followed by a stream of
// big-endian 16-bit words. Each word is either an RGB565 colour or, when the
// previous colour had FLAG_BIT set, a control word 0x3NNN meaning
// "paint the current colour NNN more times".

pub const BLOB_HEADER_SIZE: usize = 8;
/// Bit of a colour word announcing that a control word follows.
/// It is the lowest green bit, so it does not survive a round trip.
pub const FLAG_BIT: u16 = 0x0020;
pub const MAX_CONTROL_RUN: usize = 0xFFE;
const CONTROL_MARKER: u8 = 0x30;
const CONTROL_COUNT_MASK: u16 = 0x0FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    RawColor(u16),
    ControlRun(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    pub tag: u32,
    pub payload_length: u32,
}

impl BlobHeader {
    pub fn read(data: &[u8]) -> Result<Self> {
        Ok(BlobHeader {
            tag: read_u32_le(data, 0)?,
            payload_length: read_u32_le(data, 4)?,
        })
    }
}

/// Output buffer plus the single bit of state the run commit needs.
struct RunEncoder {
    data: Vec<u8>,
    last_was_control: bool,
    runs: usize,
}

impl RunEncoder {
    fn new(tag: u32) -> Self {
        let mut data = Vec::with_capacity(1024);
        data.extend_from_slice(&tag.to_le_bytes());
        // Payload length, filled in by finish()
        data.extend_from_slice(&[0u8; 4]);
        RunEncoder {
            data,
            last_was_control: false,
            runs: 0,
        }
    }

    fn body_len(&self) -> usize {
        self.data.len() - BLOB_HEADER_SIZE
    }

    fn push_color(&mut self, color: u16) {
        // A plain colour must never look like it announces a control word
        if !self.last_was_control && self.body_len() > 0 {
            if let Some(low) = self.data.last_mut() {
                *low &= !(FLAG_BIT as u8);
            }
        }
        self.data.extend_from_slice(&color.to_be_bytes());
        self.last_was_control = false;
    }

    fn push_control(&mut self, count: usize) {
        if let Some(low) = self.data.last_mut() {
            *low |= FLAG_BIT as u8;
        }
        let high = CONTROL_MARKER | ((count >> 8) & 0xF) as u8;
        let low = (count & 0xFF) as u8;
        self.data.push(high);
        self.data.push(low);
        self.last_was_control = true;
    }

    fn commit(&mut self, color: u16, mut count: usize) {
        if count > 0 {
            self.runs += 1;
        }
        while count > 0 {
            self.push_color(color);
            count -= 1;

            // Never spend a control word on a single repeat
            if count == 1 {
                self.push_color(color);
                count -= 1;
            }
            if count == 0 {
                break;
            }

            let chunk = count.min(MAX_CONTROL_RUN);
            trace!("run 0x{:04x}: control word for {} repeats", color, chunk);
            self.push_control(chunk);
            count -= chunk;
        }
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        let body_len = self.body_len() as u32;
        write_u32(&mut self.data, body_len, 4)?;
        Ok(self.data)
    }
}

/// Encode a row-major stream of RGB565 words into a blob.
pub fn encode_rgb565<I>(words: I, tag: u32) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = u16>,
{
    let mut encoder = RunEncoder::new(tag);
    let mut current: Option<(u16, usize)> = None;

    for word in words {
        current = match current {
            Some((color, count)) if color == word => Some((color, count + 1)),
            Some((color, count)) => {
                encoder.commit(color, count);
                Some((word, 1))
            }
            None => Some((word, 1)),
        };
    }
    if let Some((color, count)) = current {
        encoder.commit(color, count);
    }

    debug!(
        "Encoded blob 0x{:08x}: {} runs, {} body bytes",
        tag,
        encoder.runs,
        encoder.body_len()
    );
    encoder.finish()
}

/// Encode a bitmap into a blob carrying `tag`.
pub fn encode<B: BitmapSource>(bitmap: &B, tag: u32) -> Result<Vec<u8>> {
    let (width, height) = (bitmap.width(), bitmap.height());
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }

    let words = (0..height).flat_map(|y| {
        (0..width).map(move |x| {
            let [r, g, b] = bitmap.pixel(x, y);
            to_rgb565(r, g, b)
        })
    });
    encode_rgb565(words, tag)
}

/// Reads words from a blob body, classifying each with one word of lookback.
pub struct TokenReader<'a> {
    data: &'a [u8],
    pos: usize,
    previous_raw: u16,
}

impl<'a> TokenReader<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        TokenReader {
            data: blob,
            pos: BLOB_HEADER_SIZE,
            previous_raw: 0,
        }
    }

    /// A control word is only recognised when the caller allows one and the
    /// last colour word carried FLAG_BIT.
    pub fn next_token(&mut self, control_allowed: bool) -> Result<Token> {
        let word = read_u16_be(self.data, self.pos)?;
        self.pos += 2;

        let high = (word >> 8) as u8;
        if control_allowed && high & 0xF0 == CONTROL_MARKER && self.previous_raw & FLAG_BIT != 0 {
            Ok(Token::ControlRun(word & CONTROL_COUNT_MASK))
        } else {
            self.previous_raw = word;
            Ok(Token::RawColor(word))
        }
    }

    /// Body bytes read so far.
    pub fn consumed(&self) -> usize {
        self.pos - BLOB_HEADER_SIZE
    }
}

/// Decode a blob into a fresh bitmap of the given size.
pub fn decode<S: BitmapSink>(data: &[u8], width: u32, height: u32) -> Result<(u32, S)> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let header = BlobHeader::read(data)?;

    // Each word paints at most CONTROL_COUNT_MASK pixels
    let available = (header.payload_length as usize).min(data.len() - BLOB_HEADER_SIZE);
    let max_pixels = (available / 2) as u64 * CONTROL_COUNT_MASK as u64;
    if width as u64 * height as u64 > max_pixels {
        return Err(Error::DimensionsExceedPayload {
            width,
            height,
            declared: header.payload_length,
        });
    }

    let mut bitmap = S::new_bitmap(width, height);
    let mut reader = TokenReader::new(data);
    let mut color = [0u8; 3];
    // Negative means the last word was a colour, so a control word may follow
    let mut remaining: i64 = -1;

    for y in 0..height {
        for x in 0..width {
            if remaining <= 0 {
                match reader.next_token(remaining < 0)? {
                    Token::ControlRun(count) => remaining = count as i64,
                    Token::RawColor(word) => color = from_rgb565(word),
                }
            }
            bitmap.set_pixel(x, y, color);
            remaining -= 1;
        }
    }

    if reader.consumed() > header.payload_length as usize {
        return Err(Error::BufferOverrun {
            consumed: reader.consumed(),
            declared: header.payload_length,
        });
    }

    debug!(
        "Decoded blob 0x{:08x}: {}x{}, {} of {} body bytes used",
        header.tag,
        width,
        height,
        reader.consumed(),
        header.payload_length
    );
    Ok((header.tag, bitmap))
}

/// Parse a whole blob body into tokens without painting anything.
pub fn tokens(data: &[u8]) -> Result<Vec<Token>> {
    let header = BlobHeader::read(data)?;
    let end = BLOB_HEADER_SIZE + header.payload_length as usize;
    let blob = read_bytes(data, 0, end)?;

    let mut reader = TokenReader::new(blob);
    let mut out = Vec::new();
    // After a non-empty control run the decoder always expects a colour
    let mut control_allowed = true;
    while BLOB_HEADER_SIZE + reader.consumed() < end {
        let token = reader.next_token(control_allowed)?;
        control_allowed = !matches!(token, Token::ControlRun(count) if count > 0);
        out.push(token);
    }
    Ok(out)
}
