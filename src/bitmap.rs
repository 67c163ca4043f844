use image::{Rgb, RgbImage};

/// Anything that can hand the encoder RGB888 pixels in row-major order.
pub trait BitmapSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn pixel(&self, x: u32, y: u32) -> [u8; 3];
}

/// Anything the decoder can paint into.
pub trait BitmapSink: Sized {
    fn new_bitmap(width: u32, height: u32) -> Self;
    fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]);
}

impl BitmapSource for RgbImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.get_pixel(x, y).0
    }
}

impl BitmapSink for RgbImage {
    fn new_bitmap(width: u32, height: u32) -> Self {
        RgbImage::new(width, height)
    }

    fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        self.put_pixel(x, y, Rgb(rgb));
    }
}
