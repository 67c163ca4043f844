pub mod color;
pub mod rle;
