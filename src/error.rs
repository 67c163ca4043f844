use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Input truncated: need {needed} bytes at offset 0x{offset:x}, buffer is {len} bytes")]
    TruncatedInput {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("Buffer overrun: decoded body consumed {consumed} bytes, payload declares {declared}")]
    BufferOverrun { consumed: usize, declared: u32 },

    #[error(
        "Directory entry tag 0x{entry_tag:08x} does not match blob tag 0x{blob_tag:08x} at offset 0x{offset:x}"
    )]
    DirectoryConsistency {
        entry_tag: u32,
        blob_tag: u32,
        offset: u32,
    },

    #[error("{width}x{height} pixels cannot be painted from a {declared} byte payload")]
    DimensionsExceedPayload {
        width: u32,
        height: u32,
        declared: u32,
    },

    #[error("Tag 0 marks placeholder directory entries and cannot name an image")]
    ReservedTag,

    #[error("Package must contain at least one image")]
    EmptyInput,

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Image dimensions {width}x{height} do not fit the 16-bit directory fields")]
    DimensionOverflow { width: u32, height: u32 },

    #[error("Directory is not terminated (scanned {entries} entries)")]
    UnterminatedDirectory { entries: usize },

    #[error("Tag 0x{tag:08x} maps to directory slot 0x{slot:04x}, which is not after slot 0x{previous:04x}")]
    SlotCollision { tag: u32, slot: u16, previous: u16 },

    #[error("Package size field says {declared} bytes, actual payload is {actual}")]
    SizeMismatch { declared: u32, actual: usize },

    #[error("No directory entry with tag 0x{0:08x}")]
    MissingTag(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
