pub mod binary_utils;
pub mod bitmap;
pub mod containers;
pub mod error;
pub mod formats;

pub use bitmap::{BitmapSink, BitmapSource};
pub use containers::package::{DirectoryEntry, Package, PackageImage};
pub use error::{Error, Result};
pub use formats::color::{from_rgb565, to_rgb565};
