use log::{debug, trace};
use serde::Serialize;

use crate::binary_utils::{read_u16_le, read_u32_le, write_u32};
use crate::bitmap::{BitmapSink, BitmapSource};
use crate::error::{Error, Result};
use crate::formats::rle;

// Package layout:
//   0x00  container tag
//   0x04  size (file length - 8)
//   0x08  16 reserved bytes
//   0x18  directory, one 20 byte entry per slot, then the first tag again
//   ....  blobs, back to back
//
// The entry count is not stored. The directory ends where an entry's tag
// field repeats the first entry's tag; since the terminator is only four
// bytes, that field is the first blob's own tag.

pub const PACKAGE_HEADER_SIZE: usize = 8;
pub const DIRECTORY_OFFSET: usize = 0x18;
pub const DIRECTORY_ENTRY_SIZE: usize = 20;
const RESERVED_SIZE: usize = DIRECTORY_OFFSET - PACKAGE_HEADER_SIZE;
const ENTRY_OFFSET_FIELD: usize = 8;
const MAX_SLOTS: usize = 0x10000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub unk1: u32,
    pub tag: u32,
    pub offset: u32,
    pub group_tag: u32,
    pub width: u16,
    pub height: u16,
}

impl DirectoryEntry {
    /// Zero entry keeping slot numbering dense.
    pub fn placeholder() -> Self {
        DirectoryEntry::default()
    }

    pub fn is_placeholder(&self) -> bool {
        self.tag == 0
    }

    pub fn slot(&self) -> u16 {
        (self.tag & 0xFFFF) as u16
    }

    fn read(data: &[u8], pos: usize) -> Result<Self> {
        Ok(DirectoryEntry {
            unk1: read_u32_le(data, pos)?,
            tag: read_u32_le(data, pos + 4)?,
            offset: read_u32_le(data, pos + 8)?,
            group_tag: read_u32_le(data, pos + 12)?,
            width: read_u16_le(data, pos + 16)?,
            height: read_u16_le(data, pos + 18)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.unk1.to_le_bytes());
        out.extend_from_slice(&self.tag.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.group_tag.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
    }
}

/// An image headed for a package, with its directory identifiers.
pub struct PackageImage<B> {
    pub bitmap: B,
    pub tag: u32,
    pub group_tag: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub tag: u32,
    pub entries: Vec<DirectoryEntry>,
}

impl Package {
    /// Parse the header and directory, checking every entry against the
    /// blob it points at.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let tag = read_u32_le(data, 0)?;
        let size = read_u32_le(data, 4)?;
        let actual = data.len() - PACKAGE_HEADER_SIZE;
        if size as usize != actual {
            return Err(Error::SizeMismatch {
                declared: size,
                actual,
            });
        }

        let entries = read_directory(data)?;

        for entry in entries.iter().filter(|e| !e.is_placeholder()) {
            let blob_tag = read_u32_le(data, entry.offset as usize)?;
            if blob_tag != entry.tag {
                return Err(Error::DirectoryConsistency {
                    entry_tag: entry.tag,
                    blob_tag,
                    offset: entry.offset,
                });
            }
        }

        debug!(
            "Package 0x{:08x}: {} directory slots, {} images",
            tag,
            entries.len(),
            entries.iter().filter(|e| !e.is_placeholder()).count()
        );
        Ok(Package { tag, entries })
    }

    pub fn entry(&self, tag: u32) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| !e.is_placeholder() && e.tag == tag)
    }

    /// Entries that actually point at a blob.
    pub fn images(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_placeholder() && e.offset != 0)
    }

    /// Decode the blob behind `entry`. Unpopulated entries yield `None`.
    pub fn extract<S: BitmapSink>(data: &[u8], entry: &DirectoryEntry) -> Result<Option<(u32, S)>> {
        if entry.is_placeholder() || entry.offset == 0 {
            return Ok(None);
        }
        let start = entry.offset as usize;
        if start >= data.len() {
            return Err(Error::TruncatedInput {
                offset: start,
                needed: rle::BLOB_HEADER_SIZE,
                len: data.len(),
            });
        }
        let decoded = rle::decode(&data[start..], entry.width as u32, entry.height as u32)?;
        Ok(Some(decoded))
    }

    pub fn extract_tag<S: BitmapSink>(&self, data: &[u8], tag: u32) -> Result<Option<(u32, S)>> {
        let entry = self.entry(tag).ok_or(Error::MissingTag(tag))?;
        Self::extract(data, entry)
    }
}

fn read_directory(data: &[u8]) -> Result<Vec<DirectoryEntry>> {
    let mut entries = Vec::new();
    let mut first_tag = None;
    let mut pos = DIRECTORY_OFFSET;

    loop {
        if entries.len() >= MAX_SLOTS || pos + ENTRY_OFFSET_FIELD > data.len() {
            return Err(Error::UnterminatedDirectory {
                entries: entries.len(),
            });
        }
        let tag = read_u32_le(data, pos + 4)?;
        if first_tag == Some(tag) {
            break;
        }
        first_tag.get_or_insert(tag);

        let entry = DirectoryEntry::read(data, pos)?;
        trace!("slot at 0x{:x}: {:?}", pos, entry);
        entries.push(entry);
        pos += DIRECTORY_ENTRY_SIZE;
    }
    Ok(entries)
}

fn checked_dimension(width: u32, height: u32) -> Result<(u16, u16)> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(Error::DimensionOverflow { width, height }),
    }
}

/// Build a package from `images`, ordered by tag, with placeholder
/// entries for every unused slot between consecutive tags.
pub fn encode<B: BitmapSource>(images: &[PackageImage<B>], tag: u32) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(Error::EmptyInput);
    }

    let mut order: Vec<&PackageImage<B>> = images.iter().collect();
    order.sort_by_key(|image| image.tag);

    let mut data = Vec::new();
    data.extend_from_slice(&tag.to_le_bytes());
    // Size, filled in at the end
    data.extend_from_slice(&[0u8; 4]);
    data.extend_from_slice(&[0u8; RESERVED_SIZE]);

    // Directory position of each image, in `order`
    let mut positions = Vec::with_capacity(order.len());
    let mut position = 0usize;
    let mut previous_slot: Option<u16> = None;

    for image in &order {
        if image.tag == 0 {
            return Err(Error::ReservedTag);
        }
        let slot = (image.tag & 0xFFFF) as u16;
        if let Some(previous) = previous_slot {
            if slot <= previous {
                return Err(Error::SlotCollision {
                    tag: image.tag,
                    slot,
                    previous,
                });
            }
            let gap = (slot - previous - 1) as usize;
            if gap > 0 {
                debug!("Inserting {} placeholder slots before 0x{:04x}", gap, slot);
            }
            for _ in 0..gap {
                DirectoryEntry::placeholder().write(&mut data);
                position += 1;
            }
        }
        previous_slot = Some(slot);

        let (width, height) = checked_dimension(image.bitmap.width(), image.bitmap.height())?;
        DirectoryEntry {
            unk1: 0,
            tag: image.tag,
            offset: 0,
            group_tag: image.group_tag,
            width,
            height,
        }
        .write(&mut data);
        positions.push(position);
        position += 1;
    }

    // Terminator, read back as the tag field of one more entry
    data.extend_from_slice(&order[0].tag.to_le_bytes());

    for (image, position) in order.iter().zip(positions) {
        let blob = rle::encode(&image.bitmap, image.tag)?;
        let offset = data.len() as u32;
        let field = DIRECTORY_OFFSET + position * DIRECTORY_ENTRY_SIZE + ENTRY_OFFSET_FIELD;
        write_u32(&mut data, offset, field)?;
        trace!(
            "blob 0x{:08x} at 0x{:x}, {} bytes",
            image.tag,
            offset,
            blob.len()
        );
        data.extend_from_slice(&blob);
    }

    let size = (data.len() - PACKAGE_HEADER_SIZE) as u32;
    write_u32(&mut data, size, 4)?;

    debug!(
        "Encoded package 0x{:08x}: {} images, {} slots, {} bytes",
        tag,
        order.len(),
        position,
        data.len()
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::color::to_rgb565;
    use image::{Rgb, RgbImage};

    fn masked(rgb: [u8; 3]) -> u16 {
        to_rgb565(rgb[0], rgb[1], rgb[2]) & !rle::FLAG_BIT
    }

    fn image_a() -> RgbImage {
        RgbImage::from_fn(12, 5, |x, y| {
            if y == 2 {
                Rgb([0xFF, 0xFF, 0xFF])
            } else {
                Rgb([(x * 20) as u8, 0x80, (y * 40) as u8])
            }
        })
    }

    fn item(bitmap: RgbImage, tag: u32, group_tag: u32) -> PackageImage<RgbImage> {
        PackageImage {
            bitmap,
            tag,
            group_tag,
        }
    }

    // Two images, tags 0x00010001 (1x1 red) and 0x00010003 (2x1 blue),
    // laid out exactly as the firmware tooling writes them.
    #[rustfmt::skip]
    const GOLDEN: [u8; 110] = [
        // header: tag 0xFEED, size 0x66, reserved
        0xED, 0xFE, 0x00, 0x00, 0x66, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        // 0x18: slot 1
        0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
        0x58, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
        0x01, 0x00, 0x01, 0x00,
        // 0x2C: slot 2, placeholder
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
        // 0x40: slot 3
        0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x00,
        0x62, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
        0x02, 0x00, 0x01, 0x00,
        // 0x54: terminator
        0x01, 0x00, 0x01, 0x00,
        // 0x58: blob 0x00010001
        0x01, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00,
        0xF8, 0x00,
        // 0x62: blob 0x00010003
        0x03, 0x00, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00,
        0x00, 0x1F, 0x00, 0x1F,
    ];

    #[test]
    fn matches_golden_layout() {
        let images = vec![
            item(RgbImage::from_pixel(1, 1, Rgb([0xFF, 0, 0])), 0x00010001, 0x10),
            item(RgbImage::from_pixel(2, 1, Rgb([0, 0, 0xFF])), 0x00010003, 0x10),
        ];
        let data = encode(&images, 0xFEED).unwrap();
        assert_eq!(data, GOLDEN.to_vec());
    }

    #[test]
    fn parses_golden_layout() {
        let package = Package::from_bytes(&GOLDEN).unwrap();
        assert_eq!(package.tag, 0xFEED);
        assert_eq!(package.entries.len(), 3);
        assert_eq!(package.entries[0].offset, 0x58);
        assert!(package.entries[1].is_placeholder());
        assert_eq!(package.entries[2].offset, 0x62);
        assert_eq!(package.entries[2].width, 2);

        let (tag, img): (u32, RgbImage) =
            package.extract_tag(&GOLDEN, 0x00010003).unwrap().unwrap();
        assert_eq!(tag, 0x00010003);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0xF8]);
    }

    #[test]
    fn round_trip_with_gap() {
        let a = image_a();
        let images = vec![item(a.clone(), 0x1, 0x10), item(a.clone(), 0x3, 0x10)];
        let data = encode(&images, 0xFEED).unwrap();

        let package = Package::from_bytes(&data).unwrap();
        assert_eq!(package.tag, 0xFEED);
        let slots: Vec<u16> = package.entries.iter().map(|e| e.slot()).collect();
        assert_eq!(slots, vec![1, 0, 3]);
        assert!(package.entries[1].is_placeholder());
        assert_eq!(package.images().count(), 2);

        for tag in [0x1, 0x3] {
            let entry = package.entry(tag).unwrap();
            assert_eq!(entry.group_tag, 0x10);
            assert_eq!((entry.width, entry.height), (12, 5));

            let (blob_tag, decoded): (u32, RgbImage) =
                package.extract_tag(&data, tag).unwrap().unwrap();
            assert_eq!(blob_tag, tag);
            for (x, y, px) in a.enumerate_pixels() {
                assert_eq!(masked(decoded.get_pixel(x, y).0), masked(px.0));
            }
        }
    }

    #[test]
    fn input_order_does_not_matter() {
        let a = image_a();
        let sorted = encode(&[item(a.clone(), 0x1, 1), item(a.clone(), 0x4, 2)], 9).unwrap();
        let reversed = encode(&[item(a.clone(), 0x4, 2), item(a, 0x1, 1)], 9).unwrap();
        assert_eq!(sorted, reversed);
    }

    #[test]
    fn size_field_is_length_minus_header() {
        let data = encode(&[item(image_a(), 0x7, 0)], 0x42).unwrap();
        assert_eq!(read_u32_le(&data, 4).unwrap() as usize, data.len() - 8);
    }

    #[test]
    fn empty_input_rejected() {
        let images: Vec<PackageImage<RgbImage>> = Vec::new();
        assert!(matches!(encode(&images, 1), Err(Error::EmptyInput)));
    }

    #[test]
    fn colliding_slots_rejected() {
        let a = image_a();
        let images = vec![item(a.clone(), 0x00010002, 0), item(a, 0x00020002, 0)];
        assert!(matches!(
            encode(&images, 1),
            Err(Error::SlotCollision { slot: 2, previous: 2, .. })
        ));
    }

    #[test]
    fn mismatched_blob_tag_rejected() {
        let a = image_a();
        let mut data = encode(&[item(a.clone(), 0x1, 0), item(a, 0x2, 0)], 5).unwrap();
        let offset = Package::from_bytes(&data).unwrap().entries[1].offset;
        write_u32(&mut data, 0x99, offset as usize).unwrap();

        match Package::from_bytes(&data) {
            Err(Error::DirectoryConsistency { entry_tag, blob_tag, .. }) => {
                assert_eq!((entry_tag, blob_tag), (0x2, 0x99));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unterminated_directory_rejected() {
        let mut data = vec![0u8; DIRECTORY_OFFSET + DIRECTORY_ENTRY_SIZE];
        let size = (data.len() - 8) as u32;
        write_u32(&mut data, size, 4).unwrap();
        write_u32(&mut data, 0x5, DIRECTORY_OFFSET + 4).unwrap();
        assert!(matches!(
            Package::from_bytes(&data),
            Err(Error::UnterminatedDirectory { entries: 1 })
        ));
    }

    #[test]
    fn directory_scan_stops_at_slot_limit() {
        // Room for one more tag field after the last slot, so only the count bound can stop it
        let len = DIRECTORY_OFFSET + MAX_SLOTS * DIRECTORY_ENTRY_SIZE + ENTRY_OFFSET_FIELD;
        let mut data = vec![0u8; len];
        write_u32(&mut data, (len - 8) as u32, 4).unwrap();
        for i in 0..MAX_SLOTS {
            let pos = DIRECTORY_OFFSET + i * DIRECTORY_ENTRY_SIZE + 4;
            write_u32(&mut data, i as u32 + 1, pos).unwrap();
        }
        assert!(matches!(
            Package::from_bytes(&data),
            Err(Error::UnterminatedDirectory { entries: MAX_SLOTS })
        ));
    }

    #[test]
    fn zero_tag_rejected() {
        let a = image_a();
        let images = vec![item(a.clone(), 0, 0), item(a, 2, 0)];
        assert!(matches!(encode(&images, 0xFEED), Err(Error::ReservedTag)));
    }

    #[test]
    fn bad_size_field_rejected() {
        let mut data = GOLDEN.to_vec();
        data.push(0);
        assert!(matches!(
            Package::from_bytes(&data),
            Err(Error::SizeMismatch { declared: 0x66, actual: 0x67 })
        ));
    }

    #[test]
    fn placeholders_are_not_extracted() {
        let entry = DirectoryEntry::placeholder();
        let out: Option<(u32, RgbImage)> = Package::extract(&GOLDEN, &entry).unwrap();
        assert!(out.is_none());

        let package = Package::from_bytes(&GOLDEN).unwrap();
        assert!(matches!(
            package.extract_tag::<RgbImage>(&GOLDEN, 0x2),
            Err(Error::MissingTag(0x2))
        ));
    }
}
