use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use image::{imageops, imageops::FilterType, RgbImage};
use log::{info, warn};

use chitu_logo::containers::package::{self, Package, PackageImage};
use chitu_logo::formats::rle;
use chitu_logo::{Error, Result};

use super::args::parse_int;

const MANIFEST_NAME: &str = "package.json";

pub fn encode_blob(input: &Path, output: &Path, tag: u32, width: u32, height: u32) -> Result<()> {
    ensure_input_file(input)?;
    ensure_output_parent(output)?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }

    let img = load_image(input)?;
    let img = fit(&img, width, height);
    let data = rle::encode(&img, tag)?;
    fs::write(output, &data)?;

    info!(
        "Encoded {} as 0x{:08x} ({}x{}, {} bytes) to {}",
        input.display(),
        tag,
        width,
        height,
        data.len(),
        output.display()
    );
    Ok(())
}

pub fn decode_blob(input: &Path, output: Option<&Path>, width: u32, height: u32) -> Result<()> {
    ensure_input_file(input)?;
    let data = fs::read(input)?;
    let (tag, img): (u32, RgbImage) = rle::decode(&data, width, height)?;
    info!("Decoded blob 0x{:08x} ({}x{})", tag, width, height);

    if let Some(output) = output {
        ensure_output_parent(output)?;
        save_png(&img, output)?;
        info!("Saved {}", output.display());
    }
    Ok(())
}

pub fn decode_package(input: &Path, tags: Option<&[u32]>, output_dir: Option<&Path>) -> Result<()> {
    ensure_input_file(input)?;
    let data = fs::read(input)?;
    let package = Package::from_bytes(&data)?;

    let output_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("0x{:x}", package.tag)));
    fs::create_dir_all(&output_dir)?;
    remove_stale_images(&output_dir)?;

    let mut written = 0;
    for entry in package.images() {
        if let Some(tags) = tags {
            if !tags.contains(&entry.tag) {
                continue;
            }
        }
        let Some((tag, img)) = Package::extract::<RgbImage>(&data, entry)? else {
            continue;
        };
        let path = output_dir.join(image_file_name(tag, entry.group_tag));
        save_png(&img, &path)?;
        written += 1;
    }

    if let Some(tags) = tags {
        for tag in tags.iter().filter(|tag| package.entry(**tag).is_none()) {
            warn!("Tag 0x{:x} is not in package 0x{:x}", tag, package.tag);
        }
    }

    write_manifest(&package, &output_dir.join(MANIFEST_NAME))?;
    info!(
        "Extracted {} images from package 0x{:08x} to {}",
        written,
        package.tag,
        output_dir.display()
    );
    Ok(())
}

pub fn encode_package(input: &Path, output: &Path, tag: Option<u32>) -> Result<()> {
    if !input.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("The folder {} does not exist", input.display()),
        )
        .into());
    }
    let tag = match tag {
        Some(tag) => tag,
        None => tag_from_folder(input)?,
    };
    ensure_output_parent(output)?;

    let mut images = Vec::new();
    for path in list_image_files(input)? {
        let Some((tag, group_tag)) = parse_image_file_name(&path) else {
            continue;
        };
        let bitmap = load_image(&path)?;
        images.push(PackageImage {
            bitmap,
            tag,
            group_tag,
        });
    }

    let data = package::encode(&images, tag)?;
    fs::write(output, &data)?;
    info!(
        "Packed {} images into package 0x{:08x} ({} bytes) at {}",
        images.len(),
        tag,
        data.len(),
        output.display()
    );
    Ok(())
}

fn ensure_input_file(path: &Path) -> io::Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("The path {} does not exist", path.display()),
        ))
    }
}

fn ensure_output_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };
    if parent.is_dir() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("The output directory {} does not exist", parent.display()),
        ))
    }
}

fn tag_from_folder(input: &Path) -> io::Result<u32> {
    input
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| parse_int(name).ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "Failed to get tag from folder name, please specify a 4 byte tag with --tag 0x12345678",
            )
        })
}

fn load_image(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Centre-crop to the target aspect ratio, then resample to the target size.
fn fit(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = img.dimensions();
    if (src_w, src_h) == (width, height) {
        return img.clone();
    }

    let (crop_w, crop_h) = if src_w as u64 * height as u64 > src_h as u64 * width as u64 {
        ((src_h as u64 * width as u64 / height as u64) as u32, src_h)
    } else {
        (src_w, (src_w as u64 * height as u64 / width as u64) as u32)
    };
    let (crop_w, crop_h) = (crop_w.max(1), crop_h.max(1));
    let x = (src_w - crop_w) / 2;
    let y = (src_h - crop_h) / 2;

    let cropped = imageops::crop_imm(img, x, y, crop_w, crop_h).to_image();
    imageops::resize(&cropped, width, height, FilterType::Lanczos3)
}

fn image_file_name(tag: u32, group_tag: u32) -> String {
    format!("img_0x{:x}_0x{:x}.png", tag, group_tag)
}

/// `img_<tag>_<group>.png` -> (tag, group)
fn parse_image_file_name(path: &Path) -> Option<(u32, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.split('_');
    if parts.next()? != "img" {
        return None;
    }
    let tag = parse_int(parts.next()?).ok()?;
    let group_tag = parse_int(parts.next()?).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((tag, group_tag))
}

fn is_image_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("png")
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with("img_"))
}

fn list_image_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn remove_stale_images(dir: &Path) -> io::Result<()> {
    for path in list_image_files(dir)? {
        if parse_image_file_name(&path).is_some() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn write_manifest(package: &Package, path: &Path) -> io::Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, package)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(())
}

fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    let temp_path = path.with_extension("temp.png");
    img.save(&temp_path)?;

    let mut options = oxipng::Options::from_preset(2);
    options.bit_depth_reduction = true;
    options.interlace = None;

    match oxipng::optimize(
        &oxipng::InFile::Path(temp_path.clone()),
        &oxipng::OutFile::Path(Some(path.to_path_buf())),
        &options,
    ) {
        Ok(_) => {
            let _ = fs::remove_file(temp_path);
        }
        Err(e) => {
            fs::rename(&temp_path, path)?;
            warn!(
                "oxipng optimisation failed for {}: {}. File saved unoptimised.",
                path.display(),
                e
            );
        }
    }
    Ok(())
}
