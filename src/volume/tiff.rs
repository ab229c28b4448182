//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Multi-page TIFF loading and saving.
//!
//! Every page is one Z plane, with page rows along X and page columns along Y.
//!

use ::tiff::decoder::{Decoder, DecodingResult, Limits};
use ::tiff::encoder::{colortype, TiffEncoder};
use ::tiff::ColorType;
use crate::error::{RegistestError, Result};
use crate::volume::Volume;
use std::path::Path;

pub const EXTENSIONS: [&str; 2] = ["tif", "tiff"];

pub fn has_tiff_extension(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)),
        None => false
    }
}

fn append_samples(samples: &mut Vec<f32>, page: DecodingResult) -> std::result::Result<(), String> {
    match page {
        DecodingResult::U8(values) => samples.extend(values.iter().map(|&v| v as f32)),
        DecodingResult::U16(values) => samples.extend(values.iter().map(|&v| v as f32)),
        DecodingResult::U32(values) => samples.extend(values.iter().map(|&v| v as f32)),
        DecodingResult::F32(values) => samples.extend_from_slice(&values),
        DecodingResult::F64(values) => samples.extend(values.iter().map(|&v| v as f32)),
        _ => return Err("unsupported sample format".to_string())
    }

    Ok(())
}

/// Loads all pages of a grayscale TIFF file as a volume of (pages, rows, columns).
pub fn load_volume(path: &Path) -> Result<Volume> {
    if !has_tiff_extension(path) {
        return Err(RegistestError::invalid_image(path, "expected a .tif or .tiff file"));
    }

    let file = std::fs::File::open(path).map_err(|e| RegistestError::storage(path, e))?;
    let mut decoder = Decoder::new(std::io::BufReader::new(file))
        .map_err(|e| RegistestError::invalid_image(path, e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(|e| RegistestError::invalid_image(path, e))?;
    let mut samples: Vec<f32> = vec![];
    let mut num_pages = 0;
    loop {
        match decoder.colortype().map_err(|e| RegistestError::invalid_image(path, e))? {
            ColorType::Gray(_) => (),
            other => return Err(RegistestError::invalid_image(path, format!("unsupported color type {:?}", other)))
        }

        let page_dims = decoder.dimensions().map_err(|e| RegistestError::invalid_image(path, e))?;
        if page_dims != (width, height) {
            return Err(RegistestError::invalid_image(
                path,
                format!("page {} is {}x{}, expected {}x{}", num_pages, page_dims.0, page_dims.1, width, height)
            ));
        }

        let page = decoder.read_image().map_err(|e| RegistestError::invalid_image(path, e))?;
        append_samples(&mut samples, page).map_err(|e| RegistestError::invalid_image(path, e))?;
        num_pages += 1;

        if !decoder.more_images() { break; }
        decoder.next_image().map_err(|e| RegistestError::invalid_image(path, e))?;
    }

    if num_pages < 2 {
        return Err(RegistestError::invalid_image(path, "The image is not a 3D image. Found 2 dimensions."));
    }

    log::debug!("loaded {} ({} x {} x {})", path.display(), num_pages, height, width);

    Volume::new([num_pages, height as usize, width as usize], samples)
        .map_err(|e| RegistestError::invalid_image(path, e))
}

/// Saves `volume` as 32-bit float grayscale pages.
pub fn save_volume(volume: &Volume, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| RegistestError::storage(path, e))?;
    let mut encoder = TiffEncoder::new(std::io::BufWriter::new(file))
        .map_err(|e| RegistestError::invalid_image(path, e))?;

    let [depth, rows, cols] = volume.shape();
    for z in 0..depth {
        encoder.write_image::<colortype::Gray32Float>(cols as u32, rows as u32, volume.plane(z))
            .map_err(|e| RegistestError::invalid_image(path, e))?;
    }

    log::debug!("saved {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_volume_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vol.tif");
        let v = Volume::from_fn([3, 4, 5], |z, x, y| (z * 20 + x * 5 + y) as f32 * 0.5);

        save_volume(&v, &path).unwrap();

        assert_eq!(v, load_volume(&path).unwrap());
    }

    #[test]
    fn single_page_is_not_a_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.tif");
        save_volume(&Volume::filled([1, 4, 4], 1.0), &path).unwrap();

        match load_volume(&path) {
            Err(RegistestError::InvalidImage{ reason, .. }) => assert!(reason.contains("not a 3D image")),
            other => panic!("unexpected result: {:?}", other)
        }
    }

    #[test]
    fn wrong_extension_is_rejected() {
        assert!(matches!(load_volume(Path::new("volume.png")), Err(RegistestError::InvalidImage{ .. })));
        assert!(has_tiff_extension(Path::new("a/b.TIFF")));
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        assert!(matches!(load_volume(Path::new("/nonexistent/volume.tif")), Err(RegistestError::Storage{ .. })));
    }
}
