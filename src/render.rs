//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Overlay images for qualitative inspection of registration results.
//!

use crate::error::{RegistestError, Result};
use crate::volume::Volume;
use std::path::Path;

pub trait OverlayRenderer {
    /// Renders `reference` and `registered` (same shape) into one image saved as `path`.
    fn render(&self, reference: &Volume, registered: &Volume, path: &Path) -> Result<()>;
}

/// Maximum-intensity projections along Z: reference in red, registered volume in green.
pub struct MaxProjectionOverlay;

/// Returns the Z maximum-intensity projection (X rows, Y columns) of a volume normalized to [0, 1].
fn max_projection(volume: &Volume) -> Vec<f32> {
    let [nz, nx, ny] = volume.shape();
    let mut projection = vec![0.0f32; nx * ny];
    for z in 0..nz {
        for (p, &v) in projection.iter_mut().zip(volume.plane(z).iter()) {
            *p = p.max(v);
        }
    }

    projection
}

fn to_u8(value: f32) -> u8 { (value.clamp(0.0, 1.0) * 255.0).round() as u8 }

impl OverlayRenderer for MaxProjectionOverlay {
    fn render(&self, reference: &Volume, registered: &Volume, path: &Path) -> Result<()> {
        let context = path.to_string_lossy();
        reference.check_same_shape(registered, Some(&context))?;
        let [_, rows, columns] = reference.shape();

        let red = max_projection(&reference.normalized());
        let green = max_projection(&registered.normalized());
        let rgb: Vec<u8> = red.iter().zip(green.iter()).flat_map(|(&r, &g)| [to_u8(r), to_u8(g), 0]).collect();

        let render_error = |reason: String| RegistestError::Render{ path: path.to_path_buf(), reason };

        let file = std::fs::File::create(path).map_err(|e| RegistestError::storage(path, e))?;
        let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), columns as u32, rows as u32);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder.write_header().map_err(|e| render_error(e.to_string()))?;
        writer.write_image_data(&rgb).map_err(|e| render_error(e.to_string()))?;
        writer.finish().map_err(|e| render_error(e.to_string()))?;

        log::debug!("saved overlay '{}'", path.display());
        Ok(())
    }
}
