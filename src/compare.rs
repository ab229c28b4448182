//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Similarity metrics and the similarity report.
//!

use crate::align::comp::filter::box_filter_3d;
use crate::error::{RegistestError, Result};
use crate::volume::Volume;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Side length of the SSIM window.
pub const SSIM_WINDOW: usize = 7;

const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// Dynamic range of normalized volumes.
const DATA_RANGE: f64 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Similarity {
    pub nmse: f64,
    pub ssim: f64
}

fn round6(value: f64) -> f64 { (value * 1.0e6).round() / 1.0e6 }

/// Mean of squared differences.
pub fn nmse(reference: &Volume, target: &Volume) -> Result<f64> {
    reference.check_same_shape(target, Some("NMSE target"))?;

    let sum: f64 = reference.samples().iter().zip(target.samples().iter())
        .map(|(&a, &b)| { let d = a as f64 - b as f64; d * d })
        .sum();

    Ok(sum / reference.len() as f64)
}

/// Mean structural similarity over a uniform `SSIM_WINDOW`^3 window.
///
/// Borders are reflected; the similarity map is averaged without its outer `SSIM_WINDOW / 2` voxels.
///
pub fn ssim(reference: &Volume, target: &Volume) -> Result<f64> {
    reference.check_same_shape(target, Some("SSIM target"))?;
    let shape = reference.shape();
    if shape.iter().any(|&n| n < SSIM_WINDOW) {
        return Err(RegistestError::InvalidArgument(format!(
            "SSIM needs every dimension to be at least {}, got {:?}", SSIM_WINDOW, shape
        )));
    }

    let a: Vec<f64> = reference.samples().iter().map(|&v| v as f64).collect();
    let b: Vec<f64> = target.samples().iter().map(|&v| v as f64).collect();

    let filtered = |values: Vec<f64>| -> Vec<f64> {
        let mut values = values;
        box_filter_3d(shape, &mut values, SSIM_WINDOW);
        values
    };

    let ux = filtered(a.clone());
    let uy = filtered(b.clone());
    let uxx = filtered(a.iter().map(|v| v * v).collect());
    let uyy = filtered(b.iter().map(|v| v * v).collect());
    let uxy = filtered(a.iter().zip(b.iter()).map(|(x, y)| x * y).collect());

    let np = SSIM_WINDOW.pow(3) as f64;
    let cov_norm = np / (np - 1.0);
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let pad = SSIM_WINDOW / 2;
    let mut sum = 0.0;
    let mut count = 0usize;
    for z in pad..shape[0] - pad {
        for x in pad..shape[1] - pad {
            for y in pad..shape[2] - pad {
                let i = (z * shape[1] + x) * shape[2] + y;
                let vx = cov_norm * (uxx[i] - ux[i] * ux[i]);
                let vy = cov_norm * (uyy[i] - uy[i] * uy[i]);
                let vxy = cov_norm * (uxy[i] - ux[i] * uy[i]);

                let s = ((2.0 * ux[i] * uy[i] + c1) * (2.0 * vxy + c2))
                    / ((ux[i] * ux[i] + uy[i] * uy[i] + c1) * (vx + vy + c2));
                sum += s;
                count += 1;
            }
        }
    }

    Ok(sum / count as f64)
}

/// Scores two volumes already normalized to [0, 1]; both metrics are rounded to 6 decimal places.
pub fn score(reference: &Volume, target: &Volume) -> Result<Similarity> {
    Ok(Similarity{
        nmse: round6(nmse(reference, target)?),
        ssim: round6(ssim(reference, target)?)
    })
}

/// CSV report with one row per compared artifact.
pub struct SimilarityReport {
    path: PathBuf
}

impl SimilarityReport {
    pub const FILE_NAME: &'static str = "similarity_report.csv";
    pub const HEADER: &'static str = "method,target,NMSE,SSIM";

    pub fn new(dir: &Path) -> SimilarityReport {
        SimilarityReport{ path: dir.join(SimilarityReport::FILE_NAME) }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Appends a row; the header is written first if the report does not exist yet.
    pub fn append(&self, method: &str, target: &str, similarity: &Similarity) -> Result<()> {
        let is_new = !self.path.exists();
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)
            .map_err(|e| RegistestError::storage(&self.path, e))?;

        let mut text = String::new();
        if is_new {
            text += SimilarityReport::HEADER;
            text += "\n";
        }
        text += &format!("{},{},{},{}\n", csv_field(method), csv_field(target), similarity.nmse, similarity.ssim);

        file.write_all(text.as_bytes()).map_err(|e| RegistestError::storage(&self.path, e))
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
