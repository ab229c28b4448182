//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! 3D scalar volumes.
//!

pub mod shift;
pub mod tiff;

use crate::error::{RegistestError, Result};
use std::path::{Path, PathBuf};

pub use shift::{AxisOrder, FillPolicy, ShiftVector};

/// Volume dimensions in array-axis order (Z, X, Y).
pub type Shape = [usize; 3];

/// Immutable 3D array of `f32` samples; axis 2 is contiguous.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    shape: Shape,
    samples: Vec<f32>
}

impl Volume {
    pub fn new(shape: Shape, samples: Vec<f32>) -> Result<Volume> {
        if shape.iter().any(|&n| n == 0) {
            return Err(RegistestError::InvalidArgument(format!("volume dimensions must be non-zero, got {:?}", shape)));
        }
        if shape[0] * shape[1] * shape[2] != samples.len() {
            return Err(RegistestError::InvalidArgument(
                format!("volume of shape {:?} needs {} samples, got {}", shape, shape[0] * shape[1] * shape[2], samples.len())
            ));
        }

        Ok(Volume{ shape, samples })
    }

    pub fn filled(shape: Shape, value: f32) -> Volume {
        Volume{ shape, samples: vec![value; shape[0] * shape[1] * shape[2]] }
    }

    /// Creates a volume with `f(z, x, y)` as the sample values.
    pub fn from_fn<F: Fn(usize, usize, usize) -> f32>(shape: Shape, f: F) -> Volume {
        let mut samples = Vec::with_capacity(shape[0] * shape[1] * shape[2]);
        for z in 0..shape[0] {
            for x in 0..shape[1] {
                for y in 0..shape[2] {
                    samples.push(f(z, x, y));
                }
            }
        }

        Volume{ shape, samples }
    }

    /// Creates a volume of the same shape as `self` from `samples`.
    pub fn with_same_shape(&self, samples: Vec<f32>) -> Volume {
        assert!(samples.len() == self.samples.len());
        Volume{ shape: self.shape, samples }
    }

    pub fn shape(&self) -> Shape { self.shape }

    pub fn len(&self) -> usize { self.samples.len() }

    pub fn samples(&self) -> &[f32] { &self.samples }

    pub fn into_samples(self) -> Vec<f32> { self.samples }

    pub fn index(&self, z: usize, x: usize, y: usize) -> usize {
        (z * self.shape[1] + x) * self.shape[2] + y
    }

    pub fn get(&self, z: usize, x: usize, y: usize) -> f32 { self.samples[self.index(z, x, y)] }

    /// Returns the samples of Z plane `z` (rows: X, columns: Y).
    pub fn plane(&self, z: usize) -> &[f32] {
        let plane_len = self.shape[1] * self.shape[2];
        &self.samples[z * plane_len..(z + 1) * plane_len]
    }

    /// Returns (min, max) of non-NaN samples.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.samples.iter().filter(|v| !v.is_nan()).fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v)))
        })
    }

    /// Returns a copy min-max scaled to [0, 1].
    ///
    /// NaN samples become 0. A volume without range (constant or all-NaN) becomes all zeros.
    ///
    pub fn normalized(&self) -> Volume {
        let (min, max) = match self.min_max() {
            Some((min, max)) if max > min => (min, max),
            _ => return Volume::filled(self.shape, 0.0)
        };
        let range = max - min;

        Volume{
            shape: self.shape,
            samples: self.samples.iter().map(|&v| if v.is_nan() { 0.0 } else { (v - min) / range }).collect()
        }
    }

    /// Fails with `ShapeMismatch` unless `other` has the same shape.
    pub fn check_same_shape(&self, other: &Volume, context: Option<&str>) -> Result<()> {
        if self.shape != other.shape {
            return Err(RegistestError::ShapeMismatch{
                expected: self.shape,
                actual: other.shape,
                context: context.map(|c| c.to_string())
            });
        }
        Ok(())
    }
}

/// A loaded reference volume together with its identity.
#[derive(Debug)]
pub struct ReferenceImage {
    path: PathBuf,
    basename: String,
    volume: Volume
}

impl ReferenceImage {
    pub fn load(path: &Path) -> Result<ReferenceImage> {
        let path = std::path::absolute(path).map_err(|e| RegistestError::storage(path, e))?;
        let volume = self::tiff::load_volume(&path)?;
        ReferenceImage::new(path, volume)
    }

    pub fn new(path: PathBuf, volume: Volume) -> Result<ReferenceImage> {
        let basename = basename(&path)
            .ok_or_else(|| RegistestError::invalid_image(&path, "cannot determine the file name"))?;

        Ok(ReferenceImage{ path, basename, volume })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn basename(&self) -> &str { &self.basename }

    pub fn volume(&self) -> &Volume { &self.volume }
}

/// Returns the file name up to its first dot (`ref.ome.tif` -> `ref`).
pub fn basename(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.split('.').next().unwrap_or(file_name);
    if stem.is_empty() { None } else { Some(stem.to_string()) }
}
