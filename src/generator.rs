//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Synthetic reference volumes made of Gaussian spots.
//!

use crate::volume::{Shape, Volume};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const PEAK: f32 = 65535.0;

pub const BACKGROUND: f32 = 10.0;

/// Voxel size (Z, X, Y) in microns of a typical widefield stack.
pub const DEFAULT_VOXEL_SIZE: [f64; 3] = [0.25, 0.1, 0.1];

fn linspace(n: usize, scale: f64) -> Vec<f64> {
    if n == 1 {
        return vec![-scale];
    }
    (0..n).map(|i| (-1.0 + 2.0 * i as f64 / (n - 1) as f64) * scale).collect()
}

/// Returns a Gaussian spot `exp(-attenuation·r²)` centered in a volume of `shape`, scaled to `PEAK`.
///
/// Coordinates span [-1, 1] along every axis, stretched by the axis's voxel size relative
/// to the smallest one.
///
pub fn generate_psf(shape: Shape, voxel_size: [f64; 3], attenuation: f64) -> Volume {
    let min_size = voxel_size.iter().cloned().fold(f64::INFINITY, f64::min);
    let coords: Vec<Vec<f64>> = (0..3).map(|d| linspace(shape[d], voxel_size[d] / min_size)).collect();

    let mut psf = Volume::from_fn(shape, |z, x, y| {
        let r2 = coords[0][z].powi(2) + coords[1][x].powi(2) + coords[2][y].powi(2);
        (-attenuation * r2).exp() as f32
    });

    let max = psf.min_max().map(|(_, max)| max).unwrap_or(1.0);
    if max > 0.0 {
        let scaled = psf.samples().iter().map(|v| v / max * PEAK).collect();
        psf = psf.with_same_shape(scaled);
    }

    psf
}

/// Returns `image` with `psf` added, centered at `position` and clipped at the borders.
///
/// The sum is rescaled so that its maximum does not exceed `PEAK`.
///
pub fn add_psf(image: &Volume, psf: &Volume, position: [usize; 3]) -> Volume {
    let shape = image.shape();
    let psf_shape = psf.shape();

    let mut start = [0usize; 3];
    let mut end = [0usize; 3];
    let mut psf_start = [0usize; 3];
    for d in 0..3 {
        let half = psf_shape[d] / 2;
        start[d] = position[d].saturating_sub(half);
        end[d] = (position[d] + half).min(shape[d]).max(start[d]);
        psf_start[d] = half.saturating_sub(position[d]);
    }

    let mut combined: Vec<f64> = image.samples().iter().map(|&v| v as f64).collect();
    for z in start[0]..end[0] {
        let pz = psf_start[0] + z - start[0];
        for x in start[1]..end[1] {
            let px = psf_start[1] + x - start[1];
            for y in start[2]..end[2] {
                let py = psf_start[2] + y - start[2];
                combined[image.index(z, x, y)] += psf.get(pz, px, py) as f64;
            }
        }
    }

    let max = combined.iter().cloned().fold(PEAK as f64, f64::max);
    image.with_same_shape(combined.iter().map(|v| (v / max * PEAK as f64) as f32).collect())
}

/// Returns a volume of `count` spots of random width placed at random positions on a
/// constant background. Identical seeds give identical volumes.
pub fn synthetic_spots(shape: Shape, count: usize, seed: u64) -> Volume {
    let mut rng = StdRng::seed_from_u64(seed);
    let psf_shape = [shape[0], (shape[1] / 2).max(1), (shape[2] / 2).max(1)];

    let mut image = Volume::filled(shape, BACKGROUND);
    for _ in 0..count {
        let attenuation = rng.random_range(30..=70) as f64;
        let position = [
            rng.random_range(0..shape[0]),
            rng.random_range(0..shape[1]),
            rng.random_range(0..shape[2])
        ];
        let psf = generate_psf(psf_shape, DEFAULT_VOXEL_SIZE, attenuation);
        image = add_psf(&image, &psf, position);
    }

    log::info!("generated {} spots in a volume of {:?} (seed {})", count, shape, seed);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psf_peaks_in_center() {
        let psf = generate_psf([9, 11, 13], [1.0, 1.0, 1.0], 5.0);
        assert_eq!(PEAK, psf.get(4, 5, 6));
        assert!(psf.get(0, 0, 0) < psf.get(4, 5, 6) * 0.01);
        assert!((psf.get(3, 5, 6) - psf.get(5, 5, 6)).abs() < 1.0e-3);
    }

    #[test]
    fn larger_voxels_make_spot_narrower() {
        let psf = generate_psf([9, 9, 9], DEFAULT_VOXEL_SIZE, 2.0);
        // z is stretched by 2.5 relative to x and y
        assert!(psf.get(3, 4, 4) < psf.get(4, 3, 4));
    }

    #[test]
    fn psf_is_added_at_position_and_clipped() {
        let image = Volume::filled([10, 10, 10], 0.0);
        let psf = generate_psf([5, 5, 5], [1.0, 1.0, 1.0], 3.0);

        let centered = add_psf(&image, &psf, [5, 5, 5]);
        assert_eq!(PEAK, centered.get(5, 5, 5));

        let corner = add_psf(&image, &psf, [0, 0, 0]);
        assert_eq!(PEAK, corner.get(0, 0, 0));
        assert_eq!(0.0, corner.get(5, 5, 5));
    }

    #[test]
    fn sum_is_rescaled_to_peak() {
        let psf = generate_psf([3, 3, 3], [1.0, 1.0, 1.0], 1.0);
        let once = add_psf(&Volume::filled([6, 6, 6], 0.0), &psf, [3, 3, 3]);
        let twice = add_psf(&once, &psf, [3, 3, 3]);
        assert_eq!(PEAK, twice.get(3, 3, 3));
        assert!(twice.samples().iter().all(|&v| v <= PEAK));
    }

    #[test]
    fn spots_are_reproducible() {
        let a = synthetic_spots([8, 16, 16], 5, 7);
        let b = synthetic_spots([8, 16, 16], 5, 7);
        let c = synthetic_spots([8, 16, 16], 5, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.min_max().unwrap().1 > BACKGROUND);
    }
}
