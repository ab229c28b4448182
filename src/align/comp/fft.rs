//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Fast Fourier Transform functions.
//!

use crate::volume::{Shape, Volume};
use num_complex::Complex64;
use num_traits::identities::Zero;
use rustfft::{FftDirection, FftPlanner};
use super::process_lines;

/// Calculates the 3-dimensional discrete Fourier transform (or its inverse) of `data` in place.
///
/// Transforms each axis in turn (the row-column algorithm extended to 3 axes). The inverse is
/// normalized by the number of elements.
///
/// # Parameters
///
/// * `shape` - Dimensions of `data`; any lengths are allowed.
/// * `data` - Values in array order (`shape[0]` * `shape[1]` * `shape[2]` elements).
/// * `direction` - Forward or inverse transform.
///
pub fn fft_3d(shape: Shape, data: &mut [Complex64], direction: FftDirection) {
    assert!(data.len() == shape[0] * shape[1] * shape[2]);

    let mut planner = FftPlanner::<f64>::new();
    for axis in (0..3).rev() {
        if shape[axis] == 1 { continue; }

        let fft = planner.plan_fft(shape[axis], direction);
        process_lines(data, shape, axis, |line| fft.process(line));
    }

    if direction == FftDirection::Inverse {
        let norm = data.len() as f64;
        for c in data.iter_mut() {
            *c /= norm;
        }
    }
}

/// Fraction of the strongest cross-power component added to every magnitude before normalizing.
pub const WHITENING_FLOOR: f64 = 0.1;

/// Returns the discrete Fourier transform of `volume` with its mean removed and multiplied by
/// the separable window `windows` (one per axis).
///
/// NaN samples are replaced by the mean of the remaining ones.
///
pub fn fft_apodized(volume: &Volume, windows: &[Vec<f64>; 3]) -> Vec<Complex64> {
    let [n0, n1, n2] = volume.shape();
    assert!(windows[0].len() == n0 && windows[1].len() == n1 && windows[2].len() == n2);

    let (sum, count) = volume.samples().iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), &v| (sum + v as f64, count + 1));
    let mean = if count > 0 { sum / count as f64 } else { 0.0 };

    let mut data: Vec<Complex64> = volume.samples().iter().enumerate().map(|(i, &v)| {
        if v.is_nan() { return Complex64::zero(); }
        let w = windows[0][i / (n1 * n2)] * windows[1][(i / n2) % n1] * windows[2][i % n2];
        Complex64::new((v as f64 - mean) * w, 0.0)
    }).collect();
    fft_3d(volume.shape(), &mut data, FftDirection::Forward);

    data
}

/// Calculates the cross-power spectrum `fft_1 * conj(fft_2)` with regularized whitening.
///
/// Every product `p` is divided by `|p| + WHITENING_FLOOR * max|p|`, so strong components have
/// nearly unit magnitude and components far below the strongest one are attenuated.
///
pub fn calc_cross_power_spectrum(fft_1: &[Complex64], fft_2: &[Complex64]) -> Vec<Complex64> {
    assert!(fft_1.len() == fft_2.len());

    let products: Vec<Complex64> = fft_1.iter().zip(fft_2.iter()).map(|(a, b)| a * b.conj()).collect();
    let max_norm = products.iter().map(|p| p.norm()).fold(0.0, f64::max);
    let floor = (WHITENING_FLOOR * max_norm).max(100.0 * f64::EPSILON);

    products.iter().map(|&p| p / (p.norm() + floor)).collect()
}
