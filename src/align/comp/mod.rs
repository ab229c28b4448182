//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Computations module.
//!

use crate::error::Result;
use crate::volume::{AxisOrder, FillPolicy, Shape, ShiftVector, Volume};
use num_complex::Complex64;
use num_traits::identities::Zero;
use rayon::prelude::*;
use rustfft::FftDirection;

pub mod affine;
pub mod fft;
pub mod filter;
pub mod warp;

/// Upsampling factor of the sub-voxel refinement in `determine_translation`.
pub const UPSAMPLE_FACTOR: usize = 100;

/// Fraction of every axis tapered by the window applied before phase correlation.
pub const TAPER_FRACTION: f64 = 0.5;

/// Number of phase correlation passes of `determine_translation`.
pub const CORRELATION_PASSES: usize = 3;

/// Calls `f` on every line of `data` along `axis`; lines are processed in parallel.
///
/// Lines along axis 2 are passed in place, others are gathered into temporary buffers and written back.
///
pub fn process_lines<T, F>(data: &mut [T], shape: Shape, axis: usize, f: F)
where T: Copy + Send + Sync,
      F: Fn(&mut [T]) + Sync
{
    let [n0, n1, n2] = shape;
    assert!(data.len() == n0 * n1 * n2);

    match axis {
        2 => data.par_chunks_mut(n2).for_each(|line| f(line)),

        1 => data.par_chunks_mut(n1 * n2).for_each(|plane| {
            let mut line = Vec::with_capacity(n1);
            for y in 0..n2 {
                line.clear();
                line.extend((0..n1).map(|x| plane[x * n2 + y]));
                f(&mut line);
                for (x, value) in line.iter().enumerate() {
                    plane[x * n2 + y] = *value;
                }
            }
        }),

        _ => {
            let plane_len = n1 * n2;
            let src: &[T] = data;
            let lines: Vec<Vec<T>> = (0..plane_len).into_par_iter().map(|p| {
                let mut line: Vec<T> = (0..n0).map(|z| src[z * plane_len + p]).collect();
                f(&mut line);
                line
            }).collect();

            for (p, line) in lines.iter().enumerate() {
                for (z, value) in line.iter().enumerate() {
                    data[z * plane_len + p] = *value;
                }
            }
        }
    }
}

/// Returns the frequency of index `k` of an `n`-point DFT, in cycles per sample divided by `upsample`.
fn fft_freq(k: usize, n: usize, upsample: f64) -> f64 {
    let k = if k <= (n - 1) / 2 { k as f64 } else { k as f64 - n as f64 };
    k / (n as f64 * upsample)
}

/// Returns the `region` x `n` matrix `exp(2πi (u - offset) f(k))` (row-major in `u`).
fn dft_kernel(n: usize, region: usize, upsample: f64, offset: f64) -> Vec<Complex64> {
    let mut kernel = Vec::with_capacity(region * n);
    for u in 0..region {
        for k in 0..n {
            let phase = 2.0 * std::f64::consts::PI * (u as f64 - offset) * fft_freq(k, n, upsample);
            kernel.push(Complex64::from_polar(1.0, phase));
        }
    }

    kernel
}

/// Evaluates the inverse DFT of `spectrum` on a `region`^3 grid with spacing 1/`upsample`,
/// whose element `u` along axis `d` corresponds to the position `(u - offsets[d]) / upsample`.
///
/// Based on:
///
///   Efficient subpixel image registration algorithms
///   Manuel Guizar-Sicairos, Samuel T. Thurman, James R. Fienup
///
/// The axes are contracted one at a time, starting with the contiguous one.
///
fn upsampled_dft(
    spectrum: &[Complex64],
    shape: Shape,
    region: usize,
    upsample: f64,
    offsets: [f64; 3]
) -> Vec<Complex64> {
    let [n0, n1, n2] = shape;
    let kernels: Vec<Vec<Complex64>> = (0..3).map(|d| dft_kernel(shape[d], region, upsample, offsets[d])).collect();

    // [k0][k1][u2]
    let mut contracted_2 = vec![Complex64::zero(); n0 * n1 * region];
    contracted_2.par_chunks_mut(region).enumerate().for_each(|(line_idx, out)| {
        let line = &spectrum[line_idx * n2..(line_idx + 1) * n2];
        for (u2, value) in out.iter_mut().enumerate() {
            let row = &kernels[2][u2 * n2..(u2 + 1) * n2];
            *value = line.iter().zip(row.iter()).map(|(a, b)| a * b).sum();
        }
    });

    // [k0][u1][u2]
    let mut contracted_1 = vec![Complex64::zero(); n0 * region * region];
    contracted_1.par_chunks_mut(region * region).enumerate().for_each(|(k0, out)| {
        for u1 in 0..region {
            let acc = &mut out[u1 * region..(u1 + 1) * region];
            for k1 in 0..n1 {
                let w = kernels[1][u1 * n1 + k1];
                let src = &contracted_2[(k0 * n1 + k1) * region..(k0 * n1 + k1 + 1) * region];
                for (a, s) in acc.iter_mut().zip(src.iter()) {
                    *a += s * w;
                }
            }
        }
    });

    // [u0][u1][u2]
    let plane_len = region * region;
    let mut result = vec![Complex64::zero(); region * plane_len];
    result.par_chunks_mut(plane_len).enumerate().for_each(|(u0, out)| {
        for k0 in 0..n0 {
            let w = kernels[0][u0 * n0 + k0];
            let src = &contracted_1[k0 * plane_len..(k0 + 1) * plane_len];
            for (a, s) in out.iter_mut().zip(src.iter()) {
                *a += s * w;
            }
        }
    });

    result
}

/// Returns the position (in array order) of the first element of maximum magnitude.
fn argmax_norm(values: &[Complex64], shape: Shape) -> [usize; 3] {
    let mut max_idx = 0;
    let mut max_val = f64::NEG_INFINITY;
    for (i, v) in values.iter().enumerate() {
        let n = v.norm_sqr();
        if n > max_val {
            max_val = n;
            max_idx = i;
        }
    }

    [max_idx / (shape[1] * shape[2]), (max_idx / shape[2]) % shape[1], max_idx % shape[2]]
}

/// Tukey (tapered cosine) window of length `n`; the central `1 - taper` part of the axis equals 1.
///
/// To be used on volumes before feeding them to the phase correlation, so that the wrap-around
/// seams of non-periodic volumes do not contribute to the cross-power spectrum.
///
pub fn tukey_window(n: usize, taper: f64) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }

    (0..n).map(|i| {
        let x = i as f64 / (n - 1) as f64;
        let edge = x.min(1.0 - x);
        if edge < taper / 2.0 {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * edge / taper).cos())
        } else {
            1.0
        }
    }).collect()
}

/// Returns the peak position (array order, wrapped to signed values) of the correlation of the
/// apodized spectra, refined to 1/`UPSAMPLE_FACTOR` of a voxel in a 1.5-voxel neighborhood.
fn correlation_peak(fft_ref: &[Complex64], fft_tgt: &[Complex64], shape: Shape) -> [f64; 3] {
    let cps = fft::calc_cross_power_spectrum(fft_ref, fft_tgt);

    let mut cc = cps.clone();
    fft::fft_3d(shape, &mut cc, FftDirection::Inverse);

    let maxima = argmax_norm(&cc, shape);
    let mut shifts = [0.0f64; 3];
    for d in 0..3 {
        shifts[d] = if maxima[d] > shape[d] / 2 {
            maxima[d] as f64 - shape[d] as f64
        } else {
            maxima[d] as f64
        };
    }

    let upsample = UPSAMPLE_FACTOR as f64;
    let region = (upsample * 1.5).ceil() as usize;
    let dftshift = (region / 2) as f64;
    let offsets = [
        dftshift - shifts[0] * upsample,
        dftshift - shifts[1] * upsample,
        dftshift - shifts[2] * upsample
    ];

    let upsampled = upsampled_dft(&cps, shape, region, upsample, offsets);
    let fine_maxima = argmax_norm(&upsampled, [region, region, region]);
    for d in 0..3 {
        shifts[d] += (fine_maxima[d] as f64 - dftshift) / upsample;
        if shape[d] == 1 {
            shifts[d] = 0.0;
        }
    }

    shifts
}

/// Determines (using phase correlation) the vector by which `target` has to be translated to match `reference`.
///
/// The result is in array-axis order (`AxisOrder::Zxy`). If `target` is `reference` moved by `s`,
/// the result is `-s`. Both volumes have their mean removed and are multiplied by a Tukey window
/// (`TAPER_FRACTION`). After the first pass, `target` is moved by the current estimate and
/// correlated again; each of the `CORRELATION_PASSES` passes adds the residual it finds.
///
pub fn determine_translation(reference: &Volume, target: &Volume) -> Result<ShiftVector> {
    reference.check_same_shape(target, Some("phase correlation target"))?;
    let shape = reference.shape();

    let windows = [
        tukey_window(shape[0], TAPER_FRACTION),
        tukey_window(shape[1], TAPER_FRACTION),
        tukey_window(shape[2], TAPER_FRACTION)
    ];
    let fft_ref = fft::fft_apodized(reference, &windows);

    let mut shifts = correlation_peak(&fft_ref, &fft::fft_apodized(target, &windows), shape);
    log::debug!("initial phase correlation estimate {:?} (zxy)", shifts);

    for _ in 1..CORRELATION_PASSES {
        let estimate = ShiftVector::new(AxisOrder::Zxy, shifts)?;
        let aligned = warp::apply(target, &estimate, FillPolicy::Value(0.0));
        let residual = correlation_peak(&fft_ref, &fft::fft_apodized(&aligned, &windows), shape);
        for d in 0..3 {
            shifts[d] += residual[d];
        }
    }
    log::debug!("refined phase correlation estimate {:?} (zxy)", shifts);

    ShiftVector::new(AxisOrder::Zxy, shifts)
}
