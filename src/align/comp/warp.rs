//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Subvoxel translation with cubic B-spline interpolation.
//!
//! Based on:
//!
//!   B-Spline Signal Processing: Part II - Efficient Design and Applications
//!   Michael Unser, Akram Aldroubi, Murray Eden
//!

use crate::volume::{FillPolicy, Shape, ShiftVector, Volume};
use rayon::prelude::*;
use super::filter::mirror_index;
use super::process_lines;

/// Pole of the cubic B-spline prefilter.
const POLE: f64 = -0.2679491924311227; // √3 - 2

/// Interpolation taps of one output index along one axis.
#[derive(Copy, Clone, Debug)]
struct Taps {
    indices: [usize; 4],
    weights: [f64; 4],
    count: usize
}

fn initial_causal_coefficient(c: &[f64]) -> f64 {
    let n = c.len();
    let horizon = (f64::EPSILON.ln() / POLE.abs().ln()).ceil() as usize;

    if horizon < n {
        let mut zn = POLE;
        let mut sum = c[0];
        for value in &c[1..horizon] {
            sum += zn * value;
            zn *= POLE;
        }
        sum
    } else {
        // full loop, with the mirror-symmetric boundary folded in
        let mut zn = POLE;
        let iz = 1.0 / POLE;
        let mut z2n = POLE.powi(n as i32 - 1);
        let mut sum = c[0] + z2n * c[n - 1];
        z2n *= z2n * iz;
        for value in &c[1..n - 1] {
            sum += (zn + z2n) * value;
            zn *= POLE;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}

fn initial_anticausal_coefficient(c: &[f64]) -> f64 {
    let n = c.len();
    (POLE / (POLE * POLE - 1.0)) * (POLE * c[n - 2] + c[n - 1])
}

/// Converts samples of `line` into cubic B-spline coefficients in place (mirror boundary).
fn prefilter_line(line: &mut [f64]) {
    let n = line.len();
    if n == 1 { return; }

    let gain = (1.0 - POLE) * (1.0 - 1.0 / POLE);
    for value in line.iter_mut() {
        *value *= gain;
    }

    line[0] = initial_causal_coefficient(line);
    for k in 1..n {
        line[k] += POLE * line[k - 1];
    }

    line[n - 1] = initial_anticausal_coefficient(line);
    for k in (0..n - 1).rev() {
        line[k] = POLE * (line[k + 1] - line[k]);
    }
}

fn bspline_weights(t: f64) -> [f64; 4] {
    let s = 1.0 - t;
    [
        s * s * s / 6.0,
        2.0 / 3.0 - t * t + t * t * t / 2.0,
        2.0 / 3.0 - s * s + s * s * s / 2.0,
        t * t * t / 6.0
    ]
}

/// Returns the taps of every output index along an axis of length `n` moved by `shift`;
/// `None` marks indices whose source lies outside the axis.
fn axis_taps(n: usize, shift: f64) -> Vec<Option<Taps>> {
    let integral = shift.fract() == 0.0;

    (0..n).map(|i| {
        let c = i as f64 - shift;
        if c < 0.0 || c > (n - 1) as f64 {
            None
        } else if integral {
            Some(Taps{ indices: [c as usize, 0, 0, 0], weights: [1.0, 0.0, 0.0, 0.0], count: 1 })
        } else {
            let c0 = c.floor();
            let i0 = c0 as isize;
            Some(Taps{
                indices: [
                    mirror_index(i0 - 1, n),
                    mirror_index(i0, n),
                    mirror_index(i0 + 1, n),
                    mirror_index(i0 + 2, n)
                ],
                weights: bspline_weights(c - c0),
                count: 4
            })
        }
    }).collect()
}

/// Returns `volume` moved by `shift`: output(p) = input(p - shift), interpolated with a cubic B-spline.
///
/// Axes with an integral shift are not interpolated, so integral shifts move samples exactly.
/// Output samples whose source lies outside the volume are set to `fill`. NaN samples of `volume`
/// are holes: every output sample depending on one is NaN.
///
pub fn apply(volume: &Volume, shift: &ShiftVector, fill: FillPolicy) -> Volume {
    let shape: Shape = volume.shape();
    let s = shift.to_array_axes();
    let fill_value = fill.value();

    let nan_mask: Option<Vec<bool>> = if volume.samples().iter().any(|v| v.is_nan()) {
        Some(volume.samples().iter().map(|v| v.is_nan()).collect())
    } else {
        None
    };

    let mut coeffs: Vec<f64> = volume.samples().iter().map(|&v| if v.is_nan() { 0.0 } else { v as f64 }).collect();
    for axis in 0..3 {
        if s[axis].fract() != 0.0 {
            process_lines(&mut coeffs, shape, axis, prefilter_line);
        }
    }

    let taps: Vec<Vec<Option<Taps>>> = (0..3).map(|d| axis_taps(shape[d], s[d])).collect();
    let [_, n1, n2] = shape;

    let mut output = vec![fill_value; volume.len()];
    output.par_chunks_mut(n1 * n2).enumerate().for_each(|(z, plane)| {
        let tz = match taps[0][z] { Some(t) => t, None => return };

        for x in 0..n1 {
            let tx = match taps[1][x] { Some(t) => t, None => continue };

            for y in 0..n2 {
                let ty = match taps[2][y] { Some(t) => t, None => continue };

                let mut acc = 0.0;
                let mut hole = false;
                'taps: for a in 0..tz.count {
                    for b in 0..tx.count {
                        let w_zx = tz.weights[a] * tx.weights[b];
                        let row = (tz.indices[a] * n1 + tx.indices[b]) * n2;
                        for c in 0..ty.count {
                            let w = w_zx * ty.weights[c];
                            if w == 0.0 { continue; }
                            let idx = row + ty.indices[c];
                            if let Some(mask) = &nan_mask {
                                if mask[idx] { hole = true; break 'taps; }
                            }
                            acc += w * coeffs[idx];
                        }
                    }
                }

                plane[x * n2 + y] = if hole { f32::NAN } else { acc as f32 };
            }
        }
    });

    log::debug!("warped volume {:?} by {}", shape, shift);

    volume.with_same_shape(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::AxisOrder;

    fn blob(shape: Shape, sigma: f64) -> Volume {
        let c: Vec<f64> = shape.iter().map(|&n| (n as f64 - 1.0) / 2.0).collect();
        Volume::from_fn(shape, |z, x, y| {
            let r2 = (z as f64 - c[0]).powi(2) + (x as f64 - c[1]).powi(2) + (y as f64 - c[2]).powi(2);
            (1000.0 * (-r2 / (2.0 * sigma * sigma)).exp()) as f32
        })
    }

    #[test]
    fn prefilter_of_constant_is_constant() {
        let mut line = vec![5.0; 40];
        prefilter_line(&mut line);
        assert!(line.iter().all(|v| (v - 5.0).abs() < 1.0e-9), "{:?}", line);

        let mut short = vec![5.0; 4];
        prefilter_line(&mut short);
        assert!(short.iter().all(|v| (v - 5.0).abs() < 1.0e-9), "{:?}", short);
    }

    #[test]
    fn coefficients_reproduce_samples_at_knots() {
        let samples: Vec<f64> = (0..12).map(|i| ((i * i) % 7) as f64).collect();
        let mut coeffs = samples.clone();
        prefilter_line(&mut coeffs);
        let n = samples.len();
        for i in 0..n {
            let c = |k: isize| coeffs[mirror_index(k, n)];
            let value = (c(i as isize - 1) + 4.0 * c(i as isize) + c(i as isize + 1)) / 6.0;
            assert!((value - samples[i]).abs() < 1.0e-9, "{} vs {}", value, samples[i]);
        }
    }

    #[test]
    fn weights_sum_to_one() {
        for t in [0.0, 0.1, 0.5, 0.77, 0.999] {
            assert!((bspline_weights(t).iter().sum::<f64>() - 1.0).abs() < 1.0e-12);
        }
    }

    #[test]
    fn zero_shift_is_identity() {
        let v = blob([6, 7, 8], 1.5);
        let result = apply(&v, &ShiftVector::zero(AxisOrder::Xyz), FillPolicy::Nan);
        assert_eq!(v, result);
    }

    #[test]
    fn integral_shift_moves_samples_and_fills_border() {
        let v = Volume::from_fn([3, 4, 5], |z, x, y| (z * 20 + x * 5 + y) as f32 + 1.0);
        // x by +1 (xyz), i.e. array axis 1
        let result = apply(&v, &ShiftVector::xyz(1.0, 0.0, 0.0).unwrap(), FillPolicy::Value(-1.0));

        for z in 0..3 {
            for y in 0..5 {
                assert_eq!(-1.0, result.get(z, 0, y));
                for x in 1..4 {
                    assert_eq!(v.get(z, x - 1, y), result.get(z, x, y));
                }
            }
        }
    }

    #[test]
    fn half_voxel_shift_of_ramp_is_interpolated() {
        let v = Volume::from_fn([4, 4, 20], |_, _, y| y as f32);
        let result = apply(&v, &ShiftVector::zxy(0.0, 0.0, 0.5).unwrap(), FillPolicy::Value(0.0));

        assert_eq!(0.0, result.get(0, 0, 0));
        for y in 6..14 {
            assert!((result.get(2, 1, y) - (y as f32 - 0.5)).abs() < 1.0e-2, "{}", result.get(2, 1, y));
        }
    }

    #[test]
    fn shift_there_and_back_restores_interior() {
        let v = blob([16, 16, 16], 2.5);
        let s = ShiftVector::zxy(0.4, -1.3, 0.7).unwrap();

        let moved = apply(&v, &s, FillPolicy::Value(0.0));
        let restored = apply(&moved, &-s, FillPolicy::Value(0.0));

        let mut max_err = 0.0f32;
        for z in 3..13 {
            for x in 3..13 {
                for y in 3..13 {
                    max_err = max_err.max((restored.get(z, x, y) - v.get(z, x, y)).abs());
                }
            }
        }
        assert!(max_err < 10.0, "max error {}", max_err);
    }

    #[test]
    fn exposed_region_gets_nan_fill() {
        let v = blob([5, 5, 5], 1.0);
        let result = apply(&v, &ShiftVector::zxy(-1.5, 0.0, 0.0).unwrap(), FillPolicy::Nan);
        for x in 0..5 {
            for y in 0..5 {
                assert!(result.get(4, x, y).is_nan());
                assert!(result.get(3, x, y).is_nan());
                assert!(!result.get(2, x, y).is_nan());
            }
        }
    }

    #[test]
    fn nan_input_samples_propagate_to_dependent_outputs() {
        let mut samples = vec![1.0f32; 6 * 6 * 6];
        samples[(3 * 6 + 3) * 6 + 3] = f32::NAN;
        let v = Volume::new([6, 6, 6], samples).unwrap();

        let result = apply(&v, &ShiftVector::zxy(0.0, 0.0, 1.0).unwrap(), FillPolicy::Value(0.0));

        assert!(result.get(3, 3, 4).is_nan());
        assert_eq!(1.0, result.get(3, 3, 3));
        assert_eq!(1.0, result.get(3, 2, 4));
    }
}
