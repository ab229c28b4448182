//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Affine registration by regular-step gradient descent on the mean squared error.
//!
//! The target is sampled at `p = c + h∘(A·u) + t`, where `u = (i - c)/h` are grid coordinates
//! normalized to [-1, 1]. The matrix is optimized as `B = h∘(A - I)`, so that every one of the
//! 12 parameters is measured in voxels (`B` by its displacement of the grid corners).
//!

use crate::error::Result;
use crate::volume::{AxisOrder, Shape, ShiftVector, Volume};
use rayon::prelude::*;
use serde::Deserialize;

const NUM_PARAMS: usize = 12;

/// Index of the first translation parameter; the preceding 9 are `B` (row-major).
const T0: usize = 9;

#[derive(Copy, Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegularStepParams {
    /// Initial step length (voxels).
    pub max_step: f64,
    /// Optimization stops when the step length falls below this.
    pub min_step: f64,
    /// Step length multiplier applied whenever the gradient direction reverses.
    pub relaxation: f64,
    pub max_iterations: usize,
    pub gradient_tolerance: f64
}

impl Default for RegularStepParams {
    fn default() -> RegularStepParams {
        RegularStepParams{
            max_step: 1.0,
            min_step: 1.0e-4,
            relaxation: 0.5,
            max_iterations: 300,
            gradient_tolerance: 1.0e-8
        }
    }
}

/// Loss and gradient accumulated over a subset of voxels.
#[derive(Copy, Clone)]
struct Sums {
    loss: f64,
    grad: [f64; NUM_PARAMS],
    count: usize
}

impl Sums {
    fn zero() -> Sums { Sums{ loss: 0.0, grad: [0.0; NUM_PARAMS], count: 0 } }

    fn add(mut self, other: Sums) -> Sums {
        self.loss += other.loss;
        for (g, o) in self.grad.iter_mut().zip(other.grad.iter()) {
            *g += o;
        }
        self.count += other.count;
        self
    }
}

/// Trilinear interpolation of `volume` at `p`; returns the value and its gradient.
///
/// `p` must lie within [0, n-1] along every axis.
///
fn sample_trilinear(volume: &[f32], shape: Shape, p: [f64; 3]) -> (f64, [f64; 3]) {
    let mut i0 = [0usize; 3];
    let mut i1 = [0usize; 3];
    let mut f = [0.0f64; 3];
    for d in 0..3 {
        if shape[d] == 1 {
            continue;
        }
        let base = (p[d].floor() as usize).min(shape[d] - 2);
        i0[d] = base;
        i1[d] = base + 1;
        f[d] = p[d] - base as f64;
    }

    let at = |z: usize, x: usize, y: usize| volume[(z * shape[1] + x) * shape[2] + y] as f64;

    let c000 = at(i0[0], i0[1], i0[2]);
    let c001 = at(i0[0], i0[1], i1[2]);
    let c010 = at(i0[0], i1[1], i0[2]);
    let c011 = at(i0[0], i1[1], i1[2]);
    let c100 = at(i1[0], i0[1], i0[2]);
    let c101 = at(i1[0], i0[1], i1[2]);
    let c110 = at(i1[0], i1[1], i0[2]);
    let c111 = at(i1[0], i1[1], i1[2]);

    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

    let c00 = lerp(c000, c001, f[2]);
    let c01 = lerp(c010, c011, f[2]);
    let c10 = lerp(c100, c101, f[2]);
    let c11 = lerp(c110, c111, f[2]);
    let c0 = lerp(c00, c01, f[1]);
    let c1 = lerp(c10, c11, f[1]);
    let value = lerp(c0, c1, f[0]);

    let mut grad = [c1 - c0, 0.0, 0.0];
    grad[1] = lerp(c01 - c00, c11 - c10, f[0]);
    grad[2] = lerp(
        lerp(c001 - c000, c011 - c010, f[1]),
        lerp(c101 - c100, c111 - c110, f[1]),
        f[0]
    );
    for d in 0..3 {
        if shape[d] == 1 { grad[d] = 0.0; }
    }

    (value, grad)
}

/// Returns the mean squared error between `reference` and `target` sampled with `params`, and its gradient.
fn evaluate(reference: &[f32], target: &[f32], shape: Shape, params: &[f64; NUM_PARAMS]) -> Option<(f64, [f64; NUM_PARAMS])> {
    let center: Vec<f64> = shape.iter().map(|&n| (n as f64 - 1.0) / 2.0).collect();
    let half: Vec<f64> = center.iter().map(|&c| c.max(1.0)).collect();
    let upper: Vec<f64> = shape.iter().map(|&n| (n - 1) as f64).collect();

    let plane_sums: Vec<Sums> = (0..shape[0]).into_par_iter().map(|z| {
        let mut sums = Sums::zero();
        for x in 0..shape[1] {
            for y in 0..shape[2] {
                let i = [z as f64, x as f64, y as f64];
                let u = [(i[0] - center[0]) / half[0], (i[1] - center[1]) / half[1], (i[2] - center[2]) / half[2]];

                let mut p = [0.0; 3];
                for d in 0..3 {
                    p[d] = i[d] + params[T0 + d]
                        + params[3 * d] * u[0] + params[3 * d + 1] * u[1] + params[3 * d + 2] * u[2];
                }
                if (0..3).any(|d| p[d] < 0.0 || p[d] > upper[d]) {
                    continue;
                }

                let (value, grad) = sample_trilinear(target, shape, p);
                let residual = value - reference[(z * shape[1] + x) * shape[2] + y] as f64;

                sums.loss += residual * residual;
                for d in 0..3 {
                    let g = 2.0 * residual * grad[d];
                    sums.grad[T0 + d] += g;
                    for e in 0..3 {
                        sums.grad[3 * d + e] += g * u[e];
                    }
                }
                sums.count += 1;
            }
        }
        sums
    }).collect();
    // plane order
    let sums = plane_sums.into_iter().fold(Sums::zero(), Sums::add);

    if sums.count == 0 {
        return None;
    }

    let n = sums.count as f64;
    let mut grad = sums.grad;
    for g in grad.iter_mut() {
        *g /= n;
    }

    Some((sums.loss / n, grad))
}

/// Determines the vector by which `target` has to be translated to match `reference`,
/// as the translational part of the affine transform minimizing the mean squared error.
///
/// Both volumes are min-max normalized first. The result is in array-axis order (`AxisOrder::Zxy`)
/// and follows the convention of `super::determine_translation`.
///
pub fn determine_translation(reference: &Volume, target: &Volume, params: &RegularStepParams) -> Result<ShiftVector> {
    reference.check_same_shape(target, Some("affine optimization target"))?;
    let shape = reference.shape();
    let reference = reference.normalized();
    let target = target.normalized();

    let mut theta = [0.0f64; NUM_PARAMS];
    let mut step = params.max_step;
    let mut prev_grad: Option<[f64; NUM_PARAMS]> = None;
    let mut iterations = 0;
    let mut loss = f64::NAN;

    while iterations < params.max_iterations {
        let (current_loss, grad) = match evaluate(reference.samples(), target.samples(), shape, &theta) {
            Some(result) => result,
            None => {
                log::warn!("affine optimization left the volume after {} iterations", iterations);
                break;
            }
        };
        loss = current_loss;

        let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
        if grad_norm < params.gradient_tolerance {
            break;
        }

        if let Some(prev) = prev_grad {
            let dot: f64 = prev.iter().zip(grad.iter()).map(|(a, b)| a * b).sum();
            if dot < 0.0 {
                step *= params.relaxation;
            }
        }
        if step < params.min_step {
            break;
        }

        for (t, g) in theta.iter_mut().zip(grad.iter()) {
            *t -= step * g / grad_norm;
        }
        prev_grad = Some(grad);
        iterations += 1;
    }

    log::debug!(
        "affine optimization: {} iterations, final step {:.2e}, MSE {:.3e}, translation {:?}",
        iterations, step, loss, &theta[T0..]
    );

    ShiftVector::new(AxisOrder::Zxy, [-theta[T0], -theta[T0 + 1], -theta[T0 + 2]])
}
