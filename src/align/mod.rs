//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Registration methods.
//!

use crate::error::{RegistestError, Result};
use crate::volume::{FillPolicy, ShiftVector, Volume};
use strum::IntoEnumIterator;

pub mod comp;

pub use comp::affine::RegularStepParams;

/// Moves `volume` by `shift`; see `comp::warp::apply`.
pub fn shift_volume(volume: &Volume, shift: &ShiftVector, fill: FillPolicy) -> Volume {
    comp::warp::apply(volume, shift, fill)
}

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, strum_macros::EnumIter)]
pub enum RegistrationMethod {
    PhaseCorrelation,
    AffineOptimization
}

impl From<RegistrationMethod> for &str {
    fn from(method: RegistrationMethod) -> &'static str {
        match method {
            RegistrationMethod::PhaseCorrelation   => "phase-correlation",
            RegistrationMethod::AffineOptimization => "affine-optimization"
        }
    }
}

impl std::str::FromStr for RegistrationMethod {
    type Err = RegistestError;

    fn from_str(s: &str) -> Result<RegistrationMethod> {
        for method in RegistrationMethod::iter() {
            if s == Into::<&str>::into(method) {
                return Ok(method);
            }
        }

        Err(RegistestError::UnsupportedMethod{ method: s.to_string(), supported: RegistrationMethod::names() })
    }
}

impl std::fmt::Display for RegistrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Into::<&str>::into(*self))
    }
}

impl RegistrationMethod {
    pub fn names() -> Vec<&'static str> {
        RegistrationMethod::iter().map(|m| m.into()).collect()
    }

    /// Returns the estimator of this method; `affine` configures `AffineOptimization`.
    pub fn estimator(&self, affine: &RegularStepParams) -> Box<dyn ShiftEstimator> {
        match self {
            RegistrationMethod::PhaseCorrelation => Box::new(PhaseCorrelation),
            RegistrationMethod::AffineOptimization => Box::new(AffineOptimization::new(*affine))
        }
    }
}

/// Estimates the translation registering a target volume onto a reference volume.
pub trait ShiftEstimator: Send + Sync {
    fn method(&self) -> RegistrationMethod;

    /// Returns the shift (array-axis order) which moves `target` onto `reference`.
    ///
    /// Fails with `ShapeMismatch` if the volumes differ in shape.
    ///
    fn estimate(&self, reference: &Volume, target: &Volume) -> Result<ShiftVector>;
}

/// Phase correlation refined by an upsampled DFT.
pub struct PhaseCorrelation;

impl ShiftEstimator for PhaseCorrelation {
    fn method(&self) -> RegistrationMethod { RegistrationMethod::PhaseCorrelation }

    fn estimate(&self, reference: &Volume, target: &Volume) -> Result<ShiftVector> {
        comp::determine_translation(reference, target)
    }
}

/// Translational part of an MSE-optimal affine transform.
pub struct AffineOptimization {
    params: RegularStepParams
}

impl AffineOptimization {
    pub fn new(params: RegularStepParams) -> AffineOptimization { AffineOptimization{ params } }
}

impl ShiftEstimator for AffineOptimization {
    fn method(&self) -> RegistrationMethod { RegistrationMethod::AffineOptimization }

    fn estimate(&self, reference: &Volume, target: &Volume) -> Result<ShiftVector> {
        comp::affine::determine_translation(reference, target, &self.params)
    }
}

/// Estimated shift together with the target already moved by it.
#[derive(Debug)]
pub struct Registration {
    pub method: RegistrationMethod,
    pub shift: ShiftVector,
    pub registered: Volume
}

/// Estimates the shift of `target` onto `reference` with `estimator` and applies it.
pub fn register(
    reference: &Volume,
    target: &Volume,
    estimator: &dyn ShiftEstimator,
    fill: FillPolicy
) -> Result<Registration> {
    let shift = estimator.estimate(reference, target)?;
    log::info!("{}: estimated shift {}", estimator.method(), shift);
    let registered = shift_volume(target, &shift, fill);

    Ok(Registration{ method: estimator.method(), shift, registered })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator;
    use crate::volume::{AxisOrder, Shape};

    fn blob(shape: Shape, sigma: f64) -> Volume {
        let c: Vec<f64> = shape.iter().map(|&n| (n as f64 - 1.0) / 2.0).collect();
        Volume::from_fn(shape, |z, x, y| {
            let r2 = (z as f64 - c[0]).powi(2) + (x as f64 - c[1]).powi(2) + (y as f64 - c[2]).powi(2);
            (1000.0 * (-r2 / (2.0 * sigma * sigma)).exp()) as f32
        })
    }

    #[test]
    fn method_names_round_trip() {
        for method in RegistrationMethod::iter() {
            assert_eq!(method, Into::<&str>::into(method).parse::<RegistrationMethod>().unwrap());
        }
    }

    #[test]
    fn unknown_method_lists_supported_ones() {
        match "elastix".parse::<RegistrationMethod>() {
            Err(RegistestError::UnsupportedMethod{ method, supported }) => {
                assert_eq!("elastix", method);
                assert_eq!(vec!["phase-correlation", "affine-optimization"], supported);
            },
            other => panic!("unexpected result: {:?}", other)
        }
    }

    #[test]
    fn integral_shift_is_undone_by_phase_correlation() {
        let reference = blob([12, 12, 12], 1.0);
        let target = shift_volume(&reference, &ShiftVector::xyz(2.0, 0.0, -1.0).unwrap(), FillPolicy::Value(0.0));

        let result = register(&reference, &target, &PhaseCorrelation, FillPolicy::Value(0.0)).unwrap();

        assert_eq!(RegistrationMethod::PhaseCorrelation, result.method);
        let xyz = result.shift.to_order(AxisOrder::Xyz).values();
        assert!((xyz[0] + 2.0).abs() < 0.05, "{:?}", xyz);
        assert!(xyz[1].abs() < 0.05, "{:?}", xyz);
        assert!((xyz[2] - 1.0).abs() < 0.05, "{:?}", xyz);

        for z in 3..9 {
            for x in 3..9 {
                for y in 3..9 {
                    assert!((result.registered.get(z, x, y) - reference.get(z, x, y)).abs() < 20.0);
                }
            }
        }
    }

    #[test]
    fn shifts_of_spots_clipped_at_the_borders_are_recovered() {
        let reference = generator::synthetic_spots([16, 32, 32], 10, 7);

        for shift in [ShiftVector::xyz(1.0, 0.0, 0.0).unwrap(), ShiftVector::xyz(1.25, 0.5, -0.75).unwrap()] {
            let target = shift_volume(&reference, &shift, FillPolicy::Value(0.0));

            let estimate = PhaseCorrelation.estimate(&reference, &target).unwrap().to_order(AxisOrder::Xyz).values();

            let expected = (-shift).values();
            for d in 0..3 {
                assert!((estimate[d] - expected[d]).abs() < 0.05, "{}: {:?}", shift, estimate);
            }
        }
    }

    #[test]
    fn shape_mismatch_is_reported_by_every_estimator() {
        let a = blob([8, 8, 8], 1.5);
        let b = blob([8, 9, 8], 1.5);
        for method in RegistrationMethod::iter() {
            assert!(matches!(
                register(&a, &b, method.estimator(&RegularStepParams::default()).as_ref(), FillPolicy::Nan),
                Err(RegistestError::ShapeMismatch{ .. })
            ));
        }
    }
}
