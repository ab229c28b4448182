//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Shift vectors tagged with their axis order, and the fill policy of exposed regions.
//!

use cgmath::{InnerSpace, Vector3};
use crate::error::{RegistestError, Result};
use serde::{Deserialize, Serialize};

/// Order of the components of a `ShiftVector`.
///
/// Volumes are stored as (Z, X, Y); `Zxy` is therefore the native order of the warp and the estimators,
/// while configuration files and the metadata ledger use `Xyz`.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum_macros::EnumIter)]
pub enum AxisOrder {
    Xyz,
    Zxy
}

impl From<AxisOrder> for &str {
    fn from(order: AxisOrder) -> &'static str {
        match order {
            AxisOrder::Xyz => "xyz",
            AxisOrder::Zxy => "zxy"
        }
    }
}

/// Translation by 3 finite components; never passed around without its `AxisOrder`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ShiftRepr", into = "ShiftRepr")]
pub struct ShiftVector {
    order: AxisOrder,
    values: Vector3<f64>
}

/// On-disk form: `{"xyz": [x, y, z]}` or `{"zxy": [z, x, y]}`.
#[derive(Serialize, Deserialize)]
enum ShiftRepr {
    #[serde(rename = "xyz")]
    Xyz([f64; 3]),
    #[serde(rename = "zxy")]
    Zxy([f64; 3])
}

impl TryFrom<ShiftRepr> for ShiftVector {
    type Error = RegistestError;

    fn try_from(repr: ShiftRepr) -> Result<ShiftVector> {
        match repr {
            ShiftRepr::Xyz(v) => ShiftVector::new(AxisOrder::Xyz, v),
            ShiftRepr::Zxy(v) => ShiftVector::new(AxisOrder::Zxy, v)
        }
    }
}

impl From<ShiftVector> for ShiftRepr {
    fn from(shift: ShiftVector) -> ShiftRepr {
        match shift.order {
            AxisOrder::Xyz => ShiftRepr::Xyz(shift.values()),
            AxisOrder::Zxy => ShiftRepr::Zxy(shift.values())
        }
    }
}

impl ShiftVector {
    pub fn new(order: AxisOrder, values: [f64; 3]) -> Result<ShiftVector> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(RegistestError::InvalidArgument(
                format!("shift components must be finite, got {:?} ({})", values, Into::<&str>::into(order))
            ));
        }

        Ok(ShiftVector{ order, values: Vector3::from(values) })
    }

    /// Creates a shift from a slice which must have exactly 3 elements.
    pub fn from_slice(order: AxisOrder, values: &[f64]) -> Result<ShiftVector> {
        if values.len() != 3 {
            return Err(RegistestError::InvalidArgument(
                format!("shift must have exactly 3 components ({}), got {}", Into::<&str>::into(order), values.len())
            ));
        }
        ShiftVector::new(order, [values[0], values[1], values[2]])
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Result<ShiftVector> { ShiftVector::new(AxisOrder::Xyz, [x, y, z]) }

    pub fn zxy(z: f64, x: f64, y: f64) -> Result<ShiftVector> { ShiftVector::new(AxisOrder::Zxy, [z, x, y]) }

    pub fn zero(order: AxisOrder) -> ShiftVector { ShiftVector{ order, values: Vector3::new(0.0, 0.0, 0.0) } }

    pub fn order(&self) -> AxisOrder { self.order }

    /// Components in `self.order()`.
    pub fn values(&self) -> [f64; 3] { self.values.into() }

    /// Returns the same translation expressed in `order`.
    #[must_use]
    pub fn to_order(&self, order: AxisOrder) -> ShiftVector {
        let v = self.values;
        let values = match (self.order, order) {
            (AxisOrder::Xyz, AxisOrder::Zxy) => Vector3::new(v.z, v.x, v.y),
            (AxisOrder::Zxy, AxisOrder::Xyz) => Vector3::new(v.y, v.z, v.x),
            _ => v
        };

        ShiftVector{ order, values }
    }

    /// Components in array-axis order (Z, X, Y).
    pub fn to_array_axes(&self) -> [f64; 3] { self.to_order(AxisOrder::Zxy).values() }

    /// Euclidean distance between two shifts, regardless of their orders.
    pub fn distance(&self, other: &ShiftVector) -> f64 {
        (self.to_order(AxisOrder::Xyz).values - other.to_order(AxisOrder::Xyz).values).magnitude()
    }
}

impl std::ops::Neg for ShiftVector {
    type Output = ShiftVector;

    fn neg(self) -> ShiftVector { ShiftVector{ order: self.order, values: -self.values } }
}

impl std::fmt::Display for ShiftVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = self.values();
        write!(f, "{}=[{:.3}, {:.3}, {:.3}]", Into::<&str>::into(self.order), v[0], v[1], v[2])
    }
}

/// Value written into regions exposed by a shift.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FillPolicy {
    Value(f64),
    Nan
}

impl Default for FillPolicy {
    fn default() -> FillPolicy { FillPolicy::Value(0.0) }
}

impl FillPolicy {
    pub fn value(&self) -> f32 {
        match self {
            FillPolicy::Value(v) => *v as f32,
            FillPolicy::Nan => f32::NAN
        }
    }
}

impl std::str::FromStr for FillPolicy {
    type Err = RegistestError;

    fn from_str(s: &str) -> Result<FillPolicy> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("nan") {
            return Ok(FillPolicy::Nan);
        }
        match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(FillPolicy::Value(v)),
            _ => Err(RegistestError::InvalidArgument(
                format!("filling value must be a finite number or \"nan\", got \"{}\"", s)
            ))
        }
    }
}

impl std::fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FillPolicy::Value(v) => write!(f, "{:?}", v),
            FillPolicy::Nan => write!(f, "nan")
        }
    }
}

impl Serialize for FillPolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FillPolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<FillPolicy, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(f64)
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse::<FillPolicy>().map_err(serde::de::Error::custom),
            Repr::Number(v) => v.to_string().parse::<FillPolicy>().map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xyz_to_zxy_permutes_components() {
        let s = ShiftVector::xyz(1.0, 2.0, 3.0).unwrap();
        assert_eq!([3.0, 1.0, 2.0], s.to_order(AxisOrder::Zxy).values());
        assert_eq!(AxisOrder::Zxy, s.to_order(AxisOrder::Zxy).order());
    }

    #[test]
    fn conversion_there_and_back_is_identity() {
        let s = ShiftVector::zxy(-0.5, 1.25, 7.0).unwrap();
        assert_eq!(s, s.to_order(AxisOrder::Xyz).to_order(AxisOrder::Zxy));
        assert_eq!(0.0, s.distance(&s.to_order(AxisOrder::Xyz)));
    }

    #[test]
    fn non_finite_components_are_rejected() {
        assert!(ShiftVector::xyz(f64::NAN, 0.0, 0.0).is_err());
        assert!(ShiftVector::zxy(0.0, f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn slice_must_have_three_components() {
        assert!(ShiftVector::from_slice(AxisOrder::Xyz, &[1.0, 2.0]).is_err());
        assert!(ShiftVector::from_slice(AxisOrder::Xyz, &[1.0, 2.0, 3.0, 4.0]).is_err());
        assert!(ShiftVector::from_slice(AxisOrder::Xyz, &[1.0, 2.0, 3.0]).is_ok());
    }

    #[test]
    fn serializes_with_order_tag() {
        let s = ShiftVector::xyz(1.0, 0.0, -2.5).unwrap();
        assert_eq!(r#"{"xyz":[1.0,0.0,-2.5]}"#, serde_json::to_string(&s).unwrap());

        let parsed: ShiftVector = serde_json::from_str(r#"{"zxy": [1, 2, 3]}"#).unwrap();
        assert_eq!(AxisOrder::Zxy, parsed.order());
        assert_eq!([1.0, 2.0, 3.0], parsed.values());
    }

    #[test]
    fn negation_keeps_order() {
        let s = -ShiftVector::zxy(1.0, -2.0, 0.5).unwrap();
        assert_eq!(AxisOrder::Zxy, s.order());
        assert_eq!([-1.0, 2.0, -0.5], s.values());
    }

    #[test]
    fn fill_policy_parses_numbers_and_nan() {
        assert_eq!(FillPolicy::Value(0.0), "0.0".parse().unwrap());
        assert_eq!(FillPolicy::Value(-3.5), " -3.5 ".parse().unwrap());
        assert_eq!(FillPolicy::Nan, "NaN".parse().unwrap());
        assert!("inf".parse::<FillPolicy>().is_err());
        assert!("zero".parse::<FillPolicy>().is_err());
        assert!(FillPolicy::Nan.value().is_nan());
    }

    #[test]
    fn fill_policy_deserializes_from_string_or_number() {
        let from_str: FillPolicy = serde_json::from_str(r#""nan""#).unwrap();
        let from_num: FillPolicy = serde_json::from_str("2.5").unwrap();
        assert_eq!(FillPolicy::Nan, from_str);
        assert_eq!(FillPolicy::Value(2.5), from_num);
        assert_eq!(r#""0.0""#, serde_json::to_string(&FillPolicy::Value(0.0)).unwrap());
    }
}
