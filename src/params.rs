//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Run parameters (`parameters.json`).
//!
//! Two layouts are accepted for each section:
//!
//!   "transform": { "method": "scipy", "shifts": [[x, y, z], ...], "filling_value": "0.0" }
//!   "transform": [ { "xyz": [x, y, z] }, ... ]
//!
//!   "register": { "method": ["phase-correlation", ...] }
//!   "register": [ { "method": "phase-correlation" }, ... ]
//!
//! The optional "affine_optimization" section overrides fields of `RegularStepParams`.
//!

use crate::align::{RegistrationMethod, RegularStepParams};
use crate::error::{RegistestError, Result};
use crate::volume::{AxisOrder, FillPolicy, ShiftVector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TEMPLATE_FILE_NAME: &str = "parameters_template.json";

/// Interpolation used to produce the targets.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WarpMethod {
    /// Cubic B-spline; the configuration name follows the SciPy `ndimage.shift` it reproduces.
    CubicSpline
}

impl From<WarpMethod> for &str {
    fn from(method: WarpMethod) -> &'static str {
        match method {
            WarpMethod::CubicSpline => "scipy"
        }
    }
}

impl std::str::FromStr for WarpMethod {
    type Err = RegistestError;

    fn from_str(s: &str) -> Result<WarpMethod> {
        match s {
            "scipy" | "cubic" => Ok(WarpMethod::CubicSpline),
            _ => Err(RegistestError::UnsupportedMethod{ method: s.to_string(), supported: vec!["scipy", "cubic"] })
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransformParams {
    pub method: WarpMethod,
    /// Ground-truth shifts (xyz).
    pub shifts: Vec<ShiftVector>,
    pub fill: FillPolicy
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegisterParams {
    /// Distinct methods in configuration order.
    pub methods: Vec<RegistrationMethod>
}

#[derive(Clone, Debug)]
pub struct Parameters {
    path: PathBuf,
    transform: TransformParams,
    register: RegisterParams,
    affine: RegularStepParams
}

fn default_warp_method() -> String { Into::<&str>::into(WarpMethod::CubicSpline).to_string() }

#[derive(Deserialize)]
struct RawParameters {
    #[serde(alias = "prepare")]
    transform: Option<RawTransform>,
    register: Option<RawRegister>,
    #[serde(default)]
    affine_optimization: RegularStepParams
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTransform {
    Section {
        #[serde(default = "default_warp_method")]
        method: String,
        shifts: Vec<Vec<f64>>,
        #[serde(default)]
        filling_value: FillPolicy
    },
    Entries(Vec<RawShiftEntry>)
}

#[derive(Deserialize)]
struct RawShiftEntry {
    xyz: Vec<f64>
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRegister {
    Section { method: Vec<String> },
    Entries(Vec<RawMethodEntry>)
}

#[derive(Deserialize)]
struct RawMethodEntry {
    method: String
}

#[derive(Serialize)]
struct TemplateTransform {
    method: &'static str,
    shifts: Vec<[f64; 3]>,
    filling_value: FillPolicy
}

#[derive(Serialize)]
struct TemplateRegister {
    method: Vec<&'static str>
}

#[derive(Serialize)]
struct Template {
    transform: TemplateTransform,
    register: TemplateRegister
}

impl Parameters {
    /// Loads and validates the parameters file.
    ///
    /// If the file does not exist, a template is written next to it (when its directory exists)
    /// and the returned error names the template.
    ///
    pub fn load(path: &Path) -> Result<Parameters> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistestError::ConfigNotFound{
                    path: path.to_path_buf(),
                    template: write_template_next_to(path)
                });
            },
            Err(e) => return Err(RegistestError::storage(path, e))
        };

        Parameters::parse(path, &text)
    }

    /// Parses the document `text`; `path` is used in error messages.
    pub fn parse(path: &Path, text: &str) -> Result<Parameters> {
        let invalid = |reason: String| RegistestError::ConfigInvalid{ path: path.to_path_buf(), reason };

        let raw: RawParameters = serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;

        let (method, raw_shifts, fill) = match raw.transform {
            Some(RawTransform::Section{ method, shifts, filling_value }) => (method, shifts, filling_value),
            Some(RawTransform::Entries(entries)) =>
                (default_warp_method(), entries.into_iter().map(|e| e.xyz).collect(), FillPolicy::default()),
            None => return Err(invalid("missing section \"transform\"".to_string()))
        };
        let method = method.parse::<WarpMethod>()?;

        let mut shifts = vec![];
        for (i, values) in raw_shifts.iter().enumerate() {
            let shift = ShiftVector::from_slice(AxisOrder::Xyz, values)
                .map_err(|e| invalid(format!("shift #{}: {}", i, e)))?;
            shifts.push(shift);
        }

        let method_names: Vec<String> = match raw.register {
            Some(RawRegister::Section{ method }) => method,
            Some(RawRegister::Entries(entries)) => entries.into_iter().map(|e| e.method).collect(),
            None => return Err(invalid("missing section \"register\"".to_string()))
        };
        let mut methods = vec![];
        for name in &method_names {
            let method = name.parse::<RegistrationMethod>()?;
            if !methods.contains(&method) {
                methods.push(method);
            }
        }

        let affine = raw.affine_optimization;
        if !(affine.min_step > 0.0 && affine.max_step >= affine.min_step) {
            return Err(invalid(format!(
                "affine_optimization: expected 0 < min_step <= max_step, got {} and {}", affine.min_step, affine.max_step
            )));
        }
        if !(affine.relaxation > 0.0 && affine.relaxation < 1.0) {
            return Err(invalid(format!("affine_optimization: relaxation must lie in (0, 1), got {}", affine.relaxation)));
        }

        if shifts.is_empty() { log::warn!("{}: no shifts configured", path.display()); }
        if methods.is_empty() { log::warn!("{}: no registration methods configured", path.display()); }

        Ok(Parameters{
            path: path.to_path_buf(),
            transform: TransformParams{ method, shifts, fill },
            register: RegisterParams{ methods },
            affine
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn transform(&self) -> &TransformParams { &self.transform }

    pub fn register(&self) -> &RegisterParams { &self.register }

    pub fn affine(&self) -> &RegularStepParams { &self.affine }
}

/// Returns the template document.
pub fn template() -> String {
    let template = Template{
        transform: TemplateTransform{
            method: WarpMethod::CubicSpline.into(),
            shifts: vec![[1.0, 0.0, 0.0], [0.5, -0.25, 1.5]],
            filling_value: FillPolicy::Value(0.0)
        },
        register: TemplateRegister{ method: RegistrationMethod::names() }
    };

    let mut text = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut text, formatter);
    match template.serialize(&mut serializer) {
        Ok(()) => String::from_utf8_lossy(&text).into_owned() + "\n",
        Err(_) => String::new()
    }
}

/// Writes the template next to the missing parameters file; returns its path on success.
fn write_template_next_to(path: &Path) -> Option<PathBuf> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new(".")
    };
    if !dir.is_dir() {
        return None;
    }

    let template_path = dir.join(TEMPLATE_FILE_NAME);
    match std::fs::write(&template_path, template()) {
        Ok(()) => Some(template_path),
        Err(e) => {
            log::warn!("cannot write '{}': {}", template_path.display(), e);
            None
        }
    }
}
