//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Transform, register and compare stages.
//!
//! Stages always run in this order. Every stage reads the artifacts written by the previous one
//! for the same reference, as listed by the ledger of the previous stage's folder.
//!

use crate::align::{self, ShiftEstimator};
use crate::compare::{self, SimilarityReport};
use crate::error::{RegistestError, Result};
use crate::ledger::{MetadataLedger, MetadataRecord, RegistrationStep, ShiftStep, SimilarityScores};
use crate::output::{Folder, OutputTree};
use crate::params::Parameters;
use crate::render::{MaxProjectionOverlay, OverlayRenderer};
use crate::utils;
use crate::volume::{self, AxisOrder, ReferenceImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::IntoEnumIterator;

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, strum_macros::EnumIter)]
pub enum Stage {
    Transform,
    Register,
    Compare
}

impl From<Stage> for &str {
    fn from(stage: Stage) -> &'static str {
        match stage {
            Stage::Transform => "transform",
            Stage::Register  => "register",
            Stage::Compare   => "compare"
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = RegistestError;

    fn from_str(s: &str) -> Result<Stage> {
        if s == "prepare" {
            return Ok(Stage::Transform);
        }
        for stage in Stage::iter() {
            if s == Into::<&str>::into(stage) {
                return Ok(stage);
            }
        }

        Err(RegistestError::InvalidCommand{ command: s.to_string(), supported: Stage::names() })
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Into::<&str>::into(*self))
    }
}

impl Stage {
    pub fn names() -> Vec<&'static str> {
        Stage::iter().map(|s| s.into()).collect()
    }
}

/// Parses a comma-separated stage list; the result is in execution order, without repetitions.
pub fn parse_stages(list: &str) -> Result<Vec<Stage>> {
    let mut stages = vec![];
    for item in list.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        stages.push(item.parse::<Stage>()?);
    }
    if stages.is_empty() {
        return Err(RegistestError::InvalidCommand{ command: list.to_string(), supported: Stage::names() });
    }
    stages.sort();
    stages.dedup();

    Ok(stages)
}

/// Cancellation flag checked before each target.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken { CancelToken::default() }

    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

#[derive(Clone, Debug)]
pub struct TargetFailure {
    pub stage: Stage,
    pub target: PathBuf,
    pub message: String
}

#[derive(Debug, Default)]
pub struct RunSummary {
    /// Executed stages, in order.
    pub stages: Vec<Stage>,
    produced: Vec<(Stage, usize)>,
    pub failures: Vec<TargetFailure>
}

impl RunSummary {
    /// Number of artifacts written by `stage`.
    pub fn produced(&self, stage: Stage) -> usize {
        self.produced.iter().find(|(s, _)| *s == stage).map(|(_, n)| *n).unwrap_or(0)
    }

    pub fn succeeded(&self) -> bool { self.failures.is_empty() }

    fn start(&mut self, stage: Stage) {
        self.stages.push(stage);
        self.produced.push((stage, 0));
    }

    fn count(&mut self, stage: Stage) {
        if let Some((_, n)) = self.produced.iter_mut().find(|(s, _)| *s == stage) {
            *n += 1;
        }
    }

    fn fail(&mut self, stage: Stage, target: &Path, error: &RegistestError) {
        log::error!("{}: '{}' failed: {}", stage, target.display(), error);
        self.failures.push(TargetFailure{ stage, target: target.to_path_buf(), message: error.to_string() });
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (stage, n) in &self.produced {
            write!(f, "{}: {} artifact(s); ", stage, n)?;
        }
        write!(f, "{} failure(s)", self.failures.len())
    }
}

/// Returns the reference volumes to use: those named by `source` if given, otherwise the images
/// in the reference folder, otherwise those in the output root.
pub fn discover_references(tree: &OutputTree, source: Option<&Path>) -> Result<Vec<PathBuf>> {
    let paths = match source {
        Some(source) => utils::expand_reference_source(source)?,
        None => {
            let reference_dir = tree.path(Folder::Reference);
            let in_folder = if reference_dir.is_dir() { utils::list_image_files(&reference_dir)? } else { vec![] };
            if !in_folder.is_empty() { in_folder } else { utils::list_image_files(tree.root())? }
        }
    };

    if paths.is_empty() {
        return Err(RegistestError::InvalidArgument("no reference volumes found".to_string()));
    }

    Ok(paths)
}

pub struct Pipeline {
    tree: OutputTree,
    references: Vec<ReferenceImage>,
    params: Parameters,
    renderer: Box<dyn OverlayRenderer>,
    cancel: CancelToken
}

impl Pipeline {
    pub fn new(tree: OutputTree, references: Vec<ReferenceImage>, params: Parameters) -> Pipeline {
        Pipeline{ tree, references, params, renderer: Box::new(MaxProjectionOverlay), cancel: CancelToken::new() }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn OverlayRenderer>) -> Pipeline {
        self.renderer = renderer;
        self
    }

    pub fn cancel_token(&self) -> CancelToken { self.cancel.clone() }

    pub fn tree(&self) -> &OutputTree { &self.tree }

    /// Runs `stages` (in execution order regardless of their order in `stages`).
    ///
    /// Failures of single targets are logged and recorded in the summary; processing continues
    /// with the next target. Fails if the output tree cannot be prepared or the run is cancelled.
    ///
    pub fn run(&self, stages: &[Stage]) -> Result<RunSummary> {
        let mut stages = stages.to_vec();
        stages.sort();
        stages.dedup();

        self.tree.ensure_created()?;
        for reference in &self.references {
            self.tree.link_reference(reference.path())?;
        }

        let mut summary = RunSummary::default();
        for stage in stages {
            log::info!("stage '{}': {} reference(s)", stage, self.references.len());
            summary.start(stage);
            match stage {
                Stage::Transform => self.transform(&mut summary)?,
                Stage::Register => self.register(&mut summary)?,
                Stage::Compare => self.compare(&mut summary)?
            }
        }

        Ok(summary)
    }

    /// Runs `f` for one target unless the run has been cancelled; a failure of `f` is recorded.
    fn process_target<F>(&self, stage: Stage, target: &Path, summary: &mut RunSummary, f: F) -> Result<()>
    where F: FnOnce() -> Result<()>
    {
        if self.cancel.is_cancelled() {
            log::warn!("cancelled before '{}'", target.display());
            return Err(RegistestError::Cancelled(target.display().to_string()));
        }

        match f() {
            Ok(()) => summary.count(stage),
            Err(e) => summary.fail(stage, target, &e)
        }

        Ok(())
    }

    fn transform(&self, summary: &mut RunSummary) -> Result<()> {
        let dir = self.tree.path(Folder::ToRegister);
        let transform = self.params.transform();

        for reference in &self.references {
            for (i, shift) in transform.shifts.iter().enumerate() {
                let name = format!("{}_target_{}.tif", reference.basename(), i);
                let path = dir.join(&name);

                self.process_target(Stage::Transform, &path, summary, || {
                    let mut ledger = MetadataLedger::load(&dir)?;
                    ledger.check_vacant(&name)?;

                    let target = align::shift_volume(reference.volume(), shift, transform.fill);
                    volume::tiff::save_volume(&target, &path)?;

                    let mut record = MetadataRecord::new(reference.path());
                    record.transformation = ShiftStep::applied(*shift);
                    record.shift = ShiftStep::applied(*shift);
                    ledger.insert(&name, record)?;

                    log::info!("saved '{}' ({})", path.display(), shift);
                    Ok(())
                })?;
            }
        }

        Ok(())
    }

    fn register(&self, summary: &mut RunSummary) -> Result<()> {
        let source_dir = self.tree.path(Folder::ToRegister);
        let dir = self.tree.path(Folder::Shifted);
        let fill = self.params.transform().fill;
        let estimators: Vec<Box<dyn ShiftEstimator>> =
            self.params.register().methods.iter().map(|m| m.estimator(self.params.affine())).collect();

        for reference in &self.references {
            let (targets, sources) = match artifacts_with_ledger(&source_dir, reference.path()) {
                Ok(found) => found,
                Err(e) => { summary.fail(Stage::Register, &source_dir, &e); continue; }
            };
            log::info!("'{}': {} target(s) to register", reference.basename(), targets.len());

            for target_path in &targets {
                for estimator in &estimators {
                    self.process_target(Stage::Register, target_path, summary, || {
                        let stem = artifact_stem(target_path)?;
                        let name = format!("{}_{}.tif", stem, estimator.method());
                        let path = dir.join(&name);

                        let mut ledger = MetadataLedger::load(&dir)?;
                        ledger.check_vacant(&name)?;

                        let target = volume::tiff::load_volume(target_path)?;
                        let registration = align::register(reference.volume(), &target, estimator.as_ref(), fill)?;
                        volume::tiff::save_volume(&registration.registered, &path)?;

                        let mut record = MetadataRecord::new(reference.path());
                        if let Some(source) = source_record(&sources, target_path) {
                            record.transformation = source.transformation.clone();
                        }
                        record.registration = RegistrationStep::applied(Into::<&str>::into(registration.method));
                        record.shift = ShiftStep::applied(registration.shift.to_order(AxisOrder::Xyz));
                        ledger.insert(&name, record)?;

                        log::info!("saved '{}'", path.display());
                        Ok(())
                    })?;
                }
            }
        }

        Ok(())
    }

    fn compare(&self, summary: &mut RunSummary) -> Result<()> {
        let source_dir = self.tree.path(Folder::Shifted);
        let dir = self.tree.path(Folder::Similarity);
        let report = SimilarityReport::new(&dir);

        for reference in &self.references {
            let (targets, sources) = match artifacts_with_ledger(&source_dir, reference.path()) {
                Ok(found) => found,
                Err(e) => { summary.fail(Stage::Compare, &source_dir, &e); continue; }
            };
            log::info!("'{}': {} registered volume(s) to compare", reference.basename(), targets.len());
            let normalized_reference = reference.volume().normalized();

            for target_path in &targets {
                self.process_target(Stage::Compare, target_path, summary, || {
                    let stem = artifact_stem(target_path)?;
                    let name = format!("{}_overlay.png", stem);
                    let path = dir.join(&name);

                    let mut ledger = MetadataLedger::load(&dir)?;
                    ledger.check_vacant(&name)?;

                    let target = volume::tiff::load_volume(target_path)?.normalized();
                    let similarity = compare::score(&normalized_reference, &target)?;
                    self.renderer.render(&normalized_reference, &target, &path)?;

                    let mut record = source_record(&sources, target_path).cloned()
                        .unwrap_or_else(|| MetadataRecord::new(reference.path()));
                    record.reference_img = reference.path().to_path_buf();
                    record.similarity = SimilarityScores{ ssim: Some(similarity.ssim), nmse: Some(similarity.nmse) };
                    let method = record.registration.method.clone().unwrap_or_else(|| "none".to_string());
                    ledger.insert(&name, record)?;

                    let target_name = target_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                    report.append(&method, &target_name, &similarity)?;

                    log::info!("{}: NMSE {}, SSIM {}", target_name, similarity.nmse, similarity.ssim);
                    Ok(())
                })?;
            }
        }

        Ok(())
    }
}

/// Returns the artifacts of `dir` derived from `reference` and the ledger describing them.
fn artifacts_with_ledger(dir: &Path, reference: &Path) -> Result<(Vec<PathBuf>, MetadataLedger)> {
    let artifacts = MetadataLedger::find_artifacts_for_reference(dir, reference)?;
    let ledger = MetadataLedger::load(dir)?;

    Ok((artifacts, ledger))
}

fn source_record<'a>(ledger: &'a MetadataLedger, artifact: &Path) -> Option<&'a MetadataRecord> {
    let key = artifact.file_name()?.to_str()?;
    ledger.get(key)
}

fn artifact_stem(path: &Path) -> Result<String> {
    volume::basename(path).ok_or_else(|| RegistestError::invalid_image(path, "cannot determine the file name"))
}
