//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Per-directory metadata ledger (`metadata.json`).
//!
//! Every artifact stored in a directory has at most one record, keyed by its file name.
//! Records are never updated; every insert rewrites the whole document.
//!

use crate::error::{RegistestError, Result};
use crate::utils;
use crate::volume::{self, ShiftVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftStep {
    pub applied: bool,
    pub shift: Option<ShiftVector>
}

impl ShiftStep {
    pub fn applied(shift: ShiftVector) -> ShiftStep { ShiftStep{ applied: true, shift: Some(shift) } }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationStep {
    pub applied: bool,
    pub method: Option<String>
}

impl RegistrationStep {
    pub fn applied(method: &str) -> RegistrationStep {
        RegistrationStep{ applied: true, method: Some(method.to_string()) }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScores {
    #[serde(rename = "SSIM")]
    pub ssim: Option<f64>,
    #[serde(rename = "NMSE")]
    pub nmse: Option<f64>
}

/// Provenance of one artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Path of the reference volume the artifact derives from.
    pub reference_img: PathBuf,
    /// Ground-truth shift, if the artifact (or its source) was generated synthetically.
    pub transformation: ShiftStep,
    pub registration: RegistrationStep,
    /// Shift actually applied to produce the artifact.
    pub shift: ShiftStep,
    pub similarity: SimilarityScores
}

impl MetadataRecord {
    pub fn new(reference_img: &Path) -> MetadataRecord {
        MetadataRecord{
            reference_img: reference_img.to_path_buf(),
            transformation: ShiftStep::default(),
            registration: RegistrationStep::default(),
            shift: ShiftStep::default(),
            similarity: SimilarityScores::default()
        }
    }

    /// Returns true if the record's reference has the same basename as `reference`.
    pub fn derives_from(&self, reference: &Path) -> bool {
        match (volume::basename(&self.reference_img), volume::basename(reference)) {
            (Some(a), Some(b)) => a == b,
            _ => false
        }
    }
}

pub struct MetadataLedger {
    path: PathBuf,
    records: BTreeMap<String, MetadataRecord>
}

impl MetadataLedger {
    pub const FILE_NAME: &'static str = "metadata.json";

    /// Loads the ledger of `dir`; a missing ledger (or directory) yields an empty one.
    pub fn load(dir: &Path) -> Result<MetadataLedger> {
        let path = dir.join(MetadataLedger::FILE_NAME);
        let records = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|source| RegistestError::CorruptLedger{ path: path.clone(), source })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(RegistestError::storage(&path, e))
        };

        Ok(MetadataLedger{ path, records })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn get(&self, key: &str) -> Option<&MetadataRecord> { self.records.get(key) }

    pub fn records(&self) -> impl Iterator<Item = (&String, &MetadataRecord)> { self.records.iter() }

    /// Fails with `DuplicateKey` if `key` already has a record.
    pub fn check_vacant(&self, key: &str) -> Result<()> {
        if self.records.contains_key(key) {
            Err(RegistestError::DuplicateKey{ key: key.to_string(), ledger: self.path.clone() })
        } else {
            Ok(())
        }
    }

    /// Inserts a record and persists the ledger.
    ///
    /// Fails with `DuplicateKey` if `key` already exists; the ledger on disk is then left unchanged.
    ///
    pub fn insert(&mut self, key: &str, record: MetadataRecord) -> Result<()> {
        self.check_vacant(key)?;

        self.records.insert(key.to_string(), record);
        if let Err(e) = self.persist() {
            self.records.remove(key);
            return Err(e);
        }

        log::debug!("added '{}' to {}", key, self.path.display());
        Ok(())
    }

    /// Writes the whole document to a temporary file and renames it over the ledger.
    fn persist(&self) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");

        let mut text = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut text, formatter);
        self.records.serialize(&mut serializer)
            .map_err(|e| RegistestError::storage(&self.path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let mut file = std::fs::File::create(&tmp_path).map_err(|e| RegistestError::storage(&tmp_path, e))?;
        file.write_all(&text).map_err(|e| RegistestError::storage(&tmp_path, e))?;
        file.sync_all().map_err(|e| RegistestError::storage(&tmp_path, e))?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| RegistestError::storage(&self.path, e))
    }

    /// Returns the artifacts in `dir` derived from `reference`.
    ///
    /// Without a ledger in `dir`, all image files of `dir` are returned.
    ///
    pub fn find_artifacts_for_reference(dir: &Path, reference: &Path) -> Result<Vec<PathBuf>> {
        if !dir.join(MetadataLedger::FILE_NAME).exists() {
            return utils::list_image_files(dir);
        }

        let ledger = MetadataLedger::load(dir)?;
        Ok(ledger.records()
            .filter(|(_, record)| record.derives_from(reference))
            .map(|(key, _)| dir.join(key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reference: &str) -> MetadataRecord {
        let mut record = MetadataRecord::new(Path::new(reference));
        record.transformation = ShiftStep::applied(ShiftVector::xyz(1.0, 0.0, 0.0).unwrap());
        record
    }

    #[test]
    fn missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MetadataLedger::load(dir.path()).unwrap().is_empty());
        assert!(MetadataLedger::load(&dir.path().join("nonexistent")).unwrap().is_empty());
    }

    #[test]
    fn inserted_record_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = MetadataLedger::load(dir.path()).unwrap();
        ledger.insert("ref_target_0.tif", record("/data/ref.tif")).unwrap();

        let reloaded = MetadataLedger::load(dir.path()).unwrap();
        assert_eq!(1, reloaded.len());
        assert_eq!(Some(&record("/data/ref.tif")), reloaded.get("ref_target_0.tif"));
    }

    #[test]
    fn duplicate_key_leaves_ledger_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = MetadataLedger::load(dir.path()).unwrap();
        ledger.insert("a.tif", record("/data/ref.tif")).unwrap();
        let before = std::fs::read_to_string(ledger.path()).unwrap();

        let mut other = MetadataRecord::new(Path::new("/data/other.tif"));
        other.registration = RegistrationStep::applied("phase-correlation");
        match ledger.insert("a.tif", other) {
            Err(RegistestError::DuplicateKey{ key, .. }) => assert_eq!("a.tif", key),
            other => panic!("unexpected result: {:?}", other)
        }

        assert_eq!(before, std::fs::read_to_string(ledger.path()).unwrap());
        let reloaded = MetadataLedger::load(dir.path()).unwrap();
        assert_eq!(Some(&record("/data/ref.tif")), reloaded.get("a.tif"));
    }

    #[test]
    fn document_uses_expected_schema() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = MetadataLedger::load(dir.path()).unwrap();
        ledger.insert("ref_target_0.tif", record("/data/ref.tif")).unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert!(text.contains("\n    \"ref_target_0.tif\": {"), "{}", text);

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let entry = &value["ref_target_0.tif"];
        assert_eq!("/data/ref.tif", entry["reference_img"]);
        assert_eq!(true, entry["transformation"]["applied"]);
        assert_eq!(serde_json::json!([1.0, 0.0, 0.0]), entry["transformation"]["shift"]["xyz"]);
        assert_eq!(serde_json::Value::Null, entry["registration"]["method"]);
        assert_eq!(serde_json::Value::Null, entry["similarity"]["SSIM"]);
    }

    #[test]
    fn malformed_document_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MetadataLedger::FILE_NAME), "{ not json").unwrap();
        assert!(matches!(MetadataLedger::load(dir.path()), Err(RegistestError::CorruptLedger{ .. })));
    }

    #[test]
    fn artifacts_are_selected_by_reference_basename() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = MetadataLedger::load(dir.path()).unwrap();
        ledger.insert("a_target_0.tif", record("/data/a.tif")).unwrap();
        ledger.insert("b_target_0.tif", record("/elsewhere/b.tif")).unwrap();
        ledger.insert("a_target_1.tif", record("/out/reference/a.tiff")).unwrap();
        ledger.insert("ab_target_0.tif", record("/data/ab.tif")).unwrap();

        let found = MetadataLedger::find_artifacts_for_reference(dir.path(), Path::new("/x/a.tif")).unwrap();
        assert_eq!(vec![dir.path().join("a_target_0.tif"), dir.path().join("a_target_1.tif")], found);
    }

    #[test]
    fn reference_identity_ignores_directory_and_extension() {
        let record = MetadataRecord::new(Path::new("/data/ref.tif"));
        assert!(record.derives_from(Path::new("/out/reference/ref.tiff")));
        assert!(record.derives_from(Path::new("ref.ome.tif")));
        assert!(!record.derives_from(Path::new("/data/ref2.tif")));
        assert!(!MetadataRecord::new(Path::new("/")).derives_from(Path::new("/")));
    }

    #[test]
    fn without_ledger_all_images_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.tif"), b"").unwrap();
        std::fs::write(dir.path().join("a.tiff"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = MetadataLedger::find_artifacts_for_reference(dir.path(), Path::new("/x/a.tif")).unwrap();
        assert_eq!(vec![dir.path().join("a.tiff"), dir.path().join("b.tif")], found);
    }
}
