//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Utilities.
//!

use crate::error::{RegistestError, Result};
use crate::volume::tiff::has_tiff_extension;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Returns all non-empty lines of the specified file, trimmed.
pub fn parse_list_file(file_name: &Path) -> Result<Vec<String>> {
    let list_file = std::fs::OpenOptions::new().read(true).write(false).open(file_name)
        .map_err(|e| RegistestError::storage(file_name, e))?;

    let mut lines = vec![];
    for line in std::io::BufReader::new(list_file).lines() {
        let line = line.map_err(|e| RegistestError::storage(file_name, e))?;
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }

    Ok(lines)
}

/// Returns the TIFF files of `dir`, sorted by name.
///
/// Fails if `dir` does not exist or is not a directory.
///
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| RegistestError::storage(dir, e))?;

    let mut files = vec![];
    for entry in entries {
        let path = entry.map_err(|e| RegistestError::storage(dir, e))?.path();
        if path.is_file() && has_tiff_extension(&path) {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Returns the paths of reference volumes named by `source`: a TIFF file, a directory of them,
/// or a list file with one path per line.
pub fn expand_reference_source(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_dir() {
        list_image_files(source)
    } else if has_tiff_extension(source) {
        Ok(vec![source.to_path_buf()])
    } else {
        Ok(parse_list_file(source)?.into_iter().map(PathBuf::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_file_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("refs.txt");
        std::fs::write(&list, "a.tif\n\n  b.tif  \n").unwrap();

        assert_eq!(vec!["a.tif", "b.tif"], parse_list_file(&list).unwrap());
    }

    #[test]
    fn missing_list_file_fails() {
        assert!(matches!(
            parse_list_file(Path::new("/nonexistent/refs.txt")),
            Err(RegistestError::Storage{ .. })
        ));
    }

    #[test]
    fn only_tiff_files_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.TIF", "a.tif", "b.png", "metadata.json"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.tif")).unwrap();

        assert_eq!(
            vec![dir.path().join("a.tif"), dir.path().join("c.TIF")],
            list_image_files(dir.path()).unwrap()
        );
    }

    #[test]
    fn listing_a_missing_directory_fails() {
        assert!(list_image_files(Path::new("/nonexistent/dir")).is_err());
    }

    #[test]
    fn reference_source_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("a.tif");
        std::fs::write(&tif, b"").unwrap();
        let list = dir.path().join("refs.txt");
        std::fs::write(&list, format!("{}\n", tif.display())).unwrap();

        assert_eq!(vec![tif.clone()], expand_reference_source(&tif).unwrap());
        assert_eq!(vec![tif.clone()], expand_reference_source(dir.path()).unwrap());
        assert_eq!(vec![tif], expand_reference_source(&list).unwrap());
    }
}
