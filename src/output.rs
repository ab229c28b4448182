//
// registest - Accuracy test harness for 3D image registration
// Copyright (c) 2020 Filip Szczerek <ga.software@yahoo.com>
//
// This project is licensed under the terms of the MIT license
// (see the LICENSE file for details).
//

//!
//! Output directory layout.
//!

use crate::error::{RegistestError, Result};
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;

#[derive(Copy, Clone, Debug, Eq, PartialEq, strum_macros::EnumIter)]
pub enum Folder {
    Reference,
    ToRegister,
    Shifted,
    Similarity
}

impl From<Folder> for &str {
    fn from(folder: Folder) -> &'static str {
        match folder {
            Folder::Reference  => "reference",
            Folder::ToRegister => "to_register",
            Folder::Shifted    => "shifted",
            Folder::Similarity => "similarity"
        }
    }
}

impl std::str::FromStr for Folder {
    type Err = RegistestError;

    fn from_str(s: &str) -> Result<Folder> {
        for folder in Folder::iter() {
            if s == Into::<&str>::into(folder) {
                return Ok(folder);
            }
        }

        Err(RegistestError::UnknownFolder(s.to_string()))
    }
}

/// The four sub-directories of an output root.
pub struct OutputTree {
    root: PathBuf
}

impl OutputTree {
    pub fn new<P: Into<PathBuf>>(root: P) -> OutputTree {
        OutputTree{ root: root.into() }
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn path(&self, folder: Folder) -> PathBuf {
        self.root.join(Into::<&str>::into(folder))
    }

    /// Returns the directory of the folder called `name`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        Ok(self.path(name.parse::<Folder>()?))
    }

    /// Creates the root and every folder; existing ones are kept.
    pub fn ensure_created(&self) -> Result<()> {
        for folder in Folder::iter() {
            let path = self.path(folder);
            std::fs::create_dir_all(&path).map_err(|e| RegistestError::storage(&path, e))?;
        }

        Ok(())
    }

    /// Places a link to `reference` in the reference folder and returns the link path.
    ///
    /// An existing entry of the same name is left as is. Hosts without symbolic links get a copy.
    ///
    pub fn link_reference(&self, reference: &Path) -> Result<PathBuf> {
        let file_name = reference.file_name().ok_or_else(|| RegistestError::InvalidArgument(
            format!("reference path '{}' has no file name", reference.display())
        ))?;
        let link = self.path(Folder::Reference).join(file_name);

        if link.symlink_metadata().is_ok() {
            log::debug!("reference link '{}' already exists", link.display());
            return Ok(link);
        }

        let source = std::path::absolute(reference).map_err(|e| RegistestError::storage(reference, e))?;
        make_link(&source, &link).map_err(|e| RegistestError::storage(&link, e))?;
        log::debug!("linked '{}' -> '{}'", link.display(), source.display());

        Ok(link)
    }
}

#[cfg(unix)]
fn make_link(source: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(not(unix))]
fn make_link(source: &Path, link: &Path) -> std::io::Result<()> {
    std::fs::copy(source, link).map(|_| ())
}
