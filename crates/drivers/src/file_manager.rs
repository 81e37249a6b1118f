use std::fs;
use std::path::{Path, PathBuf};

use strand_core::artifacts::Artifact;
use strand_core::drivers::{DriverError, FileManagerDriver};
use tracing::debug;

/// Reads and writes files relative to a working directory.
///
/// `load_file` yields a text artifact when the bytes are valid UTF-8 and a
/// blob otherwise.
#[derive(Clone, Debug)]
pub struct LocalFileManagerDriver {
    workdir: PathBuf,
}

impl LocalFileManagerDriver {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into() }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.workdir.join(path)
    }
}

impl FileManagerDriver for LocalFileManagerDriver {
    fn name(&self) -> &str {
        "LocalFileManagerDriver"
    }

    fn load_file(&self, path: &str) -> Result<Artifact, DriverError> {
        let full_path = self.resolve(path);
        let bytes = fs::read(&full_path).map_err(|error| {
            DriverError::Failed(format!("could not read `{}`: {error}", full_path.display()))
        })?;
        debug!(
            event_name = "driver.file.loaded",
            path = %full_path.display(),
            bytes = bytes.len(),
            "file loaded"
        );

        Ok(match String::from_utf8(bytes) {
            Ok(text) => Artifact::Text(text),
            Err(error) => Artifact::Blob(error.into_bytes()),
        })
    }

    fn save_file(&self, path: &str, value: &Artifact) -> Result<(), DriverError> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                DriverError::Failed(format!("could not create `{}`: {error}", parent.display()))
            })?;
        }

        let bytes = match value {
            Artifact::Blob(bytes) => bytes.clone(),
            other => other.to_text().into_bytes(),
        };
        fs::write(&full_path, bytes).map_err(|error| {
            DriverError::Failed(format!("could not write `{}`: {error}", full_path.display()))
        })
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>, DriverError> {
        let full_path = self.resolve(path);
        let entries = fs::read_dir(&full_path).map_err(|error| {
            DriverError::Failed(format!("could not list `{}`: {error}", full_path.display()))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| DriverError::Failed(error.to_string()))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
