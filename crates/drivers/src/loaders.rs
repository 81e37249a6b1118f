use std::sync::Arc;

use indexmap::IndexMap;
use strand_core::artifacts::Artifact;
use strand_core::drivers::{DriverError, FileManagerDriver};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Latin1 => "latin-1",
        }
    }

    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        match self {
            Self::Utf8 => Some(text.as_bytes().to_vec()),
            Self::Latin1 => text.chars().map(|ch| u8::try_from(u32::from(ch)).ok()).collect(),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            Self::Latin1 => Some(bytes.iter().map(|byte| char::from(*byte)).collect()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("`{source_path}` is not valid {encoding}")]
    Encoding { source_path: String, encoding: &'static str },
    #[error("`{source_path}` produced a {kind} artifact, expected text or bytes")]
    UnexpectedArtifact { source_path: String, kind: &'static str },
}

/// Fetches raw bytes through a file manager and parses them into an artifact.
pub trait FileLoader {
    fn file_manager(&self) -> &dyn FileManagerDriver;

    fn encoding(&self) -> Encoding;

    fn parse(&self, source: &str, bytes: Vec<u8>) -> Result<Artifact, LoaderError>;

    /// Text content is re-encoded with the loader's encoding.
    fn fetch(&self, source: &str) -> Result<Vec<u8>, LoaderError> {
        match self.file_manager().load_file(source)? {
            Artifact::Blob(bytes) => Ok(bytes),
            Artifact::Text(text) => self.encoding().encode(&text).ok_or_else(|| {
                LoaderError::Encoding {
                    source_path: source.to_string(),
                    encoding: self.encoding().as_str(),
                }
            }),
            other => Err(LoaderError::UnexpectedArtifact {
                source_path: source.to_string(),
                kind: other.kind().as_str(),
            }),
        }
    }

    fn load(&self, source: &str) -> Result<Artifact, LoaderError> {
        let bytes = self.fetch(source)?;
        self.parse(source, bytes)
    }

    /// Loads every source, keyed by source in the order given.
    fn load_collection(&self, sources: &[&str]) -> Result<IndexMap<String, Artifact>, LoaderError> {
        sources
            .iter()
            .map(|source| self.load(source).map(|artifact| (source.to_string(), artifact)))
            .collect()
    }
}

pub struct TextLoader {
    file_manager: Arc<dyn FileManagerDriver>,
    encoding: Encoding,
}

impl TextLoader {
    pub fn new(file_manager: Arc<dyn FileManagerDriver>) -> Self {
        Self { file_manager, encoding: Encoding::default() }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl FileLoader for TextLoader {
    fn file_manager(&self) -> &dyn FileManagerDriver {
        self.file_manager.as_ref()
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn parse(&self, source: &str, bytes: Vec<u8>) -> Result<Artifact, LoaderError> {
        self.encoding.decode(&bytes).map(Artifact::Text).ok_or_else(|| LoaderError::Encoding {
            source_path: source.to_string(),
            encoding: self.encoding.as_str(),
        })
    }
}

pub struct BlobLoader {
    file_manager: Arc<dyn FileManagerDriver>,
    encoding: Encoding,
}

impl BlobLoader {
    pub fn new(file_manager: Arc<dyn FileManagerDriver>) -> Self {
        Self { file_manager, encoding: Encoding::default() }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl FileLoader for BlobLoader {
    fn file_manager(&self) -> &dyn FileManagerDriver {
        self.file_manager.as_ref()
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn parse(&self, _source: &str, bytes: Vec<u8>) -> Result<Artifact, LoaderError> {
        Ok(Artifact::Blob(bytes))
    }
}
