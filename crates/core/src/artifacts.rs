use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Text,
    Blob,
    List,
    Error,
    Generic,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Blob => "blob",
            Self::List => "list",
            Self::Error => "error",
            Self::Generic => "generic",
        }
    }
}

/// Value flowing between tasks and drivers.
///
/// Artifacts are immutable once built; two artifacts are equal (and hash
/// equally) when both their kind and their value match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Artifact {
    Text(String),
    Blob(Vec<u8>),
    List(Vec<Artifact>),
    Error(String),
    Generic(Value),
}

impl Artifact {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn blob(value: impl Into<Vec<u8>>) -> Self {
        Self::Blob(value.into())
    }

    pub fn list(items: impl IntoIterator<Item = Artifact>) -> Self {
        Self::List(items.into_iter().collect())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn generic(value: Value) -> Self {
        Self::Generic(value)
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Text(_) => ArtifactKind::Text,
            Self::Blob(_) => ArtifactKind::Blob,
            Self::List(_) => ArtifactKind::List,
            Self::Error(_) => ArtifactKind::Error,
            Self::Generic(_) => ArtifactKind::Generic,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn to_text(&self) -> String {
        match self {
            Self::Text(value) | Self::Error(value) => value.clone(),
            Self::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::List(items) => items.iter().map(Artifact::to_text).collect::<Vec<_>>().join("\n"),
            Self::Generic(Value::String(value)) => value.clone(),
            Self::Generic(value) => value.to_string(),
        }
    }
}

impl Hash for Artifact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Text(value) | Self::Error(value) => value.hash(state),
            Self::Blob(bytes) => bytes.hash(state),
            Self::List(items) => items.hash(state),
            // object keys are kept sorted, so the rendered form is canonical
            Self::Generic(value) => value.to_string().hash(state),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Artifact {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Artifact {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
