//! Configuration document codec and dotted-path navigation.
//!
//! The document is owned by the caller. It is always read and written
//! wholesale; mutation happens on an in-memory map.

use std::path::{Path, PathBuf};

use crate::AdapterError;
use serde_json::{Map, Value};
use skilltune_core::Parameters;
use tokio::fs;

/// On-disk format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.json`
    Json,
    /// `.yaml` / `.yml`
    Yaml,
}

impl DocumentFormat {
    /// Detect the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, AdapterError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(AdapterError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// A skill's configuration file.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    format: DocumentFormat,
}

impl ConfigDocument {
    /// Wrap a configuration file path.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AdapterError> {
        let path = path.into();
        let format = DocumentFormat::from_path(&path)?;
        Ok(Self { path, format })
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected format.
    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Read the raw bytes.
    pub async fn read_bytes(&self) -> Result<Vec<u8>, AdapterError> {
        Ok(fs::read(&self.path).await?)
    }

    /// Replace the file contents.
    ///
    /// Written to a sibling temporary file and renamed, so readers never see
    /// a partially written document.
    pub async fn write_bytes(&self, bytes: &[u8]) -> Result<(), AdapterError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Decode raw bytes into a map. Empty documents decode to an empty map.
    pub fn decode(&self, bytes: &[u8]) -> Result<Parameters, AdapterError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Parameters::new());
        }
        let value: Value = match self.format {
            DocumentFormat::Json => serde_json::from_slice(bytes)?,
            DocumentFormat::Yaml => serde_yaml::from_slice(bytes)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Parameters::new()),
            _ => Err(AdapterError::NotAMap(self.path.clone())),
        }
    }

    /// Encode a map in the document's format.
    pub fn encode(&self, doc: &Parameters) -> Result<Vec<u8>, AdapterError> {
        let value = Value::Object(doc.clone());
        match self.format {
            DocumentFormat::Json => {
                let mut out = serde_json::to_vec_pretty(&value)?;
                out.push(b'\n');
                Ok(out)
            }
            DocumentFormat::Yaml => Ok(serde_yaml::to_string(&value)?.into_bytes()),
        }
    }

    /// Read and decode.
    pub async fn load(&self) -> Result<Parameters, AdapterError> {
        let bytes = self.read_bytes().await?;
        self.decode(&bytes)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, AdapterError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(AdapterError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Value at a dotted path, if present.
pub(crate) fn get_path<'a>(doc: &'a Parameters, path: &str) -> Result<Option<&'a Value>, AdapterError> {
    let segments = split_path(path)?;
    let (last, parents) = segments.split_last().ok_or_else(|| AdapterError::InvalidPath(path.to_string()))?;

    let mut current = doc;
    for segment in parents {
        match current.get(*segment) {
            None => return Ok(None),
            Some(Value::Object(map)) => current = map,
            Some(_) => {
                return Err(AdapterError::PathNotNavigable {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        }
    }
    Ok(current.get(*last))
}

/// Set the value at a dotted path, creating missing intermediate maps.
///
/// Returns the previous value. On error the document is left untouched.
pub(crate) fn set_path(doc: &mut Parameters, path: &str, value: Value) -> Result<Option<Value>, AdapterError> {
    // Validate first so a failure never leaves half-created maps behind.
    get_path(doc, path)?;

    let segments = split_path(path)?;
    let (last, parents) = segments.split_last().ok_or_else(|| AdapterError::InvalidPath(path.to_string()))?;

    let mut current = doc;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(AdapterError::PathNotNavigable {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };
    }
    Ok(current.insert(last.to_string(), value))
}
