//! Text extraction boundary.
//!
//! Format-specific readers live behind the [`TextExtractor`] trait:
//! given a document path, produce an ordered sequence of raw text
//! segments. The [`ExtractorRegistry`] maps file extensions to
//! extractors, so supporting a new format is a registry entry, not a
//! string match in the pipeline. Unsupported types are rejected here,
//! before any segmentation or storage happens.
//!
//! Only plain text ships in-tree. PDF and DOCX readers are external
//! collaborators that register their own implementations.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Error type for the extraction boundary. An extraction failure skips
/// the document; it never aborts the surrounding indexing run.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// No extractor is registered for the file's extension
    #[error("unsupported document type: .{extension}")]
    UnsupportedType { extension: String },

    /// The file could not be read
    #[error("failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file was read but produced no usable text
    #[error("{path} contains no extractable text")]
    Empty { path: PathBuf },
}

/// A format-specific text reader.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Produce the document's raw text as ordered segments (pages,
    /// sections — whatever the format naturally divides into).
    async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractError>;
}

/// Reads a file as UTF-8 text, replacing invalid sequences rather than
/// failing on them.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        if content.trim().is_empty() {
            return Err(ExtractError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(vec![content])
    }
}

/// Extension → extractor mapping.
pub struct ExtractorRegistry {
    extractors: HashMap<String, Box<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// An empty registry, for callers that want full control over the
    /// supported formats.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// The default registry: plain text for `txt` and `md`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("txt", Box::new(PlainTextExtractor));
        registry.register("md", Box::new(PlainTextExtractor));
        registry
    }

    /// Register an extractor for an extension (lowercased, no dot).
    pub fn register(&mut self, extension: &str, extractor: Box<dyn TextExtractor>) {
        self.extractors
            .insert(extension.to_ascii_lowercase(), extractor);
    }

    /// Whether some extractor handles this path's extension.
    pub fn supports(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.extractors.contains_key(&ext))
            .unwrap_or(false)
    }

    /// Extensions this registry currently handles, sorted for stable
    /// display.
    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut extensions: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        extensions
    }

    /// Extract raw text segments from `path` with the registered
    /// extractor for its extension.
    pub async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let extension = extension_of(path).unwrap_or_default();
        let extractor =
            self.extractors
                .get(&extension)
                .ok_or_else(|| ExtractError::UnsupportedType {
                    extension: extension.clone(),
                })?;
        extractor.extract(path).await
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Lowercased extension of a path, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_registry_supports_plain_text() {
        let registry = ExtractorRegistry::with_defaults();
        assert!(registry.supports(Path::new("notes/today.txt")));
        assert!(registry.supports(Path::new("README.md")));
        assert!(registry.supports(Path::new("SHOUTING.TXT")));
        assert!(!registry.supports(Path::new("scan.pdf")));
        assert!(!registry.supports(Path::new("no_extension")));
        assert_eq!(registry.supported_extensions(), vec!["md", "txt"]);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected_before_reading() {
        let registry = ExtractorRegistry::with_defaults();
        let err = registry
            .extract(Path::new("does-not-even-exist.docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedType { extension } if extension == "docx"));
    }

    #[tokio::test]
    async fn plain_text_extraction_reads_the_whole_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.txt");
        tokio::fs::write(&path, "first line\nsecond line")
            .await
            .unwrap();

        let registry = ExtractorRegistry::with_defaults();
        let segments = registry.extract(&path).await.unwrap();
        assert_eq!(segments, vec!["first line\nsecond line".to_string()]);
    }

    #[tokio::test]
    async fn blank_file_is_an_extraction_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        tokio::fs::write(&path, "   \n\n  ").await.unwrap();

        let registry = ExtractorRegistry::with_defaults();
        let err = registry.extract(&path).await.unwrap_err();
        assert!(matches!(err, ExtractError::Empty { .. }));
    }

    #[tokio::test]
    async fn custom_extractor_can_be_registered() {
        struct Fixed;

        #[async_trait]
        impl TextExtractor for Fixed {
            async fn extract(&self, _path: &Path) -> Result<Vec<String>, ExtractError> {
                Ok(vec!["page one".to_string(), "page two".to_string()])
            }
        }

        let mut registry = ExtractorRegistry::new();
        registry.register("pdf", Box::new(Fixed));

        let segments = registry.extract(Path::new("whatever.pdf")).await.unwrap();
        assert_eq!(segments.len(), 2);
    }
}
