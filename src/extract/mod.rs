//! Policy documents to plain text.
//!
//! A policy is extracted once, on first use in a query. The text lands next to
//! the source with a `.txt` extension and the policy's extracted flag is set so
//! later queries read the file directly.

use log::info;
use std::any::Any;
use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::policy::Policy;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("source document not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported document format: {0}")]
    Unsupported(String),

    #[error("failed to extract text from {path}: {reason}")]
    Failed { path: PathBuf, reason: String },

    #[error("failed to write extracted text to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read extracted text from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Where the text ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text_path: PathBuf,
    pub chars: usize,
}

pub trait DocumentExtractor {
    fn extract(&self, source: &Path, dest: &Path) -> Result<Extraction>;
}

/// Text-layer extraction: pdf through pdf-extract, txt/md passed through.
/// Scanned PDFs without a text layer fail; there is no OCR fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextExtractor;

impl DocumentExtractor for TextExtractor {
    fn extract(&self, source: &Path, dest: &Path) -> Result<Extraction> {
        if !source.exists() {
            return Err(ExtractionError::NotFound(source.to_path_buf()));
        }

        let text = match lower_ext(source).as_deref() {
            Some("pdf") => pdf_text(source)?,
            Some("txt") | Some("md") => {
                fs::read_to_string(source).map_err(|e| ExtractionError::Read {
                    path: source.to_path_buf(),
                    source: e,
                })?
            }
            other => {
                return Err(ExtractionError::Unsupported(
                    other.unwrap_or("(none)").to_string(),
                ));
            }
        };

        if text.trim().is_empty() {
            return Err(ExtractionError::Failed {
                path: source.to_path_buf(),
                reason: "document has no text layer".to_string(),
            });
        }

        if source != dest {
            fs::write(dest, &text).map_err(|e| ExtractionError::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;
        }

        Ok(Extraction {
            text_path: dest.to_path_buf(),
            chars: text.chars().count(),
        })
    }
}

/// pdf-extract panics on some malformed font tables; that must not take the server down.
fn pdf_text(source: &Path) -> Result<String> {
    let failed = |reason: String| ExtractionError::Failed {
        path: source.to_path_buf(),
        reason,
    };
    match panic::catch_unwind(|| pdf_extract::extract_text(source)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(failed(e.to_string())),
        Err(payload) => Err(failed(format!("pdf parser panicked: {}", panic_message(&*payload)))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

fn lower_ext(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
}

/// `dir/name.pdf` -> `dir/name.txt`
pub fn text_path_for(source: &Path) -> PathBuf {
    source.with_extension("txt")
}

/// Runs extraction unless the policy already carries extracted text.
/// Returns true when this call did the work.
pub fn ensure_extracted(policy: &mut Policy, extractor: &dyn DocumentExtractor) -> Result<bool> {
    if policy.extracted_text().is_some() {
        return Ok(false);
    }

    let dest = text_path_for(&policy.path);
    let extraction = extractor.extract(&policy.path, &dest)?;
    info!(
        "extracted {} chars from {} into {}",
        extraction.chars,
        policy.path.display(),
        extraction.text_path.display()
    );
    policy.mark_extracted(&extraction.text_path);
    Ok(true)
}

pub fn read_extracted(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ExtractionError::NotFound(path.to_path_buf())
        } else {
            ExtractionError::Read {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}
