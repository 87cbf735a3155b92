//! Text extraction seam.
//!
//! Format-specific readers live outside this crate. The builder only needs
//! something that turns a path into text, and treats empty text as "nothing
//! to index".

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

pub trait TextExtractor {
    /// Text of the document at `path`. Unsupported formats yield an empty string.
    fn extract_text(&self, path: &Path) -> Result<String>;
}

impl<F> TextExtractor for F
where
    F: Fn(&Path) -> Result<String>,
{
    fn extract_text(&self, path: &Path) -> Result<String> {
        self(path)
    }
}

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json"];

/// Reads plain-text formats directly and yields nothing for everything else.
///
/// Never fails: unreadable files are reported as empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn supports(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                PLAIN_TEXT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String> {
        if !Self::supports(path) {
            debug!(path = %path.display(), "unsupported format");
            return Ok(String::new());
        }
        match fs::read(path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "read failed");
                Ok(String::new())
            }
        }
    }
}
