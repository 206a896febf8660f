//! Rendered figures that can be written out as PDF.

use std::fs;
use std::path::Path;

use crate::error::{DriveError, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Anything that can render itself to a PDF file.
pub trait Figure {
    fn save_pdf(&self, path: &Path) -> Result<()>;
}

/// A figure that was already rendered to PDF bytes by a plotting backend.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    bytes: Vec<u8>,
}

impl PdfDocument {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(DriveError::FigureError(
                "content does not start with a PDF header".to_string(),
            ));
        }
        Ok(Self { bytes })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Figure for PdfDocument {
    fn save_pdf(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }
}
