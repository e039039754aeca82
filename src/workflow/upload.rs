//! File-bearing form fields. Files are embedded in the submission payload as
//! base64 data URLs; the backend never receives raw uploads.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{BackofficeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub size: usize,
    pub data_url: String,
}

impl Attachment {
    /// Encode `bytes` as a data URL. The media type is sniffed from the
    /// content first, then from `declared`, then from the file extension.
    pub fn from_bytes(name: &str, declared: Option<&str>, bytes: &[u8]) -> Self {
        let mime = sniff(bytes)
            .or(declared)
            .or_else(|| mime_from_extension(name))
            .unwrap_or("application/octet-stream")
            .to_string();
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self {
            name: name.to_string(),
            data_url: format!("data:{};base64,{}", mime, encoded),
            mime,
            size: bytes.len(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(&name, None, &bytes))
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    pub fn is_pdf(&self) -> bool {
        self.mime == "application/pdf"
    }
}

fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else {
        None
    }
}

fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

/// What a file field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptPolicy {
    pub images: bool,
    pub pdf: bool,
    /// Exact number of files required, if the field demands one.
    pub exact_count: Option<usize>,
    pub max_bytes: Option<usize>,
}

impl AcceptPolicy {
    pub const IMAGES: AcceptPolicy = AcceptPolicy {
        images: true,
        pdf: false,
        exact_count: None,
        max_bytes: Some(5 * 1024 * 1024),
    };

    pub const DOCUMENTS: AcceptPolicy = AcceptPolicy {
        images: true,
        pdf: true,
        exact_count: None,
        max_bytes: Some(10 * 1024 * 1024),
    };

    /// Exactly one image, e.g. a vehicle photo.
    pub const SINGLE_IMAGE: AcceptPolicy = AcceptPolicy {
        images: true,
        pdf: false,
        exact_count: Some(1),
        max_bytes: Some(5 * 1024 * 1024),
    };

    fn allows(&self, file: &Attachment) -> bool {
        (self.images && file.is_image()) || (self.pdf && file.is_pdf())
    }

    fn describe(&self) -> &'static str {
        match (self.images, self.pdf) {
            (true, true) => "images or PDF documents",
            (true, false) => "images",
            (false, true) => "PDF documents",
            (false, false) => "no files",
        }
    }

    /// Validate a selection as a whole. Nothing is accepted unless every
    /// file passes.
    pub fn check(&self, files: &[Attachment]) -> Result<()> {
        if let Some(n) = self.exact_count {
            if files.len() != n {
                return Err(BackofficeError::Attachment(format!(
                    "Select exactly {} file{} ({} selected)",
                    n,
                    if n == 1 { "" } else { "s" },
                    files.len()
                )));
            }
        }
        for file in files {
            if !self.allows(file) {
                return Err(BackofficeError::Attachment(format!(
                    "{} is not allowed here; only {} are accepted",
                    file.name,
                    self.describe()
                )));
            }
            if let Some(max) = self.max_bytes {
                if file.size > max {
                    return Err(BackofficeError::Attachment(format!(
                        "{} is larger than {} MB",
                        file.name,
                        max / (1024 * 1024)
                    )));
                }
            }
        }
        Ok(())
    }
}
