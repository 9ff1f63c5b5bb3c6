//! Quick-notes export artifacts and the download side effect.
//!
//! # Responsibility
//! - Map export formats to file names, content types and wrapped content.
//! - Hand finished artifacts to a `Downloader`.
//!
//! # Invariants
//! - Unsupported formats never reach a downloader.
//! - The `pdf` artifact is HTML labeled `application/pdf`; no PDF encoding
//!   happens here.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

const ARTIFACT_BASENAME: &str = "quicknotes";
const MAX_UNIQUIFY_ATTEMPTS: u32 = 1000;

/// Supported quick-notes export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Doc,
    Txt,
    Pdf,
}

impl ExportFormat {
    /// Parses a request `format` value; case-sensitive like the wire protocol.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "doc" => Some(Self::Doc),
            "txt" => Some(Self::Txt),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Txt => "txt",
            Self::Pdf => "pdf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Doc => "text/doc",
            Self::Txt => "text/plain",
            Self::Pdf => "application/pdf",
        }
    }

    /// Wraps raw notes into the artifact body for this format.
    pub fn render(self, notes: &str) -> String {
        match self {
            Self::Doc | Self::Txt => notes.to_string(),
            Self::Pdf => format!(
                "<html><head><title>Quick Notes</title>\
                 <style>body {{ font-family: Arial, sans-serif; }}</style>\
                 </head><body>{notes}</body></html>"
            ),
        }
    }
}

/// A file ready to be handed to the download side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub mime_type: &'static str,
    pub content: String,
}

impl ExportArtifact {
    pub fn quick_notes(format: ExportFormat, notes: &str) -> Self {
        Self {
            filename: format!("{ARTIFACT_BASENAME}.{}", format.extension()),
            mime_type: format.mime_type(),
            content: format.render(notes),
        }
    }
}

/// Download side-effect failure.
#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    /// Every uniquified name up to the attempt cap already exists.
    NameExhausted(String),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "download failed: {err}"),
            Self::NameExhausted(filename) => {
                write!(f, "download failed: no free file name for `{filename}`")
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::NameExhausted(_) => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Receives finished export artifacts.
pub trait Downloader {
    /// Delivers one artifact and returns where it ended up.
    fn download(&self, artifact: &ExportArtifact) -> Result<PathBuf, ExportError>;
}

/// Writes artifacts into a directory, uniquifying clashing names as
/// `quicknotes (1).txt`, `quicknotes (2).txt`, ...
#[derive(Debug, Clone)]
pub struct FsDownloader {
    dir: PathBuf,
}

impl FsDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Downloader for FsDownloader {
    fn download(&self, artifact: &ExportArtifact) -> Result<PathBuf, ExportError> {
        for attempt in 0..MAX_UNIQUIFY_ATTEMPTS {
            let path = self.dir.join(uniquified_name(&artifact.filename, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(artifact.content.as_bytes())?;
                    file.flush()?;
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(ExportError::NameExhausted(artifact.filename.clone()))
    }
}

/// Collects artifacts in memory; clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryDownloader {
    artifacts: Arc<Mutex<Vec<ExportArtifact>>>,
}

impl MemoryDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every artifact downloaded so far.
    pub fn artifacts(&self) -> Vec<ExportArtifact> {
        self.artifacts
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl Downloader for MemoryDownloader {
    fn download(&self, artifact: &ExportArtifact) -> Result<PathBuf, ExportError> {
        let mut guard = self
            .artifacts
            .lock()
            .map_err(|_| ExportError::Io(std::io::Error::other("download buffer poisoned")))?;
        guard.push(artifact.clone());
        Ok(PathBuf::from(&artifact.filename))
    }
}

fn uniquified_name(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem} ({attempt}).{extension}"),
        _ => format!("{filename} ({attempt})"),
    }
}

#[cfg(test)]
mod tests {
    use super::{uniquified_name, Downloader, ExportArtifact, ExportFormat, FsDownloader};

    #[test]
    fn parses_only_known_formats() {
        assert_eq!(ExportFormat::parse("txt"), Some(ExportFormat::Txt));
        assert_eq!(ExportFormat::parse("pdf"), Some(ExportFormat::Pdf));
        assert_eq!(ExportFormat::parse("xml"), None);
        assert_eq!(ExportFormat::parse("TXT"), None);
    }

    #[test]
    fn pdf_artifact_wraps_notes_in_html() {
        let artifact = ExportArtifact::quick_notes(ExportFormat::Pdf, "chapter 3");
        assert_eq!(artifact.filename, "quicknotes.pdf");
        assert_eq!(artifact.mime_type, "application/pdf");
        assert!(artifact.content.starts_with("<html>"));
        assert!(artifact.content.contains("<body>chapter 3</body>"));
    }

    #[test]
    fn uniquified_names_insert_counter_before_extension() {
        assert_eq!(uniquified_name("quicknotes.txt", 0), "quicknotes.txt");
        assert_eq!(uniquified_name("quicknotes.txt", 2), "quicknotes (2).txt");
        assert_eq!(uniquified_name("notes", 1), "notes (1)");
    }

    #[test]
    fn fs_downloader_never_overwrites_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let downloader = FsDownloader::new(dir.path());
        let first = ExportArtifact::quick_notes(ExportFormat::Txt, "one");
        let second = ExportArtifact::quick_notes(ExportFormat::Txt, "two");

        let first_path = downloader.download(&first).expect("first download");
        let second_path = downloader.download(&second).expect("second download");

        assert_eq!(first_path, dir.path().join("quicknotes.txt"));
        assert_eq!(second_path, dir.path().join("quicknotes (1).txt"));
        assert_eq!(std::fs::read_to_string(first_path).expect("read"), "one");
        assert_eq!(std::fs::read_to_string(second_path).expect("read"), "two");
    }
}
