//! Capture orchestrator: one user-triggered export from start to artifact.
//!
//! A job loads its encoder, optionally scrolls the document, discovers the
//! pages, then converts and appends them strictly one after another before
//! finalizing. Any error ends the job and nothing is written.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Deserialize;

use crate::capture::{convert_to_bitmap, discover_pages};
use crate::clock::Clock;
use crate::encode::{
    acquire_encoder, encode_png, page_entry_name, Acquisition, BuiltinEncoders, EncoderFormat,
    EncoderSource,
};
use crate::naming::{pdf_file_name, zip_file_name};
use crate::progress::ProgressReporter;
use crate::protocol::ExportResponse;
use crate::scroll::run_auto_scroll;
use crate::view::DocumentView;
use crate::{Error, Result, SessionConfig};

/// JPEG quality of PDF pages
pub const PDF_QUALITY: u8 = 92;
pub const PDF_QUALITY_HIGH_RES: u8 = 100;

fn default_true() -> bool {
    true
}

/// User options of one export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Render pages at twice their source size (PDF only)
    #[serde(default)]
    pub high_res: bool,
    /// Scroll through the document first so every page is rendered
    #[serde(default = "default_true")]
    pub auto_scroll: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            high_res: false,
            auto_scroll: true,
        }
    }
}

impl ExportOptions {
    pub fn scale_factor(&self) -> u32 {
        if self.high_res {
            2
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// One PDF with a page per discovered element
    Pdf,
    /// One ZIP of PNG pages
    Zip,
    /// Each page saved as its own PNG
    Images,
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportKind::Pdf => "PDF",
            ExportKind::Zip => "ZIP",
            ExportKind::Images => "image",
        })
    }
}

/// Download collaborator: receives finished files
pub trait ArtifactSink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes artifacts into a directory, creating it on first use
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectorySink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)?;
        info!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

/// Keeps artifacts in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved files as `(name, bytes)`, in save order
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.files().into_iter().map(|(n, _)| n).collect()
    }
}

impl ArtifactSink for MemorySink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((file_name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Primary encoder source plus the one tried when it fails
pub struct EncoderSources {
    primary: Box<dyn EncoderSource>,
    fallback: Option<Box<dyn EncoderSource>>,
}

impl EncoderSources {
    pub fn new(primary: Box<dyn EncoderSource>, fallback: Option<Box<dyn EncoderSource>>) -> Self {
        Self { primary, fallback }
    }

    pub fn acquire(&self, format: EncoderFormat) -> Acquisition {
        acquire_encoder(format, self.primary.as_ref(), self.fallback.as_deref())
    }
}

impl Default for EncoderSources {
    fn default() -> Self {
        Self::new(Box::new(BuiltinEncoders), None)
    }
}

/// What a successful job produced
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMeta {
    pub files: Vec<String>,
    pub bytes: usize,
    /// Pages written
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Success(ArtifactMeta),
    Failure(String),
}

/// Outcome plus every progress percentage the job reported
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub kind: ExportKind,
    pub outcome: ExportOutcome,
    pub progress: Vec<u8>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExportOutcome::Success(_))
    }

    /// PDF replies carry no count; ZIP and image replies do.
    pub fn to_response(&self) -> ExportResponse {
        match &self.outcome {
            ExportOutcome::Success(meta) => match self.kind {
                ExportKind::Pdf => ExportResponse::ok(None),
                ExportKind::Zip | ExportKind::Images => ExportResponse::ok(Some(meta.count)),
            },
            ExportOutcome::Failure(reason) => ExportResponse::failed(reason.clone()),
        }
    }
}

/// One export run against one document view
pub struct ExportJob<'a, C: Clock + ?Sized> {
    kind: ExportKind,
    options: ExportOptions,
    clock: &'a C,
    encoders: &'a EncoderSources,
    config: &'a SessionConfig,
    progress: ProgressReporter,
}

impl<'a, C: Clock + ?Sized> ExportJob<'a, C> {
    pub fn new(
        kind: ExportKind,
        options: ExportOptions,
        clock: &'a C,
        encoders: &'a EncoderSources,
        config: &'a SessionConfig,
        progress: ProgressReporter,
    ) -> Self {
        Self {
            kind,
            options,
            clock,
            encoders,
            config,
            progress,
        }
    }

    /// Run to completion. Errors are caught here and become a failed outcome.
    pub fn run<V: DocumentView + ?Sized>(mut self, view: &mut V, sink: &mut dyn ArtifactSink) -> JobReport {
        debug!("starting {} export with {:?}", self.kind, self.options);
        let result = match self.kind {
            ExportKind::Pdf | ExportKind::Zip => self.encode_pages(view, sink),
            ExportKind::Images => self.extract_images(view, sink),
        };
        let outcome = match result {
            Ok(meta) => {
                info!("{} export finished: {} page(s), {} bytes", self.kind, meta.count, meta.bytes);
                ExportOutcome::Success(meta)
            }
            Err(e) => {
                error!("{} export failed: {}", self.kind, e);
                ExportOutcome::Failure(e.to_string())
            }
        };
        JobReport {
            kind: self.kind,
            outcome,
            progress: self.progress.history().to_vec(),
        }
    }

    fn encode_pages<V: DocumentView + ?Sized>(
        &mut self,
        view: &mut V,
        sink: &mut dyn ArtifactSink,
    ) -> Result<ArtifactMeta> {
        let (format, scale) = match self.kind {
            ExportKind::Pdf => {
                let jpeg_quality = if self.options.high_res {
                    PDF_QUALITY_HIGH_RES
                } else {
                    PDF_QUALITY
                };
                (EncoderFormat::Pdf { jpeg_quality }, self.options.scale_factor())
            }
            _ => (EncoderFormat::Archive, 1),
        };

        self.progress.report(5.0, format!("Loading {} encoder...", self.kind));
        let mut encoder = self.encoders.acquire(format).into_result()?;

        if self.options.auto_scroll {
            run_auto_scroll(view, self.clock, &mut self.progress, &self.config.scroll)?;
        }

        self.progress.report(20.0, "Finding document pages...");
        let pages = discover_pages(&*view)?;
        if pages.is_empty() {
            return Err(Error::NoPagesFound);
        }
        let total = pages.len();
        self.progress
            .report(25.0, format!("Found {} pages. Creating {}...", total, self.kind));

        let page_yield = Duration::from_millis(self.config.page_yield_ms);
        for (i, element) in pages.iter().enumerate() {
            self.progress.report(
                25.0 + (i as f64 / total as f64 * 65.0).floor(),
                format!("Processing page {} of {}...", i + 1, total),
            );
            let page = convert_to_bitmap(&*view, element, i, scale)?;
            encoder.append(&page)?;
            self.clock.sleep(page_yield);
        }

        self.progress.report(95.0, "Preparing download...");
        debug!("finalizing {} page(s)", encoder.len());
        let artifact = encoder.finalize()?;
        debug!(
            "{} artifact: {} entries, {} bytes",
            artifact.mime,
            artifact.entries,
            artifact.bytes.len()
        );
        let title = document_title(&*view);
        let file_name = match self.kind {
            ExportKind::Pdf => pdf_file_name(&title, self.options.high_res),
            _ => zip_file_name(&title),
        };
        sink.save(&file_name, &artifact.bytes)?;
        self.progress.report(100.0, "Download complete!");

        Ok(ArtifactMeta {
            files: vec![file_name],
            bytes: artifact.bytes.len(),
            count: artifact.entries,
        })
    }

    /// Every page as its own PNG at source size, no encoder and no scrolling.
    fn extract_images<V: DocumentView + ?Sized>(
        &mut self,
        view: &mut V,
        sink: &mut dyn ArtifactSink,
    ) -> Result<ArtifactMeta> {
        self.progress.report(10.0, "Finding document pages...");
        let pages = discover_pages(&*view)?;
        if pages.is_empty() {
            return Err(Error::NoPagesFound);
        }
        let total = pages.len();
        self.progress
            .report(20.0, format!("Found {} pages. Extracting...", total));

        // Encode everything before saving anything.
        let mut encoded = Vec::with_capacity(total);
        for (i, element) in pages.iter().enumerate() {
            self.progress.report(
                20.0 + (i as f64 / total as f64 * 75.0).floor(),
                format!("Extracting image {} of {}...", i + 1, total),
            );
            let page = convert_to_bitmap(&*view, element, i, 1)?;
            encoded.push((page_entry_name(i), encode_png(&page.image)?));
        }

        let delay = Duration::from_millis(self.config.image_save_delay_ms);
        let mut files = Vec::with_capacity(total);
        let mut bytes = 0;
        for (name, png) in encoded {
            sink.save(&name, &png)?;
            bytes += png.len();
            files.push(name);
            self.clock.sleep(delay);
        }

        self.progress.report(100.0, "Extraction complete!");
        Ok(ArtifactMeta {
            files,
            bytes,
            count: total,
        })
    }
}

fn document_title<V: DocumentView + ?Sized>(view: &V) -> String {
    view.title().unwrap_or_else(|e| {
        warn!("could not read document title, using a generic name: {}", e);
        String::new()
    })
}
