//! drivecap
//!
//! Export view-only Google Drive documents from a headless browser.
//!
//! A capture session opens a Docs, Slides or Drive file viewer, scrolls it so
//! every page is rendered, and turns the rendered pages into a PDF, a ZIP of
//! PNG pages, or individual PNG files. It also reports the direct media URLs
//! seen from Drive's video player.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives headless Chrome over the DevTools Protocol
//! - **Fixture Backend**: an in-memory document for tests and offline runs
//! - **Async Facade**: `Exporter` runs a session on a worker thread
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # async fn run() -> drivecap::Result<()> {
//! use drivecap::{ExportOptions, SessionConfig};
//!
//! let exporter = drivecap::launch(
//!     "https://docs.google.com/document/d/abc/view",
//!     SessionConfig::default(),
//! )
//! .await?;
//! let reply = exporter.download_pdf(ExportOptions::default()).await?;
//! println!("success: {}", reply.success);
//! exporter.close().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod clock;
pub mod detect;
pub mod encode;
pub mod export;
pub mod media;
pub mod naming;
pub mod progress;
pub mod protocol;
pub mod scroll;
pub mod session;
pub mod view;

// Async facade over a worker-owned session
pub mod async_api;

pub use async_api::Exporter;
#[cfg(feature = "cdp")]
pub use async_api::launch;
pub use clock::{Clock, ManualClock, SystemClock};
pub use export::{ExportKind, ExportOptions, JobReport};
pub use progress::ProgressEvent;
pub use protocol::{ExportResponse, Request, Response};
pub use scroll::ScrollConfig;
pub use session::CaptureSession;
pub use view::DocumentView;

/// Configuration for a capture session
///
/// The defaults match the Drive viewer's own pacing: a 150 ms scroll
/// interval, a 60 s cap on scrolling and a short pause between pages.
///
/// # Examples
///
/// ```
/// let cfg = drivecap::SessionConfig::default();
/// assert_eq!(cfg.scroll.max_duration_ms, 60_000);
/// assert!(cfg.headless);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// User agent string to send with requests
    pub user_agent: String,
    /// Browser window size
    pub viewport: Viewport,
    /// Timeout for page loads in milliseconds
    pub timeout_ms: u64,
    /// Chrome binary; `None` lets the launcher search for one
    pub chrome_path: Option<PathBuf>,
    /// Run Chrome without a window
    pub headless: bool,
    /// Wait after navigation before the viewer is considered ready
    pub settle_after_load_ms: u64,
    /// Auto-scroll tuning
    pub scroll: ScrollConfig,
    /// Pause after each page appended to an encoder
    pub page_yield_ms: u64,
    /// Pause between two saved images
    pub image_save_delay_ms: u64,
    /// Upper bound on decoding one vector page
    pub vector_decode_timeout_ms: u64,
    /// Where `DirectorySink` writes artifacts
    pub output_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            viewport: Viewport::default(),
            timeout_ms: 30000,
            chrome_path: None,
            headless: true,
            settle_after_load_ms: 500,
            scroll: ScrollConfig::default(),
            page_yield_ms: 10,
            image_save_delay_ms: 300,
            vector_decode_timeout_ms: 15000,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
        assert_eq!(config.page_yield_ms, 10);
        assert_eq!(config.image_save_delay_ms, 300);
        assert_eq!(config.scroll.interval_ms, 150);
    }

    #[test]
    fn test_viewport() {
        let viewport = Viewport {
            width: 1920,
            height: 1080,
        };
        assert_eq!(viewport.width, 1920);
        assert_eq!(viewport.height, 1080);
    }
}
