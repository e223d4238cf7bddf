//! The host document seam.
//!
//! A `DocumentView` is whatever renders the Drive viewer: a live Chrome tab
//! driven over CDP, or an in-memory fixture. The capture engine, scroll
//! driver and orchestrator only ever talk to this trait.

use image::RgbaImage;
use serde::Deserialize;

use crate::Result;

#[cfg(feature = "cdp")]
pub mod cdp;
pub mod fixture;

#[cfg(feature = "cdp")]
pub use cdp::CdpView;
pub use fixture::{FixtureElement, FixtureView};

/// Opaque, non-owning reference to an element in the host document.
///
/// Handles are stable: discovering the same element twice yields equal handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Screen-space bounding box as reported by `getBoundingClientRect`
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }
}

/// One element matched by a selector, with the sizes discovery filters on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub handle: ElementHandle,
    /// `src` attribute for images, absent for canvases and vector pages
    #[serde(default)]
    pub src: Option<String>,
    /// Layout size (`img.width`, `canvas.width`, `svg.clientWidth`)
    pub width: u32,
    pub height: u32,
    /// Intrinsic bitmap size (`naturalWidth` for images, backing store for canvases)
    pub natural_width: u32,
    pub natural_height: u32,
    pub rect: Rect,
}

/// Scroll geometry of a container element
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    /// Largest reachable `scroll_top`
    pub fn max_scroll(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    pub fn is_scrollable(&self) -> bool {
        self.scroll_height > self.client_height
    }
}

/// A media URL found on a `<video>` element or one of its `<source>` children
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSource {
    pub src: String,
    /// `type` attribute of a `<source>` element
    #[serde(default)]
    pub mime: Option<String>,
    /// True when the URL came from a `<source>` child rather than `video.src`
    #[serde(default)]
    pub from_source_element: bool,
}

/// Access to a rendered document viewer.
pub trait DocumentView {
    /// Document title as shown in the tab
    fn title(&self) -> Result<String>;

    /// Current URL of the view
    fn url(&self) -> Result<String>;

    /// Height of the visible window (`window.innerHeight`)
    fn viewport_height(&self) -> Result<f64>;

    /// All elements matching a CSS selector, in document order
    fn collect(&self, selector: &str) -> Result<Vec<ElementInfo>>;

    /// Scroll geometry of the first element matching `selector`, if any
    fn scroll_metrics(&self, selector: &str) -> Result<Option<ScrollMetrics>>;

    /// Set `scrollTop` on the container and return the geometry after the
    /// browser clamps it.
    fn set_scroll_top(&mut self, selector: &str, top: f64) -> Result<ScrollMetrics>;

    /// Pixels of a raster image or canvas at its intrinsic size
    fn read_pixels(&self, handle: &ElementHandle) -> Result<RgbaImage>;

    /// Self-contained markup of an inline vector page
    fn serialize_vector(&self, handle: &ElementHandle) -> Result<String>;

    /// Decode vector markup into a bitmap of exactly `width` x `height`.
    ///
    /// This is the one asynchronous step of conversion; implementations must
    /// bound it with their own timeout.
    fn decode_vector(&self, markup: &str, width: u32, height: u32) -> Result<RgbaImage>;

    /// Media URLs currently attached to `<video>` elements
    fn media_sources(&self) -> Result<Vec<MediaSource>>;

    /// Drain URLs of network requests observed since the last call.
    /// Views that cannot observe the network return nothing.
    fn drain_requests(&self) -> Vec<String> {
        Vec::new()
    }
}
