//! In-memory document view for tests and offline runs.
//!
//! A fixture is a flat list of elements, each tagged with the selectors it
//! answers to, plus named scroll containers that clamp like a browser does.

use std::cell::RefCell;
use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use super::{DocumentView, ElementHandle, ElementInfo, MediaSource, Rect, ScrollMetrics};
use crate::{Error, Result};

/// A fake element with the selectors it matches and its renderable content
#[derive(Debug, Clone)]
pub struct FixtureElement {
    pub info: ElementInfo,
    pub selectors: Vec<String>,
    pub pixels: Option<RgbaImage>,
    pub markup: Option<String>,
}

impl FixtureElement {
    /// A `<canvas>` matched by `selector` with a solid backing store
    pub fn canvas(id: &str, selector: &str, rect: Rect, width: u32, height: u32) -> Self {
        Self {
            info: ElementInfo {
                handle: ElementHandle::new(id),
                src: None,
                width,
                height,
                natural_width: width,
                natural_height: height,
                rect,
            },
            selectors: vec![selector.to_string()],
            pixels: Some(RgbaImage::from_pixel(width, height, Rgba([240, 240, 240, 255]))),
            markup: None,
        }
    }

    /// An `<img>` with the given `src`, laid out at `width` x `height`
    pub fn image(id: &str, src: &str, rect: Rect, width: u32, height: u32) -> Self {
        Self {
            info: ElementInfo {
                handle: ElementHandle::new(id),
                src: Some(src.to_string()),
                width,
                height,
                natural_width: width,
                natural_height: height,
                rect,
            },
            selectors: vec!["img".to_string()],
            pixels: Some(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))),
            markup: None,
        }
    }

    /// An inline `svg.kix-page`
    pub fn vector_page(id: &str, rect: Rect, width: u32, height: u32) -> Self {
        Self {
            info: ElementInfo {
                handle: ElementHandle::new(id),
                src: None,
                width,
                height,
                natural_width: width,
                natural_height: height,
                rect,
            },
            selectors: vec!["svg.kix-page".to_string()],
            pixels: None,
            markup: Some(format!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}"></svg>"#,
                width, height
            )),
        }
    }

    /// Also match `selector`
    pub fn matching(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    /// Replace the intrinsic bitmap size (e.g. a hi-dpi image shown smaller)
    pub fn with_natural_size(mut self, width: u32, height: u32) -> Self {
        self.info.natural_width = width;
        self.info.natural_height = height;
        self.pixels = Some(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])));
        self
    }
}

#[derive(Debug, Clone)]
struct FixtureContainer {
    metrics: ScrollMetrics,
    /// How much `scroll_height` grows after every scroll (lazy loading)
    growth: f64,
}

/// Selector of the document root every fixture starts with
const ROOT: &str = "html";

/// Deterministic `DocumentView` backed by plain data.
///
/// A fresh view has a non-scrolling `html` root as tall as the viewport;
/// `with_container("html", ..)` replaces it.
#[derive(Debug, Default)]
pub struct FixtureView {
    title: String,
    url: String,
    viewport_height: f64,
    elements: Vec<FixtureElement>,
    containers: HashMap<String, FixtureContainer>,
    media: Vec<MediaSource>,
    requests: RefCell<Vec<String>>,
    scroll_log: Vec<(String, f64)>,
    fail_vector_decode: bool,
}

impl FixtureView {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            url: "https://docs.google.com/document/d/fixture/view".to_string(),
            ..Default::default()
        }
        .with_viewport_height(720.0)
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    /// Resize the viewport; a root that does not scroll is resized with it
    pub fn with_viewport_height(mut self, height: f64) -> Self {
        self.viewport_height = height;
        let fits = self
            .containers
            .get(ROOT)
            .map_or(true, |c| !c.metrics.is_scrollable());
        if fits {
            self = self.with_container(ROOT, height, height);
        }
        self
    }

    pub fn with_element(mut self, element: FixtureElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Register a scroll container answering to `selector`
    pub fn with_container(mut self, selector: &str, scroll_height: f64, client_height: f64) -> Self {
        self.containers.insert(
            selector.to_string(),
            FixtureContainer {
                metrics: ScrollMetrics {
                    scroll_top: 0.0,
                    scroll_height,
                    client_height,
                },
                growth: 0.0,
            },
        );
        self
    }

    /// Make a container grow by `growth` pixels every time it is scrolled
    pub fn with_growth(mut self, selector: &str, growth: f64) -> Self {
        if let Some(c) = self.containers.get_mut(selector) {
            c.growth = growth;
        }
        self
    }

    pub fn with_media(mut self, source: MediaSource) -> Self {
        self.media.push(source);
        self
    }

    pub fn with_failing_vector_decode(mut self) -> Self {
        self.fail_vector_decode = true;
        self
    }

    /// Queue a network request URL for `drain_requests`
    pub fn push_request(&self, url: &str) {
        self.requests.borrow_mut().push(url.to_string());
    }

    /// Every `set_scroll_top` call as `(selector, requested top)`
    pub fn scroll_log(&self) -> &[(String, f64)] {
        &self.scroll_log
    }

    fn element(&self, handle: &ElementHandle) -> Result<&FixtureElement> {
        self.elements
            .iter()
            .find(|e| &e.info.handle == handle)
            .ok_or_else(|| Error::RenderError(format!("element {} is no longer in the document", handle)))
    }
}

impl DocumentView for FixtureView {
    fn title(&self) -> Result<String> {
        Ok(self.title.clone())
    }

    fn url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    fn viewport_height(&self) -> Result<f64> {
        Ok(self.viewport_height)
    }

    fn collect(&self, selector: &str) -> Result<Vec<ElementInfo>> {
        Ok(self
            .elements
            .iter()
            .filter(|e| e.selectors.iter().any(|s| s == selector))
            .map(|e| e.info.clone())
            .collect())
    }

    fn scroll_metrics(&self, selector: &str) -> Result<Option<ScrollMetrics>> {
        Ok(self.containers.get(selector).map(|c| c.metrics))
    }

    fn set_scroll_top(&mut self, selector: &str, top: f64) -> Result<ScrollMetrics> {
        self.scroll_log.push((selector.to_string(), top));
        let container = self
            .containers
            .get_mut(selector)
            .ok_or_else(|| Error::ScriptError(format!("no scroll container matches {}", selector)))?;
        let m = &mut container.metrics;
        m.scroll_top = top.clamp(0.0, m.max_scroll());
        if top > 0.0 {
            m.scroll_height += container.growth;
        }
        Ok(*m)
    }

    fn read_pixels(&self, handle: &ElementHandle) -> Result<RgbaImage> {
        self.element(handle)?
            .pixels
            .clone()
            .ok_or_else(|| Error::RenderError(format!("element {} has no bitmap", handle)))
    }

    fn serialize_vector(&self, handle: &ElementHandle) -> Result<String> {
        self.element(handle)?
            .markup
            .clone()
            .ok_or_else(|| Error::RenderError(format!("element {} is not a vector page", handle)))
    }

    fn decode_vector(&self, markup: &str, width: u32, height: u32) -> Result<RgbaImage> {
        if self.fail_vector_decode || !markup.starts_with("<svg") {
            return Err(Error::RenderError("vector page failed to decode".into()));
        }
        Ok(RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])))
    }

    fn media_sources(&self) -> Result<Vec<MediaSource>> {
        Ok(self.media.clone())
    }

    fn drain_requests(&self) -> Vec<String> {
        std::mem::take(&mut *self.requests.borrow_mut())
    }
}
