//! Page capture engine: find the rendered pages of a document viewer and
//! turn each one into a bitmap.
//!
//! Discovery is a heuristic over three kinds of page rendering that Drive
//! viewers use. Candidates are merged, deduplicated by rounded position and
//! ordered top to bottom; that order is the page order of the export.

use std::collections::HashSet;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, trace};

use crate::view::{DocumentView, ElementHandle, ElementInfo, Rect};
use crate::{Error, Result};

/// Elements at or below this size on either axis are UI chrome, not pages.
pub const MIN_PAGE_SIZE: u32 = 100;

/// Selector for raster page candidates (further filtered on `blob:` sources)
pub const RASTER_SELECTOR: &str = "img";

/// Selector for inline vector page renderings
pub const VECTOR_SELECTOR: &str = "svg.kix-page";

/// Canvas selectors, probed in this order.
pub const CANVAS_SELECTORS: &[&str] = &[
    // Docs
    ".kix-canvas-tile-content canvas",
    ".kix-page-paginated canvas",
    ".kix-page canvas",
    // Slides
    ".punch-viewer-content canvas",
    ".slide-content canvas",
    ".punch-present-iframe canvas",
    // Drive PDF viewer
    ".ndfHFb-c4YZDc-Wrber canvas",
    ".drive-viewer-paginated-page canvas",
    ".drive-viewer-page-content canvas",
    // Generic page-numbered layouts
    "canvas[data-page]",
    "canvas[data-page-number]",
    "[data-page-number] canvas",
    ".pdf-viewer canvas",
    // Previews
    ".drive-viewer-content canvas",
    ".preview-pane canvas",
];

/// How a page is rendered in the host document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `<img>` with a `blob:` source
    RasterImage,
    /// `<canvas>` tile or page surface
    CanvasSurface,
    /// Inline `<svg>` page
    VectorGraphic,
}

/// A page discovered in one capture pass
#[derive(Debug, Clone, PartialEq)]
pub struct PageElement {
    pub kind: ElementKind,
    pub handle: ElementHandle,
    /// Bounding box at discovery time, only used for dedup and ordering
    pub position: Rect,
    /// Size the bitmap is rendered from before scaling
    pub source_width: u32,
    pub source_height: u32,
}

impl PageElement {
    fn from_info(kind: ElementKind, info: ElementInfo) -> Self {
        let (source_width, source_height) = match kind {
            ElementKind::RasterImage | ElementKind::CanvasSurface => {
                (nonzero_or(info.natural_width, info.width), nonzero_or(info.natural_height, info.height))
            }
            ElementKind::VectorGraphic => (info.width, info.height),
        };
        Self {
            kind,
            handle: info.handle,
            position: info.rect,
            source_width,
            source_height,
        }
    }

    /// Dedup key: rounded `(top, left)`
    pub fn position_key(&self) -> (i64, i64) {
        (js_round(self.position.top), js_round(self.position.left))
    }
}

fn nonzero_or(value: u32, fallback: u32) -> u32 {
    if value == 0 {
        fallback
    } else {
        value
    }
}

/// `Math.round`: halves round toward positive infinity.
fn js_round(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// The bitmap of one page, owned by the export job until it is encoded
#[derive(Debug, Clone)]
pub struct CapturedPage {
    /// Zero-based position in the export
    pub index: usize,
    pub image: RgbaImage,
}

impl CapturedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Discover the pages currently rendered in `view`.
///
/// Returns a fresh snapshot on every call. An empty result is not an error
/// here; the orchestrator decides what to do with it.
pub fn discover_pages<V: DocumentView + ?Sized>(view: &V) -> Result<Vec<PageElement>> {
    let mut candidates = Vec::new();

    for info in view.collect(RASTER_SELECTOR)? {
        let is_blob = info.src.as_deref().is_some_and(|s| s.starts_with("blob:"));
        if is_blob && info.width > MIN_PAGE_SIZE && info.height > MIN_PAGE_SIZE {
            candidates.push(PageElement::from_info(ElementKind::RasterImage, info));
        }
    }

    for selector in CANVAS_SELECTORS {
        for info in view.collect(selector)? {
            if info.width > MIN_PAGE_SIZE && info.height > MIN_PAGE_SIZE {
                candidates.push(PageElement::from_info(ElementKind::CanvasSurface, info));
            }
        }
    }

    for info in view.collect(VECTOR_SELECTOR)? {
        if info.width > MIN_PAGE_SIZE {
            candidates.push(PageElement::from_info(ElementKind::VectorGraphic, info));
        }
    }

    let found = candidates.len();
    let mut pages = dedup_by_position(candidates);
    sort_by_top(&mut pages);
    debug!("discovered {} page(s) from {} candidate(s)", pages.len(), found);
    Ok(pages)
}

/// Keep the first element per rounded `(top, left)` key.
///
/// Candidates arrive raster first, then canvas, then vector, so on a
/// collision between kinds the earlier kind wins.
pub fn dedup_by_position(candidates: Vec<PageElement>) -> Vec<PageElement> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            let fresh = seen.insert(c.position_key());
            if !fresh {
                trace!("dropping duplicate {:?} at {:?}", c.kind, c.position_key());
            }
            fresh
        })
        .collect()
}

/// Stable sort ascending by `top`.
pub fn sort_by_top(pages: &mut [PageElement]) {
    pages.sort_by(|a, b| a.position.top.total_cmp(&b.position.top));
}

/// Render one page element into a bitmap `scale` times its source size.
pub fn convert_to_bitmap<V: DocumentView + ?Sized>(
    view: &V,
    element: &PageElement,
    index: usize,
    scale: u32,
) -> Result<CapturedPage> {
    if scale == 0 {
        return Err(Error::ConfigError("scale factor must be at least 1".into()));
    }
    let width = element.source_width.saturating_mul(scale);
    let height = element.source_height.saturating_mul(scale);
    if width == 0 || height == 0 {
        return Err(Error::RenderError(format!(
            "page {} has an empty bitmap ({}x{})",
            element.handle, width, height
        )));
    }

    let image = match element.kind {
        ElementKind::RasterImage | ElementKind::CanvasSurface => {
            let source = view.read_pixels(&element.handle)?;
            if source.dimensions() == (width, height) {
                source
            } else {
                imageops::resize(&source, width, height, FilterType::Lanczos3)
            }
        }
        ElementKind::VectorGraphic => {
            let markup = view.serialize_vector(&element.handle)?;
            view.decode_vector(&markup, width, height)?
        }
    };

    Ok(CapturedPage { index, image })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{FixtureElement, FixtureView};

    fn el(kind: ElementKind, id: &str, top: f64, left: f64) -> PageElement {
        PageElement {
            kind,
            handle: ElementHandle::new(id),
            position: Rect::new(top, left, 800.0, 1000.0),
            source_width: 800,
            source_height: 1000,
        }
    }

    #[test]
    fn js_round_matches_math_round() {
        assert_eq!(js_round(2.5), 3);
        assert_eq!(js_round(2.49), 2);
        assert_eq!(js_round(-0.5), 0);
        assert_eq!(js_round(-1.5), -1);
    }

    #[test]
    fn dedup_keeps_first_of_each_key() {
        let out = dedup_by_position(vec![
            el(ElementKind::RasterImage, "img", 10.2, 5.0),
            el(ElementKind::CanvasSurface, "canvas", 9.6, 4.8),
            el(ElementKind::CanvasSurface, "other", 1200.0, 5.0),
        ]);
        let ids: Vec<_> = out.iter().map(|p| p.handle.as_str()).collect();
        assert_eq!(ids, vec!["img", "other"]);
    }

    #[test]
    fn sort_is_by_top_and_stable() {
        let mut pages = vec![
            el(ElementKind::CanvasSurface, "c", 2000.0, 0.0),
            el(ElementKind::CanvasSurface, "a", 0.0, 0.0),
            el(ElementKind::CanvasSurface, "b1", 1000.0, 0.0),
            el(ElementKind::CanvasSurface, "b2", 1000.0, 900.0),
        ];
        sort_by_top(&mut pages);
        let ids: Vec<_> = pages.iter().map(|p| p.handle.as_str()).collect();
        assert_eq!(ids, vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn discovery_filters_small_and_non_blob_images() {
        let view = FixtureView::new("doc")
            .with_element(FixtureElement::image("logo", "https://x/logo.png", Rect::new(0.0, 0.0, 400.0, 400.0), 400, 400))
            .with_element(FixtureElement::image("icon", "blob:https://x/1", Rect::new(5.0, 0.0, 64.0, 64.0), 64, 64))
            .with_element(FixtureElement::image("page", "blob:https://x/2", Rect::new(100.0, 0.0, 800.0, 1000.0), 800, 1000))
            .with_element(FixtureElement::canvas("thin", ".kix-page canvas", Rect::new(50.0, 0.0, 800.0, 100.0), 800, 100));
        let pages = discover_pages(&view).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].handle.as_str(), "page");
        assert_eq!(pages[0].kind, ElementKind::RasterImage);
    }

    #[test]
    fn canvas_matched_by_two_selectors_is_counted_once() {
        let view = FixtureView::new("doc").with_element(
            FixtureElement::canvas("p1", ".kix-page canvas", Rect::new(0.0, 0.0, 800.0, 1000.0), 800, 1000)
                .matching(".kix-page-paginated canvas"),
        );
        assert_eq!(discover_pages(&view).unwrap().len(), 1);
    }

    #[test]
    fn convert_scales_raster_from_natural_size() {
        let view = FixtureView::new("doc").with_element(
            FixtureElement::image("p", "blob:x", Rect::new(0.0, 0.0, 400.0, 500.0), 400, 500)
                .with_natural_size(200, 250),
        );
        let pages = discover_pages(&view).unwrap();
        let page = convert_to_bitmap(&view, &pages[0], 0, 2).unwrap();
        assert_eq!((page.width(), page.height()), (400, 500));
    }

    #[test]
    fn convert_vector_uses_client_size() {
        let view = FixtureView::new("doc")
            .with_element(FixtureElement::vector_page("v", Rect::new(0.0, 0.0, 816.0, 1056.0), 816, 1056));
        let pages = discover_pages(&view).unwrap();
        let page = convert_to_bitmap(&view, &pages[0], 3, 1).unwrap();
        assert_eq!(page.index, 3);
        assert_eq!((page.width(), page.height()), (816, 1056));
    }

    #[test]
    fn convert_rejects_zero_scale() {
        let view = FixtureView::new("doc");
        let page = el(ElementKind::CanvasSurface, "c", 0.0, 0.0);
        assert!(matches!(convert_to_bitmap(&view, &page, 0, 0), Err(Error::ConfigError(_))));
    }
}
