//! Scroll driver: walk the viewer's scroll container to the bottom so lazily
//! rendered pages materialize, then return to the top.
//!
//! The decision logic lives in `ScrollDriver`, a state machine with no clock
//! of its own. `run_auto_scroll` feeds it elapsed time from a `Clock` and
//! scroll readings from the view.
//!
//! ```text
//! Idle -> Scrolling <-> Stabilizing -> Stabilized -> ResettingToTop -> Done
//!             \______________________-> TimedOut  ---^
//! ```

use std::time::Duration;

use log::{debug, info, warn};

use crate::clock::Clock;
use crate::progress::ProgressReporter;
use crate::view::{DocumentView, ScrollMetrics};
use crate::Result;

/// Viewport containers per supported viewer, probed in order
pub const CONTAINER_SELECTORS: &[&str] = &[
    ".kix-appview-editor",               // Docs
    ".punch-viewer-container",           // Slides
    ".drive-viewer-paginated-scrollable", // Drive PDF
    ".ndfHFb-c4YZDc-i5oIFb",             // PDF viewer
    "[role=\"main\"]",
    "html",
];

/// Document root, used when nothing else scrolls
pub const ROOT_SELECTOR: &str = "html";

/// Tuning for the scroll loop
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollConfig {
    /// Delay between two scroll steps
    pub interval_ms: u64,
    /// Fraction of the viewport height advanced per step
    pub step_ratio: f64,
    /// Movement below this many pixels counts as "not moving"
    pub stability_threshold_px: f64,
    /// Consecutive still readings needed to call the document loaded
    pub stable_reads: u32,
    /// Hard cap on the whole scroll phase
    pub max_duration_ms: u64,
    /// Wait after jumping back to the top so the first pages re-render
    pub settle_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 150,
            step_ratio: 0.8,
            stability_threshold_px: 10.0,
            stable_reads: 5,
            max_duration_ms: 60_000,
            settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    Idle,
    Scrolling,
    Stabilizing,
    Stabilized,
    TimedOut,
    ResettingToTop,
    Done,
}

/// Transient state of one scroll run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollState {
    pub offset: f64,
    pub last_offset: Option<f64>,
    pub stable_reads: u32,
    pub elapsed_ms: u64,
}

/// What the runner should do on this poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickAction {
    /// Move the container down by this many pixels, then `observe`
    Advance(f64),
    /// The deadline passed
    Expired,
}

#[derive(Debug, Clone)]
pub struct ScrollDriver {
    config: ScrollConfig,
    state: ScrollState,
    phase: ScrollPhase,
}

impl ScrollDriver {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            config,
            state: ScrollState::default(),
            phase: ScrollPhase::Idle,
        }
    }

    /// Leave `Idle`, starting from the container's current offset
    pub fn start(&mut self, initial_offset: f64) {
        self.state = ScrollState {
            offset: initial_offset,
            ..Default::default()
        };
        self.phase = ScrollPhase::Scrolling;
    }

    pub fn phase(&self) -> ScrollPhase {
        self.phase
    }

    pub fn state(&self) -> &ScrollState {
        &self.state
    }

    /// One poll at `elapsed` since start. Past the deadline the driver moves
    /// to `TimedOut` no matter how close it was to stabilizing.
    pub fn tick(&mut self, elapsed: Duration, viewport_height: f64) -> TickAction {
        self.state.elapsed_ms = elapsed.as_millis() as u64;
        if self.state.elapsed_ms > self.config.max_duration_ms {
            self.phase = ScrollPhase::TimedOut;
            return TickAction::Expired;
        }
        TickAction::Advance(viewport_height * self.config.step_ratio)
    }

    /// Feed the reading taken right after an advance.
    pub fn observe(&mut self, metrics: &ScrollMetrics) -> ScrollPhase {
        let current = metrics.scroll_top;
        let threshold = self.config.stability_threshold_px;
        let barely_moved = self
            .state
            .last_offset
            .is_some_and(|last| (current - last).abs() < threshold);
        let at_bottom = current >= metrics.scroll_height - metrics.client_height - threshold;

        if barely_moved || at_bottom {
            self.state.stable_reads += 1;
            self.phase = if self.state.stable_reads >= self.config.stable_reads {
                ScrollPhase::Stabilized
            } else {
                ScrollPhase::Stabilizing
            };
        } else {
            self.state.stable_reads = 0;
            self.phase = ScrollPhase::Scrolling;
        }

        self.state.last_offset = Some(current);
        self.state.offset = current;
        self.phase
    }

    pub fn begin_reset(&mut self) {
        self.phase = ScrollPhase::ResettingToTop;
        self.state.offset = 0.0;
    }

    pub fn finish(&mut self) {
        self.phase = ScrollPhase::Done;
    }

    /// Advisory job progress in 10..=20 for a reading
    pub fn progress(metrics: &ScrollMetrics) -> f64 {
        10.0 + scrolled_fraction(metrics) * 10.0
    }
}

fn scrolled_fraction(metrics: &ScrollMetrics) -> f64 {
    let max = metrics.max_scroll();
    if max <= 0.0 {
        1.0
    } else {
        (metrics.scroll_top / max).clamp(0.0, 1.0)
    }
}

/// Result of one auto-scroll run
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollOutcome {
    /// `Stabilized` or `TimedOut`
    pub terminal: ScrollPhase,
    /// Time from start until the terminal state, excluding the reset
    pub elapsed: Duration,
    pub ticks: u32,
    pub container: String,
}

/// Pick the first known container that can actually scroll.
pub fn select_container<V: DocumentView + ?Sized>(view: &V) -> Result<String> {
    for selector in CONTAINER_SELECTORS {
        if let Some(metrics) = view.scroll_metrics(selector)? {
            if metrics.is_scrollable() {
                return Ok((*selector).to_string());
            }
        }
    }
    Ok(ROOT_SELECTOR.to_string())
}

/// Scroll the document to the bottom until it stops moving or the deadline
/// passes, then jump back to the top and wait for it to settle.
pub fn run_auto_scroll<V, C>(
    view: &mut V,
    clock: &C,
    progress: &mut ProgressReporter,
    config: &ScrollConfig,
) -> Result<ScrollOutcome>
where
    V: DocumentView + ?Sized,
    C: Clock + ?Sized,
{
    let container = select_container(view)?;
    let viewport_height = view.viewport_height()?;
    let initial = view
        .scroll_metrics(&container)?
        .map(|m| m.scroll_top)
        .unwrap_or(0.0);
    debug!("auto-scrolling {} (viewport {}px)", container, viewport_height);

    let started = clock.elapsed();
    let mut driver = ScrollDriver::new(config.clone());
    driver.start(initial);
    progress.report(10.0, "Scrolling to load all pages...");

    let interval = Duration::from_millis(config.interval_ms);
    let mut ticks = 0u32;
    let terminal = loop {
        clock.sleep(interval);
        ticks += 1;
        let elapsed = clock.elapsed().saturating_sub(started);
        match driver.tick(elapsed, viewport_height) {
            TickAction::Expired => break ScrollPhase::TimedOut,
            TickAction::Advance(by) => {
                let target = driver.state().offset + by;
                let metrics = view.set_scroll_top(&container, target)?;
                if driver.observe(&metrics) == ScrollPhase::Stabilized {
                    break ScrollPhase::Stabilized;
                }
                progress.report(
                    ScrollDriver::progress(&metrics),
                    format!("Scrolling... {}%", (scrolled_fraction(&metrics) * 100.0).round()),
                );
            }
        }
    };

    let elapsed = Duration::from_millis(driver.state().elapsed_ms);
    match terminal {
        ScrollPhase::TimedOut => warn!("document never settled, giving up after {:?}", elapsed),
        _ => info!("document settled after {} scroll step(s)", ticks),
    }

    driver.begin_reset();
    view.set_scroll_top(&container, 0.0)?;
    clock.sleep(Duration::from_millis(config.settle_ms));
    driver.finish();

    Ok(ScrollOutcome {
        terminal,
        elapsed,
        ticks,
        container,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::view::FixtureView;

    fn metrics(top: f64, height: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: top,
            scroll_height: height,
            client_height: 720.0,
        }
    }

    #[test]
    fn driver_needs_five_still_readings() {
        let mut d = ScrollDriver::new(ScrollConfig::default());
        d.start(0.0);
        assert_eq!(d.observe(&metrics(576.0, 5000.0)), ScrollPhase::Scrolling);
        for _ in 0..4 {
            assert_eq!(d.observe(&metrics(4280.0, 5000.0)), ScrollPhase::Stabilizing);
        }
        assert_eq!(d.observe(&metrics(4280.0, 5000.0)), ScrollPhase::Stabilized);
    }

    #[test]
    fn movement_resets_stability_counter() {
        let mut d = ScrollDriver::new(ScrollConfig::default());
        d.start(0.0);
        d.observe(&metrics(100.0, 50_000.0));
        d.observe(&metrics(105.0, 50_000.0));
        assert_eq!(d.state().stable_reads, 1);
        d.observe(&metrics(700.0, 50_000.0));
        assert_eq!(d.state().stable_reads, 0);
        assert_eq!(d.phase(), ScrollPhase::Scrolling);
    }

    #[test]
    fn tick_expires_only_after_deadline() {
        let mut d = ScrollDriver::new(ScrollConfig::default());
        d.start(0.0);
        assert_eq!(d.tick(Duration::from_millis(60_000), 720.0), TickAction::Advance(576.0));
        assert_eq!(d.tick(Duration::from_millis(60_001), 720.0), TickAction::Expired);
        assert_eq!(d.phase(), ScrollPhase::TimedOut);
    }

    #[test]
    fn container_falls_back_to_root() {
        let view = FixtureView::new("t").with_container(".kix-appview-editor", 700.0, 720.0);
        assert_eq!(select_container(&view).unwrap(), "html");

        let view = FixtureView::new("t")
            .with_container(".punch-viewer-container", 9000.0, 720.0)
            .with_container("html", 9000.0, 720.0);
        assert_eq!(select_container(&view).unwrap(), ".punch-viewer-container");
    }

    #[test]
    fn run_resets_to_top_after_stabilizing() {
        let mut view = FixtureView::new("t").with_container(".kix-appview-editor", 3000.0, 720.0);
        let clock = ManualClock::new();
        let mut progress = ProgressReporter::detached();
        let out = run_auto_scroll(&mut view, &clock, &mut progress, &ScrollConfig::default()).unwrap();

        assert_eq!(out.terminal, ScrollPhase::Stabilized);
        assert_eq!(out.container, ".kix-appview-editor");
        assert_eq!(view.scroll_log().last().map(|(_, top)| *top), Some(0.0));
        assert!(progress.history().iter().all(|p| (10..=20).contains(p)));
        // settle delay is part of the run
        assert_eq!(clock.elapsed(), out.elapsed + Duration::from_millis(500));
    }
}
