//! End-to-end export jobs against in-memory documents

use std::sync::{Arc, Mutex};
use std::time::Duration;

use drivecap::capture::{discover_pages, CapturedPage};
use drivecap::encode::{Artifact, BuiltinEncoders, EncoderFormat, EncoderSource, PageEncoder};
use drivecap::export::{DirectorySink, EncoderSources, ExportOutcome, MemorySink};
use drivecap::progress::ProgressReporter;
use drivecap::scroll::{run_auto_scroll, ScrollConfig, ScrollPhase};
use drivecap::view::{FixtureElement, FixtureView, Rect};
use drivecap::{CaptureSession, Clock, Error, ExportKind, ExportOptions, ManualClock, SessionConfig};

const PAGE_CANVAS: &str = ".kix-page canvas";

/// What a recording encoder saw
#[derive(Default)]
struct Log {
    widths: Vec<u32>,
    finalized: usize,
}

struct RecordingEncoder {
    log: Arc<Mutex<Log>>,
    appended: usize,
}

impl PageEncoder for RecordingEncoder {
    fn append(&mut self, page: &CapturedPage) -> drivecap::Result<()> {
        self.log.lock().unwrap().widths.push(page.width());
        self.appended += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.appended
    }

    fn finalize(self: Box<Self>) -> drivecap::Result<Artifact> {
        self.log.lock().unwrap().finalized += 1;
        Ok(Artifact {
            bytes: b"recorded".to_vec(),
            mime: "application/octet-stream",
            entries: self.appended,
        })
    }
}

struct RecordingSource(Arc<Mutex<Log>>);

impl EncoderSource for RecordingSource {
    fn name(&self) -> &str {
        "recording"
    }

    fn load(&self, _format: EncoderFormat) -> drivecap::Result<Box<dyn PageEncoder>> {
        Ok(Box::new(RecordingEncoder {
            log: Arc::clone(&self.0),
            appended: 0,
        }))
    }
}

struct OfflineSource(&'static str);

impl EncoderSource for OfflineSource {
    fn name(&self) -> &str {
        self.0
    }

    fn load(&self, _format: EncoderFormat) -> drivecap::Result<Box<dyn PageEncoder>> {
        Err(Error::LoadError("host unreachable".into()))
    }
}

fn no_scroll() -> ExportOptions {
    ExportOptions {
        high_res: false,
        auto_scroll: false,
    }
}

/// Three canvas pages, added out of vertical order, widths 801..=803 from top to bottom
fn three_page_doc() -> FixtureView {
    FixtureView::new("Quarterly Plan - Google Docs")
        .with_element(FixtureElement::canvas("c", PAGE_CANVAS, Rect::new(2200.0, 40.0, 803.0, 1000.0), 803, 1000))
        .with_element(FixtureElement::canvas("a", PAGE_CANVAS, Rect::new(100.0, 40.0, 801.0, 1000.0), 801, 1000))
        .with_element(FixtureElement::canvas("b", PAGE_CANVAS, Rect::new(1150.0, 40.0, 802.0, 1000.0), 802, 1000))
}

fn recording_session(view: FixtureView) -> (CaptureSession<FixtureView, ManualClock>, Arc<Mutex<Log>>, MemorySink) {
    let log = Arc::new(Mutex::new(Log::default()));
    let sink = MemorySink::new();
    let session = CaptureSession::with_clock(view, ManualClock::new(), SessionConfig::default())
        .with_encoders(EncoderSources::new(Box::new(RecordingSource(Arc::clone(&log))), None))
        .with_sink(Box::new(sink.clone()));
    (session, log, sink)
}

#[test]
fn pages_are_appended_top_to_bottom() {
    let (mut session, log, sink) = recording_session(three_page_doc());
    let resp = session.download_zip(no_scroll());

    assert!(resp.success, "{:?}", resp.error);
    assert_eq!(resp.count, Some(3));
    let log = log.lock().unwrap();
    assert_eq!(log.widths, vec![801, 802, 803]);
    assert_eq!(log.finalized, 1);
    assert_eq!(sink.names(), vec!["quarterly_plan_images.zip".to_string()]);
}

#[test]
fn empty_document_never_finalizes() {
    let (mut session, log, sink) = recording_session(FixtureView::new("Blank - Google Docs"));
    let report = session.export(ExportKind::Pdf, no_scroll());

    match &report.outcome {
        ExportOutcome::Failure(msg) => assert!(msg.starts_with("No document pages found")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(log.lock().unwrap().finalized, 0);
    assert!(sink.files().is_empty());
}

#[test]
fn progress_never_goes_backwards_and_ends_at_100() {
    let view = three_page_doc().with_container(".kix-appview-editor", 4000.0, 720.0);
    let (mut session, _log, _sink) = recording_session(view);
    let mut rx = session.subscribe();

    let report = session.export(ExportKind::Pdf, ExportOptions::default());
    assert!(report.is_success());
    assert!(report.progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", report.progress);
    assert_eq!(report.progress.last(), Some(&100));

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.kind, "progress");
        seen.push(event.percent);
    }
    assert_eq!(seen, report.progress);
}

#[test]
fn default_options_scroll_the_document_root() {
    let view = FixtureView::new("One Pager - Google Docs")
        .with_element(FixtureElement::canvas("p", PAGE_CANVAS, Rect::new(0.0, 40.0, 816.0, 1056.0), 816, 1056));
    let (mut session, log, sink) = recording_session(view);

    let resp = session.download_pdf(ExportOptions::default());

    assert!(resp.success, "{:?}", resp.error);
    assert_eq!(log.lock().unwrap().widths, vec![816]);
    assert_eq!(sink.names(), vec!["one_pager.pdf".to_string()]);
    let scrolled = session.view().scroll_log();
    assert!(!scrolled.is_empty());
    assert!(scrolled.iter().all(|(sel, _)| sel == "html"));
}

#[test]
fn high_res_pdf_doubles_page_size() {
    let (mut session, log, _sink) = recording_session(three_page_doc());
    let resp = session.download_pdf(ExportOptions {
        high_res: true,
        auto_scroll: false,
    });
    assert!(resp.success);
    assert_eq!(resp.count, None);
    assert_eq!(log.lock().unwrap().widths, vec![1602, 1604, 1606]);
}

#[test]
fn zip_ignores_high_res() {
    let (mut session, log, _sink) = recording_session(three_page_doc());
    session.download_zip(ExportOptions {
        high_res: true,
        auto_scroll: false,
    });
    assert_eq!(log.lock().unwrap().widths, vec![801, 802, 803]);
}

#[test]
fn scroll_that_never_settles_times_out() {
    let mut view = FixtureView::new("endless")
        .with_container(".kix-appview-editor", 100_000.0, 720.0)
        .with_growth(".kix-appview-editor", 1_000.0);
    let clock = ManualClock::new();
    let mut progress = ProgressReporter::detached();

    let out = run_auto_scroll(&mut view, &clock, &mut progress, &ScrollConfig::default()).unwrap();

    assert_eq!(out.terminal, ScrollPhase::TimedOut);
    assert!(
        (60_000..=60_150).contains(&(out.elapsed.as_millis() as u64)),
        "elapsed {:?}",
        out.elapsed
    );
    assert_eq!(view.scroll_log().last().map(|(_, top)| *top), Some(0.0));
}

#[test]
fn scroll_settles_at_the_bottom() {
    let mut view = FixtureView::new("short").with_container(".kix-appview-editor", 2_000.0, 720.0);
    let clock = ManualClock::new();
    let mut progress = ProgressReporter::detached();

    let out = run_auto_scroll(&mut view, &clock, &mut progress, &ScrollConfig::default()).unwrap();

    assert_eq!(out.terminal, ScrollPhase::Stabilized);
    // the third 576px step reaches the bottom; four more readings settle it
    assert!(out.ticks <= 8, "ticks {}", out.ticks);
    assert!(clock.elapsed() < Duration::from_secs(2));
}

#[test]
fn discovery_is_repeatable() {
    let view = three_page_doc()
        .with_element(FixtureElement::image("i", "blob:https://docs.google.com/1", Rect::new(100.4, 40.2, 801.0, 1000.0), 801, 1000));
    let first = discover_pages(&view).unwrap();
    let second = discover_pages(&view).unwrap();
    assert_eq!(first, second);
    // the raster image shares a rounded position with canvas "a" and wins
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].handle.as_str(), "i");
}

#[test]
fn encoder_unavailable_everywhere() {
    let view = three_page_doc();
    let mut session = CaptureSession::with_clock(view, ManualClock::new(), SessionConfig::default())
        .with_encoders(EncoderSources::new(
            Box::new(OfflineSource("cdn")),
            Some(Box::new(OfflineSource("mirror"))),
        ))
        .with_sink(Box::new(MemorySink::new()));

    let resp = session.download_pdf(no_scroll());
    assert!(!resp.success);
    let err = resp.error.unwrap();
    assert!(err.contains("cdn") && err.contains("mirror"), "{}", err);
}

#[test]
fn fallback_source_is_used_when_primary_fails() {
    let sink = MemorySink::new();
    let mut session = CaptureSession::with_clock(three_page_doc(), ManualClock::new(), SessionConfig::default())
        .with_encoders(EncoderSources::new(
            Box::new(OfflineSource("cdn")),
            Some(Box::new(BuiltinEncoders)),
        ))
        .with_sink(Box::new(sink.clone()));

    let resp = session.download_pdf(no_scroll());
    assert!(resp.success, "{:?}", resp.error);
    let files = sink.files();
    assert_eq!(files[0].0, "quarterly_plan.pdf");
    assert!(files[0].1.starts_with(b"%PDF"));
}

#[test]
fn image_extraction_is_all_or_nothing() {
    let view = three_page_doc()
        .with_element(FixtureElement::vector_page("v", Rect::new(3300.0, 40.0, 800.0, 1000.0), 800, 1000))
        .with_failing_vector_decode();
    let (mut session, _log, sink) = recording_session(view);

    let resp = session.extract_images();
    assert!(!resp.success);
    assert!(sink.files().is_empty());
}

#[test]
fn images_are_saved_in_page_order_with_delays() {
    let clock = ManualClock::new();
    let sink = MemorySink::new();
    let mut session = CaptureSession::with_clock(three_page_doc(), &clock, SessionConfig::default())
        .with_sink(Box::new(sink.clone()));

    let resp = session.extract_images();
    assert_eq!(resp.count, Some(3));
    assert_eq!(sink.names(), vec!["page-001.png", "page-002.png", "page-003.png"]);
    assert!(clock.elapsed() >= Duration::from_millis(900));
    let first = image::load_from_memory(&sink.files()[0].1).unwrap();
    assert_eq!(first.width(), 801);
}

#[test]
fn directory_sink_writes_pdf_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exports");
    let mut session = CaptureSession::with_clock(three_page_doc(), ManualClock::new(), SessionConfig::default())
        .with_sink(Box::new(DirectorySink::new(&out)));

    let resp = session.download_pdf(ExportOptions {
        high_res: true,
        auto_scroll: false,
    });
    assert!(resp.success, "{:?}", resp.error);
    let bytes = std::fs::read(out.join("quarterly_plan_hires.pdf")).unwrap();
    let doc = lopdf::Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
}
