//! Export an in-memory document without a browser

use drivecap::clock::ManualClock;
use drivecap::export::MemorySink;
use drivecap::view::{FixtureElement, FixtureView, Rect};
use drivecap::{CaptureSession, ExportOptions, SessionConfig};

fn main() {
    let mut view = FixtureView::new("Offline Demo - Google Slides").with_container(".punch-viewer-container", 3000.0, 720.0);
    for (i, top) in [0.0, 760.0, 1520.0].into_iter().enumerate() {
        view = view.with_element(FixtureElement::canvas(
            &format!("slide-{}", i),
            ".punch-viewer-content canvas",
            Rect::new(top, 0.0, 960.0, 720.0),
            960,
            540,
        ));
    }

    let sink = MemorySink::new();
    let mut session = CaptureSession::with_clock(view, ManualClock::new(), SessionConfig::default())
        .with_sink(Box::new(sink.clone()));

    let reply = session.download_zip(ExportOptions::default());
    println!("{}", drivecap::Response::Export(reply).to_json());
    for (name, bytes) in sink.files() {
        println!("{} ({} bytes)", name, bytes.len());
    }
}
