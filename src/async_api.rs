use std::sync::mpsc::{self, Sender};
use std::thread;

use log::debug;
use tokio::sync::{broadcast, oneshot};

use crate::clock::Clock;
use crate::export::{ExportKind, ExportOptions, JobReport};
use crate::media::{VideoDetected, VideoUrlResponse};
use crate::progress::ProgressEvent;
use crate::protocol::{ExportResponse, Request, Response};
use crate::session::CaptureSession;
use crate::view::DocumentView;
use crate::{Error, Result};

enum Command {
    Export(ExportKind, ExportOptions, oneshot::Sender<JobReport>),
    VideoUrl(oneshot::Sender<VideoUrlResponse>),
    Handle(Request, oneshot::Sender<Response>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly exporter backed by a dedicated worker thread.
///
/// The worker thread owns a synchronous `CaptureSession` and runs commands
/// sent from async tasks one at a time, so callers get an async interface
/// without the document view having to be `Send`.
#[derive(Clone)]
pub struct Exporter {
    cmd_tx: Sender<Command>,
    progress_tx: broadcast::Sender<ProgressEvent>,
    video_tx: broadcast::Sender<VideoDetected>,
}

impl Exporter {
    /// Spawn the worker and build the session on it with `factory`.
    pub async fn spawn<V, C, F>(factory: F) -> Result<Self>
    where
        V: DocumentView + 'static,
        C: Clock + 'static,
        F: FnOnce() -> Result<CaptureSession<V, C>> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        type Listeners = (broadcast::Sender<ProgressEvent>, broadcast::Sender<VideoDetected>);
        let (init_tx, init_rx) = oneshot::channel::<Result<Listeners>>();

        thread::spawn(move || {
            let mut session = match factory() {
                Ok(s) => s,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };

            let _ = init_tx.send(Ok((session.progress_sender(), session.video_sender())));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Export(kind, options, resp) => {
                        let _ = resp.send(session.export(kind, options));
                    }
                    Command::VideoUrl(resp) => {
                        let _ = resp.send(session.get_video_url());
                    }
                    Command::Handle(request, resp) => {
                        let _ = resp.send(session.handle(request));
                    }
                    Command::Close(resp) => {
                        drop(session);
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
            debug!("exporter worker stopped");
        });

        let (progress_tx, video_tx) = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))??;

        Ok(Self {
            cmd_tx,
            progress_tx,
            video_tx,
        })
    }

    /// Listen to progress events of every job this exporter runs.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Listen for playback URLs detected while the session runs.
    pub fn subscribe_video(&self) -> broadcast::Receiver<VideoDetected> {
        self.video_tx.subscribe()
    }

    /// Run an export and return its full report.
    pub async fn export(&self, kind: ExportKind, options: ExportOptions) -> Result<JobReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Export(kind, options, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Export canceled: {}", e)))
    }

    pub async fn download_pdf(&self, options: ExportOptions) -> Result<ExportResponse> {
        Ok(self.export(ExportKind::Pdf, options).await?.to_response())
    }

    pub async fn download_zip(&self, options: ExportOptions) -> Result<ExportResponse> {
        Ok(self.export(ExportKind::Zip, options).await?.to_response())
    }

    pub async fn extract_images(&self) -> Result<ExportResponse> {
        Ok(self
            .export(ExportKind::Images, ExportOptions::default())
            .await?
            .to_response())
    }

    pub async fn get_video_url(&self) -> Result<VideoUrlResponse> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::VideoUrl(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Video URL lookup canceled: {}", e)))
    }

    /// Dispatch a control request as the session would.
    pub async fn request(&self, request: Request) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Handle(request, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Request canceled: {}", e)))
    }

    /// Shutdown the background worker and release the document view.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::Other("Exporter worker has stopped".into()))
    }
}

/// Open `url` in headless Chrome and serve it from a new `Exporter`.
#[cfg(feature = "cdp")]
pub async fn launch(url: &str, config: crate::SessionConfig) -> Result<Exporter> {
    let url = url.to_string();
    Exporter::spawn(move || {
        let view = crate::view::CdpView::open(&url, &config)?;
        Ok(CaptureSession::new(view, config))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::export::MemorySink;
    use crate::view::FixtureView;
    use crate::SessionConfig;

    #[tokio::test]
    async fn init_failure_is_reported() {
        let res = Exporter::spawn(|| -> Result<CaptureSession<FixtureView, ManualClock>> {
            Err(Error::InitializationError("no browser".into()))
        })
        .await;
        assert!(matches!(res, Err(Error::InitializationError(_))));
    }

    #[tokio::test]
    async fn closed_exporter_rejects_commands() {
        let exporter = Exporter::spawn(|| {
            Ok(CaptureSession::with_clock(
                FixtureView::new("t"),
                ManualClock::new(),
                SessionConfig::default(),
            )
            .with_sink(Box::new(MemorySink::new())))
        })
        .await
        .unwrap();
        let other = exporter.clone();
        exporter.close().await.unwrap();
        assert!(other.get_video_url().await.is_err());
    }
}
