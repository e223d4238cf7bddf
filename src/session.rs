//! A capture session: one open document plus everything jobs against it need.

use log::{debug, warn};
use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::export::{
    ArtifactSink, DirectorySink, EncoderSources, ExportJob, ExportKind, ExportOptions, JobReport,
};
use crate::detect::watches_video;
use crate::media::{MediaSession, VideoDetected, VideoUrlResponse};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::protocol::{ExportResponse, Request, Response};
use crate::view::DocumentView;
use crate::SessionConfig;

/// Capacity of the progress channel; slow listeners miss old events.
const PROGRESS_CAPACITY: usize = 64;
const VIDEO_CAPACITY: usize = 16;

/// Owns a document view and runs one export at a time against it.
pub struct CaptureSession<V: DocumentView, C: Clock = SystemClock> {
    view: V,
    clock: C,
    config: SessionConfig,
    encoders: EncoderSources,
    sink: Box<dyn ArtifactSink + Send>,
    media: MediaSession,
    progress_tx: broadcast::Sender<ProgressEvent>,
    video_tx: broadcast::Sender<VideoDetected>,
}

impl<V: DocumentView> CaptureSession<V, SystemClock> {
    /// Session on the wall clock, saving into `config.output_dir`
    pub fn new(view: V, config: SessionConfig) -> Self {
        Self::with_clock(view, SystemClock::new(), config)
    }
}

impl<V: DocumentView, C: Clock> CaptureSession<V, C> {
    pub fn with_clock(view: V, clock: C, config: SessionConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CAPACITY);
        let (video_tx, _) = broadcast::channel(VIDEO_CAPACITY);
        let sink = Box::new(DirectorySink::new(&config.output_dir));
        Self {
            view,
            clock,
            config,
            encoders: EncoderSources::default(),
            sink,
            media: MediaSession::new(),
            progress_tx,
            video_tx,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ArtifactSink + Send>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_encoders(mut self, encoders: EncoderSources) -> Self {
        self.encoders = encoders;
        self
    }

    /// Listen to progress of every job run by this session
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_tx.subscribe()
    }

    pub fn progress_sender(&self) -> broadcast::Sender<ProgressEvent> {
        self.progress_tx.clone()
    }

    /// Listen for playback URLs as the player starts new streams
    pub fn subscribe_video(&self) -> broadcast::Receiver<VideoDetected> {
        self.video_tx.subscribe()
    }

    pub fn video_sender(&self) -> broadcast::Sender<VideoDetected> {
        self.video_tx.clone()
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Run one export job to completion
    pub fn export(&mut self, kind: ExportKind, options: ExportOptions) -> JobReport {
        let progress = ProgressReporter::new(self.progress_tx.clone());
        let job = ExportJob::new(kind, options, &self.clock, &self.encoders, &self.config, progress);
        let report = job.run(&mut self.view, self.sink.as_mut());
        self.refresh_media();
        report
    }

    pub fn download_pdf(&mut self, options: ExportOptions) -> ExportResponse {
        self.export(ExportKind::Pdf, options).to_response()
    }

    pub fn download_zip(&mut self, options: ExportOptions) -> ExportResponse {
        self.export(ExportKind::Zip, options).to_response()
    }

    pub fn extract_images(&mut self) -> ExportResponse {
        self.export(ExportKind::Images, ExportOptions::default())
            .to_response()
    }

    /// Latest video and audio URLs seen in this document
    pub fn get_video_url(&mut self) -> VideoUrlResponse {
        self.refresh_media();
        self.media.snapshot()
    }

    /// Fold newly seen playback URLs into the media state and announce them.
    /// Only Drive file and preview pages are watched.
    fn refresh_media(&mut self) {
        let requests = self.view.drain_requests();
        let watched = match self.view.url() {
            Ok(url) => watches_video(&url),
            Err(e) => {
                warn!("could not read the page URL: {}", e);
                false
            }
        };
        if !watched {
            return;
        }

        let mut fresh = false;
        for url in &requests {
            fresh |= self.media.observe_request(url);
        }
        match self.view.media_sources() {
            Ok(sources) => {
                for source in &sources {
                    fresh |= self.media.observe_source(source);
                }
            }
            Err(e) => warn!("could not scan video elements: {}", e),
        }

        if fresh {
            debug!("new playback URL detected");
            let _ = self.video_tx.send(VideoDetected::new(self.media.snapshot()));
        }
    }

    /// Dispatch one control request
    pub fn handle(&mut self, request: Request) -> Response {
        debug!("handling {:?}", request);
        match request {
            Request::DownloadPdf { options } => Response::Export(self.download_pdf(options)),
            Request::DownloadZip { options } => Response::Export(self.download_zip(options)),
            Request::ExtractImages => Response::Export(self.extract_images()),
            Request::GetVideoUrl => Response::Video(self.get_video_url()),
            Request::Ping => Response::pong(),
        }
    }

    pub fn handle_json(&mut self, json: &str) -> Response {
        match Request::from_json(json) {
            Ok(request) => self.handle(request),
            Err(reply) => reply,
        }
    }
}
