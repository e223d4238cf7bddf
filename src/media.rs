//! Direct media URLs from Drive's video player.
//!
//! Drive streams video and audio as separate `videoplayback` requests. A
//! `MediaSession` remembers the latest of each for one open document; it is
//! fed from observed network requests and from `<video>` elements.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Serialize;

use crate::view::MediaSource;

const PLAYBACK_MARKER: &str = "videoplayback";

/// Response of the `getVideoUrl` request
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUrlResponse {
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    pub has_audio: bool,
    pub raw: RawMediaUrls,
}

/// Pushed to listeners when a new playback URL shows up:
/// `{ "type": "videoUrl", "videoUrl": ..., "audioUrl": ..., ... }`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoDetected {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub urls: VideoUrlResponse,
}

impl VideoDetected {
    pub fn new(urls: VideoUrlResponse) -> Self {
        Self {
            kind: "videoUrl",
            urls,
        }
    }
}

/// URLs exactly as they were observed
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RawMediaUrls {
    pub video: Option<String>,
    pub audio: Option<String>,
}

/// Which stream a playback URL carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// Classify a request URL by its `mime` query parameter, plain or encoded.
pub fn classify_request(url: &str) -> Option<StreamKind> {
    if !url.contains(PLAYBACK_MARKER) {
        return None;
    }
    if url.contains("mime=video") || url.contains("mime%3Dvideo") {
        Some(StreamKind::Video)
    } else if url.contains("mime=audio") || url.contains("mime%3Daudio") {
        Some(StreamKind::Audio)
    } else {
        None
    }
}

/// `&sRFVP=<digits>` session markers, in either casing
static SESSION_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:sRFVP|srfvp)=\d+").expect("session param pattern is valid"));

/// Strip the byte-range and session parameters so the URL fetches the whole stream.
pub fn clean_media_url(url: &str) -> String {
    let without_range = match url.find("&range=") {
        Some(idx) => &url[..idx],
        None => url,
    };
    SESSION_PARAM.replace_all(without_range, "").into_owned()
}

/// Detected media URLs for one document session
#[derive(Debug, Clone, Default)]
pub struct MediaSession {
    video: Option<String>,
    audio: Option<String>,
}

impl MediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a network request; true when it is a playback URL not seen last time.
    pub fn observe_request(&mut self, url: &str) -> bool {
        let slot = match classify_request(url) {
            Some(StreamKind::Video) => &mut self.video,
            Some(StreamKind::Audio) => &mut self.audio,
            None => return false,
        };
        debug!("observed playback request: {}", url);
        remember(slot, url)
    }

    /// Record a URL found on a `<video>` element or `<source>` child.
    pub fn observe_source(&mut self, source: &MediaSource) -> bool {
        if !source.src.contains(PLAYBACK_MARKER) {
            return false;
        }
        let is_audio = source.from_source_element
            && source.mime.as_deref().is_some_and(|m| m.contains("audio"));
        let slot = if is_audio { &mut self.audio } else { &mut self.video };
        remember(slot, &source.src)
    }

    pub fn snapshot(&self) -> VideoUrlResponse {
        VideoUrlResponse {
            video_url: self.video.as_deref().map(clean_media_url),
            audio_url: self.audio.as_deref().map(clean_media_url),
            has_audio: self.audio.is_some(),
            raw: RawMediaUrls {
                video: self.video.clone(),
                audio: self.audio.clone(),
            },
        }
    }
}

fn remember(slot: &mut Option<String>, url: &str) -> bool {
    if slot.as_deref() == Some(url) {
        return false;
    }
    *slot = Some(url.to_string());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO: &str = "https://rr1.drive.google.com/videoplayback?id=1&mime=video%2Fmp4&sRFVP=12&itag=18&range=0-9999";

    #[test]
    fn clean_cuts_range_and_session_params() {
        assert_eq!(
            clean_media_url(VIDEO),
            "https://rr1.drive.google.com/videoplayback?id=1&mime=video%2Fmp4&itag=18"
        );
        assert_eq!(clean_media_url("https://x/?a=1&srfvp=7&b=2"), "https://x/?a=1&b=2");
        assert_eq!(clean_media_url("https://x/?a=1&sRFVP=&b=2"), "https://x/?a=1&sRFVP=&b=2");
        assert_eq!(clean_media_url("https://x/?a=1&sRFVP=1&srfvp=22&b=3"), "https://x/?a=1&b=3");
    }

    #[test]
    fn requests_are_classified_by_mime() {
        assert_eq!(classify_request(VIDEO), Some(StreamKind::Video));
        assert_eq!(classify_request("https://x/videoplayback?mime%3Daudio%2Fmp4"), Some(StreamKind::Audio));
        assert_eq!(classify_request("https://x/thumbnail?mime=video"), None);
    }

    #[test]
    fn snapshot_reports_audio_presence() {
        let mut s = MediaSession::new();
        assert!(s.observe_request(VIDEO));
        let snap = s.snapshot();
        assert!(!snap.has_audio);
        assert!(snap.video_url.unwrap().ends_with("itag=18"));
        assert_eq!(snap.raw.video.as_deref(), Some(VIDEO));

        s.observe_source(&MediaSource {
            src: "https://x/videoplayback?mime=audio".into(),
            mime: Some("audio/mp4".into()),
            from_source_element: true,
        });
        assert!(s.snapshot().has_audio);
        assert_eq!(MediaSession::new().snapshot(), VideoUrlResponse::default());
    }

    #[test]
    fn repeated_urls_are_not_new() {
        let mut s = MediaSession::new();
        assert!(s.observe_request(VIDEO));
        assert!(!s.observe_request(VIDEO));
        let source = MediaSource {
            src: VIDEO.into(),
            mime: None,
            from_source_element: false,
        };
        assert!(!s.observe_source(&source));
        assert!(s.observe_request("https://x/videoplayback?mime=video%2Fwebm"));
    }

    #[test]
    fn detection_event_is_tagged() {
        let mut s = MediaSession::new();
        s.observe_request(VIDEO);
        let json = serde_json::to_value(VideoDetected::new(s.snapshot())).unwrap();
        assert_eq!(json["type"], "videoUrl");
        assert!(json["videoUrl"].as_str().unwrap().ends_with("itag=18"));
        assert_eq!(json["hasAudio"], false);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(MediaSession::new().snapshot()).unwrap();
        assert_eq!(json["hasAudio"], false);
        assert!(json["videoUrl"].is_null());
        assert!(json["raw"]["audio"].is_null());
    }
}
