//! Recognize which Drive viewer a URL opens.

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Docs,
    Sheets,
    Slides,
    /// A file preview on drive.google.com (PDF, image or video)
    DriveFile,
}

impl DocumentKind {
    /// `None` for pages that are not a supported viewer.
    pub fn from_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let host = url.host_str()?;
        let path = url.path();
        match host {
            "docs.google.com" => {
                if path.starts_with("/document/") {
                    Some(DocumentKind::Docs)
                } else if path.starts_with("/spreadsheets/") {
                    Some(DocumentKind::Sheets)
                } else if path.starts_with("/presentation/") {
                    Some(DocumentKind::Slides)
                } else if path.contains("/viewer") {
                    Some(DocumentKind::DriveFile)
                } else {
                    None
                }
            }
            "drive.google.com" if path.starts_with("/file/d/") => Some(DocumentKind::DriveFile),
            _ => None,
        }
    }

    /// Whether this viewer may play video, so media detection is worth running
    pub fn may_have_video(self) -> bool {
        matches!(self, DocumentKind::DriveFile)
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentKind::Docs => "Google Docs",
            DocumentKind::Sheets => "Google Sheets",
            DocumentKind::Slides => "Google Slides",
            DocumentKind::DriveFile => "Drive file",
        }
    }
}

/// Whether a page's player is watched for playback URLs: Drive file
/// viewers and any `/preview` embed.
pub fn watches_video(raw: &str) -> bool {
    if DocumentKind::from_url(raw).is_some_and(DocumentKind::may_have_video) {
        return true;
    }
    Url::parse(raw).is_ok_and(|url| url.path().contains("/preview"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_each_viewer() {
        assert_eq!(
            DocumentKind::from_url("https://docs.google.com/document/d/abc/view"),
            Some(DocumentKind::Docs)
        );
        assert_eq!(
            DocumentKind::from_url("https://docs.google.com/spreadsheets/d/abc/edit#gid=0"),
            Some(DocumentKind::Sheets)
        );
        assert_eq!(
            DocumentKind::from_url("https://docs.google.com/presentation/d/abc/preview"),
            Some(DocumentKind::Slides)
        );
        assert_eq!(
            DocumentKind::from_url("https://drive.google.com/file/d/abc/view?usp=sharing"),
            Some(DocumentKind::DriveFile)
        );
    }

    #[test]
    fn other_pages_are_unsupported() {
        assert_eq!(DocumentKind::from_url("https://drive.google.com/drive/my-drive"), None);
        assert_eq!(DocumentKind::from_url("https://example.com/document/d/x"), None);
        assert_eq!(DocumentKind::from_url("not a url"), None);
    }

    #[test]
    fn video_is_watched_on_file_and_preview_pages() {
        assert!(watches_video("https://drive.google.com/file/d/abc/view"));
        assert!(watches_video("https://docs.google.com/presentation/d/abc/preview"));
        assert!(watches_video("http://127.0.0.1:8080/file/d/x/preview"));
        assert!(!watches_video("https://docs.google.com/document/d/abc/view"));
        assert!(!watches_video("https://docs.google.com/document/d/abc/view?q=/preview"));
        assert!(!watches_video("not a url"));
    }
}
