//! Output encoders and how a job acquires one.
//!
//! An encoder is append-only: pages arrive in final order, one at a time,
//! and `finalize` turns what was appended into a single artifact.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use log::{debug, warn};

use crate::capture::CapturedPage;
use crate::{Error, Result};

pub mod archive;
pub mod pdf;

pub use archive::ArchiveEncoder;
pub use pdf::{PageFormat, PdfEncoder, Placement};

/// Finished output of an encoder
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    /// Pages or archive entries written
    pub entries: usize,
}

pub trait PageEncoder {
    /// Add the next page. Pages must arrive in output order.
    fn append(&mut self, page: &CapturedPage) -> Result<()>;

    /// Number of pages appended so far
    fn len(&self) -> usize;

    /// Serialize everything appended into one artifact
    fn finalize(self: Box<Self>) -> Result<Artifact>;
}

/// Which encoder a job needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFormat {
    Pdf { jpeg_quality: u8 },
    Archive,
}

/// Somewhere an encoder can be loaded from
pub trait EncoderSource: Send {
    fn name(&self) -> &str;

    fn load(&self, format: EncoderFormat) -> Result<Box<dyn PageEncoder>>;
}

/// Encoders compiled into this crate; always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEncoders;

impl EncoderSource for BuiltinEncoders {
    fn name(&self) -> &str {
        "builtin"
    }

    fn load(&self, format: EncoderFormat) -> Result<Box<dyn PageEncoder>> {
        Ok(match format {
            EncoderFormat::Pdf { jpeg_quality } => Box::new(PdfEncoder::new(PageFormat::A4, jpeg_quality)),
            EncoderFormat::Archive => Box::new(ArchiveEncoder::new()),
        })
    }
}

/// Outcome of trying to get an encoder
pub enum Acquisition {
    Ready(Box<dyn PageEncoder>),
    /// Every source failed; one reason per source tried
    FetchFailed(Vec<String>),
}

impl Acquisition {
    pub fn into_result(self) -> Result<Box<dyn PageEncoder>> {
        match self {
            Acquisition::Ready(encoder) => Ok(encoder),
            Acquisition::FetchFailed(reasons) => Err(Error::DependencyLoad(reasons.join("; "))),
        }
    }
}

/// Load from `primary`, and from `fallback` if that fails.
pub fn acquire_encoder(
    format: EncoderFormat,
    primary: &dyn EncoderSource,
    fallback: Option<&dyn EncoderSource>,
) -> Acquisition {
    let mut reasons = Vec::new();
    for source in std::iter::once(primary).chain(fallback) {
        match source.load(format) {
            Ok(encoder) => {
                debug!("loaded {:?} encoder from {}", format, source.name());
                return Acquisition::Ready(encoder);
            }
            Err(e) => {
                warn!("encoder source {} failed: {}", source.name(), e);
                reasons.push(format!("{}: {}", source.name(), e));
            }
        }
    }
    Acquisition::FetchFailed(reasons)
}

/// PNG bytes of a page bitmap
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(buf)
}

/// `page-001.png` for index 0
pub fn page_entry_name(index: usize) -> String {
    format!("page-{:03}.png", index + 1)
}
