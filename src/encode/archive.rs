//! ZIP encoder: one `page-NNN.png` entry per page.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{encode_png, page_entry_name, Artifact, PageEncoder};
use crate::capture::CapturedPage;
use crate::Result;

/// Deflate level used for every entry
pub const COMPRESSION_LEVEL: i64 = 6;

pub struct ArchiveEncoder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    entries: usize,
}

impl ArchiveEncoder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            entries: 0,
        }
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(COMPRESSION_LEVEL))
    }
}

impl Default for ArchiveEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PageEncoder for ArchiveEncoder {
    fn append(&mut self, page: &CapturedPage) -> Result<()> {
        let png = encode_png(&page.image)?;
        self.writer.start_file(page_entry_name(page.index), Self::options())?;
        self.writer.write_all(&png)?;
        self.entries += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries
    }

    fn finalize(self: Box<Self>) -> Result<Artifact> {
        let entries = self.entries;
        let bytes = self.writer.finish()?.into_inner();
        Ok(Artifact {
            bytes,
            mime: "application/zip",
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn entries_are_named_by_page_order() {
        let mut enc: Box<dyn PageEncoder> = Box::new(ArchiveEncoder::new());
        for index in 0..3 {
            enc.append(&CapturedPage {
                index,
                image: RgbaImage::new(8, 8),
            })
            .unwrap();
        }
        let artifact = enc.finalize().unwrap();
        assert_eq!(artifact.entries, 3);

        let zip = zip::ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
        let names: Vec<_> = zip.file_names().collect();
        assert!(names.contains(&"page-001.png"));
        assert!(names.contains(&"page-003.png"));
        assert_eq!(zip.len(), 3);
    }
}
