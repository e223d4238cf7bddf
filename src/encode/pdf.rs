//! PDF encoder: one JPEG page image per PDF page, fitted to a fixed paper size.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::{Artifact, PageEncoder};
use crate::capture::CapturedPage;
use crate::{Error, Result};

const POINTS_PER_MM: f64 = 72.0 / 25.4;

/// Physical page size in millimetres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFormat {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PageFormat {
    /// A4 portrait
    pub const A4: PageFormat = PageFormat {
        width_mm: 210.0,
        height_mm: 297.0,
    };
}

/// Where an image lands on a page, in millimetres from the top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Scale an image to the page width, shrink to the page height if it is too
/// tall, keep the aspect ratio and centre horizontally. Top aligned.
pub fn fit_to_page(image_width: u32, image_height: u32, page: PageFormat) -> Placement {
    let ratio = image_height as f64 / image_width as f64;
    let mut width = page.width_mm;
    let mut height = width * ratio;
    if height > page.height_mm {
        height = page.height_mm;
        width = height / ratio;
    }
    Placement {
        x: (page.width_mm - width) / 2.0,
        y: 0.0,
        width,
        height,
    }
}

pub struct PdfEncoder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    format: PageFormat,
    jpeg_quality: u8,
}

impl PdfEncoder {
    pub fn new(format: PageFormat, jpeg_quality: u8) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            format,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    fn jpeg(&self, image: &RgbaImage) -> Result<Vec<u8>> {
        let rgb = flatten_on_white(image);
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality).write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(buf)
    }
}

/// JPEG has no alpha; composite transparent pixels onto a white sheet.
fn flatten_on_white(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

impl PageEncoder for PdfEncoder {
    fn append(&mut self, page: &CapturedPage) -> Result<()> {
        let (w, h) = (page.width(), page.height());
        if w == 0 || h == 0 {
            return Err(Error::EncodeError(format!("page {} is empty", page.index + 1)));
        }
        let jpeg = self.jpeg(&page.image)?;

        let image_id = self.doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => w as i64,
                    "Height" => h as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg,
            )
            .with_compression(false),
        );

        let page_w = (self.format.width_mm * POINTS_PER_MM) as f32;
        let page_h = (self.format.height_mm * POINTS_PER_MM) as f32;
        let place = fit_to_page(w, h, self.format);
        let draw_w = (place.width * POINTS_PER_MM) as f32;
        let draw_h = (place.height * POINTS_PER_MM) as f32;
        let draw_x = (place.x * POINTS_PER_MM) as f32;
        // PDF space starts bottom-left
        let draw_y = page_h - (place.y * POINTS_PER_MM) as f32 - draw_h;

        let name = format!("Im{}", page.index);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(draw_w),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(draw_h),
                        Object::Real(draw_x),
                        Object::Real(draw_y),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = self
            .doc
            .add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(page_w),
                Object::Real(page_h),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    name.as_str() => image_id,
                },
            },
        });
        self.kids.push(Object::Reference(page_id));
        Ok(())
    }

    fn len(&self) -> usize {
        self.kids.len()
    }

    fn finalize(self: Box<Self>) -> Result<Artifact> {
        let PdfEncoder {
            mut doc,
            pages_id,
            kids,
            ..
        } = *self;
        if kids.is_empty() {
            return Err(Error::EncodeError("a PDF needs at least one page".into()));
        }
        let entries = kids.len();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => entries as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(Artifact {
            bytes,
            mime: "application/pdf",
            entries,
        })
    }
}
