//! Single-page PDF wrapping a JPEG raster.
//!
//! The page is sized so the image prints at its DPI: one PDF point is 1/72
//! inch, so a side of `px` pixels at `dpi` becomes `px * 72 / dpi` points.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use super::raster::encode_jpeg;
use super::{validate_rgba, EncodeError, EncodeOptions, FormatEncoder, OutputFormat};
use crate::decode::DecodedImage;

const POINTS_PER_INCH: f32 = 72.0;

/// PDF page with a DCT-encoded image XObject.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfEncoder;

fn page_extent(pixels: u32, dpi: u16) -> f32 {
    pixels as f32 * POINTS_PER_INCH / dpi.max(1) as f32
}

impl FormatEncoder for PdfEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Pdf
    }

    fn encode(&self, image: &DecodedImage, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
        validate_rgba(image)?;
        let jpeg = encode_jpeg(&image.to_rgb_bytes(), image.width, image.height, options.quality)?;

        let page_width = page_extent(image.width, options.dpi.0);
        let page_height = page_extent(image.height, options.dpi.1);

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let xobject = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        );
        let image_id = doc.add_object(xobject);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        page_width.into(),
                        0.into(),
                        0.into(),
                        page_height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| EncodeError::failed(OutputFormat::Pdf, e))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
        });

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| EncodeError::failed(OutputFormat::Pdf, e))?;
        Ok(out)
    }
}
