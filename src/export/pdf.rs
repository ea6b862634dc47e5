use anyhow::Result;
use image::{DynamicImage, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

const IMAGE_RESOURCE_NAME: &str = "Im0";

/// Builds a one-page PDF whose page is exactly the bitmap's size, with the
/// bitmap drawn at the origin. Alpha is dropped; exports are captured on an
/// opaque background.
///
/// The page keeps the bitmap's orientation instead of forcing landscape, so
/// the usual tall result card lands on a portrait page.
pub fn encode_pdf(bitmap: &RgbaImage) -> Result<Vec<u8>> {
    let (width, height) = bitmap.dimensions();
    let (width, height) = (i64::from(width), i64::from(height));
    let rgb = DynamicImage::ImageRgba8(bitmap.clone()).to_rgb8();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        },
        rgb.into_raw(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0_i64.into(),
                    0_i64.into(),
                    height.into(),
                    0_i64.into(),
                    0_i64.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), width.into(), height.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_RESOURCE_NAME => image_id,
            },
        },
    });

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1_i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
