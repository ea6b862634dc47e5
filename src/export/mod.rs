pub mod pdf;
pub mod raster;
pub mod region;

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{ImageFormat, RgbaImage};
use tracing::info;

use crate::config::{EXPORT_PDF_FILE_NAME, EXPORT_PNG_FILE_NAME};

pub use region::{BackgroundOverride, ResultRegion};

pub const CAPTURE_SCALE: f32 = 2.0;
pub const CAPTURE_BACKGROUND: &str = "#FFFFFF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Pdf,
}

impl ExportFormat {
    pub const fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Png => EXPORT_PNG_FILE_NAME,
            ExportFormat::Pdf => EXPORT_PDF_FILE_NAME,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Pdf => "pdf",
        }
    }
}

/// Rasterizes the region at 2x on a forced white background. The region's
/// own background is restored once the capture is done, success or not.
pub fn capture(region: &mut ResultRegion) -> Result<RgbaImage> {
    let forced = BackgroundOverride::force(region, CAPTURE_BACKGROUND);
    raster::rasterize_svg(&forced.to_svg(), CAPTURE_SCALE)
}

pub fn encode_png(bitmap: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bitmap.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn export_result(
    region: &mut ResultRegion,
    format: ExportFormat,
    export_dir: &Path,
) -> Result<PathBuf> {
    let bitmap = capture(region)?;
    let bytes = match format {
        ExportFormat::Png => encode_png(&bitmap)?,
        ExportFormat::Pdf => pdf::encode_pdf(&bitmap)?,
    };

    fs::create_dir_all(export_dir)?;
    let path = export_dir.join(format.file_name());
    fs::write(&path, &bytes)?;
    info!(
        "Exported result as {} to {} ({}x{}, {} bytes)",
        format.as_str(),
        path.display(),
        bitmap.width(),
        bitmap.height(),
        bytes.len()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use lopdf::{Document, Object};

    use super::*;
    use crate::handlers::form::tests::tiny_png;
    use crate::handlers::form::SelectedImage;
    use crate::state::AppState;

    fn finished_state() -> AppState {
        let bytes = tiny_png();
        let mut state = AppState::default();
        state.apply_image_selection(Ok(SelectedImage {
            file_name: "kid.png".to_string(),
            mime_type: "image/png".to_string(),
            encoded: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &bytes),
            bytes,
            preview_url: "file:///kid.png".to_string(),
        }));
        state.form.set_name("Mina");
        state.begin_request().expect("request");
        state.finish_request(Ok("Mina notices everything. She shares her crayons".to_string()));
        state
    }

    #[test]
    fn region_exists_only_for_result_view() {
        assert!(ResultRegion::from_state(&AppState::default()).is_none());

        let region = ResultRegion::from_state(&finished_state()).expect("region");
        assert_eq!(
            region.fragments,
            vec!["Mina notices everything.", "She shares her crayons"]
        );
        assert_eq!(
            region.photo.as_ref().and_then(|photo| photo.dimensions),
            Some((4, 3))
        );
        assert_eq!(region.background, None);
    }

    #[test]
    fn capture_is_double_size_opaque_and_restores_background() {
        let mut region = ResultRegion::from_state(&finished_state()).expect("region");
        let svg_size = {
            let forced = BackgroundOverride::force(&mut region, CAPTURE_BACKGROUND);
            raster::rasterize_svg(&forced.to_svg(), 1.0)
                .expect("1x render")
                .dimensions()
        };

        let bitmap = capture(&mut region).expect("capture");
        assert_eq!(bitmap.dimensions(), (svg_size.0 * 2, svg_size.1 * 2));
        assert_eq!(bitmap.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(
            bitmap.get_pixel(bitmap.width() - 1, bitmap.height() - 1).0,
            [255, 255, 255, 255]
        );
        assert_eq!(region.background, None);
    }

    #[test]
    fn exports_png_and_pdf_under_fixed_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut region = ResultRegion::from_state(&finished_state()).expect("region");

        let png_path = export_result(&mut region, ExportFormat::Png, dir.path()).expect("png");
        assert_eq!(png_path, dir.path().join("mindsprout-analysis.png"));
        let png = image::open(&png_path).expect("decode png");
        assert_eq!(png.width(), region::REGION_WIDTH * 2);

        let pdf_path = export_result(&mut region, ExportFormat::Pdf, dir.path()).expect("pdf");
        assert_eq!(pdf_path, dir.path().join("mindsprout-analysis.pdf"));
        let doc = Document::load(&pdf_path).expect("parse pdf");
        let page_id = *doc.get_pages().values().next().expect("page");
        let media_box = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .and_then(|page| page.get(b"MediaBox"))
            .and_then(Object::as_array)
            .expect("media box")
            .iter()
            .map(|value| value.as_i64().expect("integer"))
            .collect::<Vec<_>>();
        assert_eq!(media_box, vec![0, 0, i64::from(png.width()), i64::from(png.height())]);
    }
}
