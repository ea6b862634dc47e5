use anyhow::{anyhow, Result};
use image::RgbaImage;
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

/// Renders an SVG document into an RGBA bitmap at `scale` times its size.
pub fn rasterize_svg(svg: &str, scale: f32) -> Result<RgbaImage> {
    let mut options = Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = Tree::from_data(svg.as_bytes(), &options)
        .map_err(|err| anyhow!("SVG parse failed: {err}"))?;

    let size = tree.size();
    let width = (size.width() * scale).ceil() as u32;
    let height = (size.height() * scale).ceil() as u32;
    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| anyhow!("Pixmap allocation failed for {width}x{height}"))?;
    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha; image expects straight RGBA.
    let mut data = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }

    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| anyhow!("Rendered buffer does not match {width}x{height}"))
}
