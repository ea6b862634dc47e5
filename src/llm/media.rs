use std::path::Path;

const SVG_SNIFF_LIMIT: usize = 4096;

/// Sniffs a MIME type from file content. HEIC containers are checked first
/// because `infer` reports some of them under a generic ISO-BMFF type.
pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// SVG is text, so content sniffing cannot identify it. A `.svg` file is
/// accepted when its leading content actually opens an `<svg` element.
pub fn declared_svg_type(path: &Path, data: &[u8]) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if extension != "svg" {
        return None;
    }
    let head = String::from_utf8_lossy(&data[..data.len().min(SVG_SNIFF_LIMIT)]);
    head.contains("<svg").then(|| "image/svg+xml".to_string())
}

pub fn normalize_image_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

pub fn is_image_mime(mime_type: &str) -> bool {
    normalize_image_mime_type(mime_type).starts_with("image/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 16] = [
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];

    #[test]
    fn detects_png_from_signature() {
        assert_eq!(detect_mime_type(&PNG_SIGNATURE).as_deref(), Some("image/png"));
    }

    #[test]
    fn detects_heic_brand() {
        let mut data = vec![0, 0, 0, 0x18];
        data.extend_from_slice(b"ftypheic");
        data.extend_from_slice(&[0; 8]);
        assert_eq!(detect_mime_type(&data).as_deref(), Some("image/heic"));
    }

    #[test]
    fn plain_text_is_not_an_image() {
        let detected = detect_mime_type(b"just some notes about the weekend");
        assert!(detected.as_deref().map_or(true, |mime| !is_image_mime(mime)));
    }

    #[test]
    fn svg_is_accepted_by_extension_only_with_svg_content() {
        let svg = b"<?xml version='1.0'?>\n<svg xmlns='http://www.w3.org/2000/svg'/>";
        assert_eq!(
            declared_svg_type(Path::new("drawing.SVG"), svg).as_deref(),
            Some("image/svg+xml")
        );
        assert_eq!(declared_svg_type(Path::new("drawing.svg"), b"hello"), None);
        assert_eq!(declared_svg_type(Path::new("drawing.xml"), svg), None);
    }

    #[test]
    fn jpg_alias_is_normalized() {
        assert_eq!(normalize_image_mime_type(" IMAGE/JPG "), "image/jpeg");
        assert!(is_image_mime("image/webp"));
        assert!(!is_image_mime("application/pdf"));
    }
}
