use std::io::Cursor;
use std::ops::Deref;

use image::ImageReader;

use crate::state::AppState;
use crate::ui::view::result_title;
use crate::ui::{derive_view, ViewState};

pub const REGION_WIDTH: u32 = 640;
const PADDING: u32 = 32;
const CONTENT_WIDTH: u32 = REGION_WIDTH - PADDING * 2;
const MAX_PHOTO_HEIGHT: u32 = 420;
const FALLBACK_PHOTO_HEIGHT: u32 = 360;
const TITLE_FONT_SIZE: u32 = 26;
const TITLE_LINE_HEIGHT: u32 = 36;
const BODY_FONT_SIZE: u32 = 18;
const BODY_LINE_HEIGHT: u32 = 28;
const PARAGRAPH_GAP: u32 = 10;
const SECTION_GAP: u32 = 28;
const FONT_FAMILY: &str =
    "Noto Sans CJK KR, Noto Sans KR, Apple SD Gothic Neo, Malgun Gothic, NanumGothic, sans-serif";
const TITLE_COLOR: &str = "#2E7D32";
const BODY_COLOR: &str = "#37474F";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPhoto {
    pub mime_type: String,
    pub encoded: String,
    pub dimensions: Option<(u32, u32)>,
}

/// The exportable result card: photo, title and narrative fragments. Its own
/// background is transparent unless something overrides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRegion {
    pub title: String,
    pub fragments: Vec<String>,
    pub photo: Option<RegionPhoto>,
    pub background: Option<String>,
}

fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
        .filter(|(width, height)| *width > 0 && *height > 0)
}

impl ResultRegion {
    /// Only a Result view has a region to export.
    pub fn from_state(state: &AppState) -> Option<Self> {
        let ViewState::Result(fragments) = derive_view(state) else {
            return None;
        };
        let photo = state.form.image.as_ref().map(|image| RegionPhoto {
            mime_type: image.mime_type.clone(),
            encoded: image.encoded.clone(),
            dimensions: probe_dimensions(&image.bytes),
        });

        Some(ResultRegion {
            title: result_title(&state.form.name),
            fragments,
            photo,
            background: None,
        })
    }

    fn photo_height(&self) -> u32 {
        match self.photo.as_ref() {
            None => 0,
            Some(RegionPhoto {
                dimensions: Some((width, height)),
                ..
            }) => {
                let scaled = u64::from(CONTENT_WIDTH) * u64::from(*height) / u64::from(*width);
                u32::try_from(scaled)
                    .unwrap_or(MAX_PHOTO_HEIGHT)
                    .clamp(1, MAX_PHOTO_HEIGHT)
            }
            Some(_) => FALLBACK_PHOTO_HEIGHT,
        }
    }

    pub fn to_svg(&self) -> String {
        let title_lines = wrap_text(&self.title, columns_for(TITLE_FONT_SIZE));
        let body_columns = columns_for(BODY_FONT_SIZE);
        let paragraphs: Vec<Vec<String>> = self
            .fragments
            .iter()
            .map(|fragment| wrap_text(fragment, body_columns))
            .collect();

        let photo_height = self.photo_height();
        let mut cursor = PADDING;
        let mut body = String::new();

        if let Some(photo) = self.photo.as_ref() {
            body.push_str(&format!(
                "  <image x='{PADDING}' y='{cursor}' width='{CONTENT_WIDTH}' height='{photo_height}' preserveAspectRatio='xMidYMid meet' xlink:href='data:{};base64,{}'/>\n",
                escape_xml(&photo.mime_type),
                photo.encoded
            ));
            cursor += photo_height + SECTION_GAP;
        }

        for line in &title_lines {
            cursor += TITLE_LINE_HEIGHT;
            body.push_str(&format!(
                "  <text x='{PADDING}' y='{cursor}' fill='{TITLE_COLOR}' font-family='{FONT_FAMILY}' font-size='{TITLE_FONT_SIZE}' font-weight='700'>{}</text>\n",
                escape_xml(line)
            ));
        }
        cursor += SECTION_GAP / 2;

        for lines in &paragraphs {
            for line in lines {
                cursor += BODY_LINE_HEIGHT;
                body.push_str(&format!(
                    "  <text x='{PADDING}' y='{cursor}' fill='{BODY_COLOR}' font-family='{FONT_FAMILY}' font-size='{BODY_FONT_SIZE}'>{}</text>\n",
                    escape_xml(line)
                ));
            }
            cursor += PARAGRAPH_GAP;
        }

        let height = cursor + PADDING;
        let mut svg = format!(
            "<svg xmlns='http://www.w3.org/2000/svg' xmlns:xlink='http://www.w3.org/1999/xlink' width='{REGION_WIDTH}' height='{height}' viewBox='0 0 {REGION_WIDTH} {height}'>\n"
        );
        if let Some(background) = self.background.as_deref() {
            svg.push_str(&format!(
                "  <rect width='{REGION_WIDTH}' height='{height}' fill='{}'/>\n",
                escape_xml(background)
            ));
        }
        svg.push_str(&body);
        svg.push_str("</svg>\n");
        svg
    }
}

/// Paints an opaque background on a region for as long as the guard lives,
/// then puts the previous background back.
pub struct BackgroundOverride<'a> {
    region: &'a mut ResultRegion,
    previous: Option<String>,
}

impl<'a> BackgroundOverride<'a> {
    pub fn force(region: &'a mut ResultRegion, color: &str) -> Self {
        let previous = region.background.replace(color.to_string());
        BackgroundOverride { region, previous }
    }
}

impl Deref for BackgroundOverride<'_> {
    type Target = ResultRegion;

    fn deref(&self) -> &ResultRegion {
        &*self.region
    }
}

impl Drop for BackgroundOverride<'_> {
    fn drop(&mut self) {
        self.region.background = self.previous.take();
    }
}

fn columns_for(font_size: u32) -> usize {
    // One column is roughly half an em; wide glyphs take two.
    (CONTENT_WIDTH * 2 / font_size) as usize
}

fn is_wide(ch: char) -> bool {
    matches!(
        ch as u32,
        0x1100..=0x115F
            | 0x2E80..=0xA4CF
            | 0xAC00..=0xD7A3
            | 0xF900..=0xFAFF
            | 0xFE30..=0xFE4F
            | 0xFF00..=0xFF60
            | 0xFFE0..=0xFFE6
            | 0x1F300..=0x1FAFF
    )
}

fn char_columns(ch: char) -> usize {
    if is_wide(ch) {
        2
    } else {
        1
    }
}

fn text_columns(text: &str) -> usize {
    text.chars().map(char_columns).sum()
}

pub(crate) fn wrap_text(text: &str, max_columns: usize) -> Vec<String> {
    let max_columns = max_columns.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_columns = 0usize;

    for word in text.split_whitespace() {
        let word_columns = text_columns(word);

        if word_columns > max_columns {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_columns = 0;
            }
            for ch in word.chars() {
                let width = char_columns(ch);
                if current_columns + width > max_columns && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current_columns = 0;
                }
                current.push(ch);
                current_columns += width;
            }
            continue;
        }

        let separator = usize::from(!current.is_empty());
        if current_columns + separator + word_columns > max_columns {
            lines.push(std::mem::take(&mut current));
            current_columns = 0;
        } else if separator == 1 {
            current.push(' ');
            current_columns += 1;
        }
        current.push_str(word);
        current_columns += word_columns;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// XML 1.0 cannot carry C0 controls other than tab, newline and carriage
/// return, nor U+FFFE and U+FFFF. Those are dropped.
fn is_xml_char(ch: char) -> bool {
    !matches!(
        ch,
        '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}'
    )
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars().filter(|ch| is_xml_char(*ch)) {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
