use crate::state::AppState;

pub const APP_TITLE: &str = "MINDSPROUT";
pub const APP_TAGLINE: &str = "사진 한 장으로, 아이에게 따뜻한 동기부여와 미소를 선물하세요.";
pub const UPLOAD_PROMPT: &str = "`photo <경로>` 명령으로 사진을 선택하세요";
pub const UPLOAD_GUIDANCE: [&str; 2] = [
    "더욱 자세한 분석을 위해 아이의 얼굴이 잘 나온 단독 사진을 업로드해주세요.",
    "업로드된 사진은 분석에만 사용되며, 분석 직후 즉시 삭제되니 안심하세요.",
];
pub const NAME_LABEL: &str = "이름 또는 닉네임";
pub const AGE_LABEL: &str = "학년 또는 나이";
pub const TRAITS_LABEL: &str = "아이의 특별한 점";
pub const ANALYZE_LABEL: &str = "새싹 분석";
pub const DEFAULT_CHILD_NAME: &str = "아이";
pub const RESULT_TITLE_SUFFIX: &str = "의 멋진 가능성의 발견!";
pub const RESULT_ACTIONS: [(&str, &str); 3] = [
    ("png", "이미지 저장"),
    ("pdf", "PDF 저장"),
    ("reset", "다시 시작"),
];

const SENTENCE_DELIMITER: &str = ". ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    Loading(&'static str),
    Result(Vec<String>),
}

pub fn derive_view(state: &AppState) -> ViewState {
    if state.is_in_flight() {
        return ViewState::Loading(state.loading_message());
    }
    match state.result.narrative() {
        Some(narrative) if !narrative.is_empty() => ViewState::Result(split_sentences(narrative)),
        _ => ViewState::Idle,
    }
}

/// Splits narrative text on the literal `". "`. Blank fragments are dropped,
/// the rest are trimmed, and every fragment but the last gets its period back.
/// Abbreviations and decimals split too; callers rely on that exact output.
pub fn split_sentences(text: &str) -> Vec<String> {
    let fragments: Vec<&str> = text
        .split(SENTENCE_DELIMITER)
        .filter(|fragment| !fragment.trim().is_empty())
        .collect();
    let last = fragments.len().saturating_sub(1);

    fragments
        .iter()
        .enumerate()
        .map(|(index, fragment)| {
            let trimmed = fragment.trim();
            if index < last {
                format!("{trimmed}.")
            } else {
                trimmed.to_string()
            }
        })
        .collect()
}

pub fn result_title(name: &str) -> String {
    let name = if name.trim().is_empty() {
        DEFAULT_CHILD_NAME
    } else {
        name
    };
    format!("{name}{RESULT_TITLE_SUFFIX}")
}

fn field_display(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn render_idle(state: &AppState) -> Vec<String> {
    let mut lines = vec![format!("🌱 {APP_TITLE}"), APP_TAGLINE.to_string(), String::new()];

    match state.form.image.as_ref() {
        Some(image) => {
            lines.push(format!(
                "📷 {} ({}, {} bytes)",
                image.file_name,
                image.mime_type,
                image.bytes.len()
            ));
            lines.push(format!("   {}", state.form.preview_url()));
        }
        None => {
            lines.push(format!("📷 {UPLOAD_PROMPT}"));
            lines.extend(UPLOAD_GUIDANCE.iter().map(|line| format!("   {line}")));
        }
    }

    lines.push(String::new());
    lines.push(format!("{NAME_LABEL}: {}", field_display(&state.form.name)));
    lines.push(format!("{AGE_LABEL}: {}", field_display(&state.form.age)));
    lines.push(format!("{TRAITS_LABEL}: {}", field_display(&state.form.traits)));

    if let Some(error) = state.result.error() {
        lines.push(String::new());
        lines.push(format!("⚠️  {error}"));
    }

    lines.push(String::new());
    let marker = if state.can_submit() { "▶" } else { "·" };
    lines.push(format!("{marker} [{ANALYZE_LABEL}] analyze"));
    lines
}

fn render_result(state: &AppState, fragments: &[String]) -> Vec<String> {
    let mut lines = vec![format!("🌟 {}", result_title(&state.form.name)), String::new()];
    lines.extend(fragments.iter().cloned());
    lines.push(String::new());
    lines.push(
        RESULT_ACTIONS
            .iter()
            .map(|(command, label)| format!("[{label}] {command}"))
            .collect::<Vec<_>>()
            .join("   "),
    );
    lines
}

pub fn render(state: &AppState) -> String {
    let lines = match derive_view(state) {
        ViewState::Idle => render_idle(state),
        ViewState::Loading(message) => vec![format!("⏳ {message}")],
        ViewState::Result(fragments) => render_result(state, &fragments),
    };
    lines.join("\n")
}
