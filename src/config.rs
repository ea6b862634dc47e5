use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub gemini_timeout_seconds: u64,
    pub loading_message_interval_ms: u64,
    pub export_dir: PathBuf,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str, default: &str) -> PathBuf {
    let value = env_string(name, default);
    let trimmed = value.trim();
    if trimmed.is_empty() {
        PathBuf::from(default)
    } else {
        PathBuf::from(trimmed)
    }
}

fn resolve_api_key() -> String {
    ["GEMINI_API_KEY", "API_KEY"]
        .iter()
        .filter_map(|name| env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn normalize_api_base(value: String) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_GEMINI_API_BASE.to_string();
    }
    trimmed.to_string()
}

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const MIN_LOADING_INTERVAL_MS: u64 = 100;

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: env_path("LOG_DIR", "logs"),
            gemini_api_key: resolve_api_key(),
            gemini_model: env_string("GEMINI_MODEL", "gemini-2.5-flash")
                .trim()
                .to_string(),
            gemini_api_base: normalize_api_base(env_string(
                "GEMINI_API_BASE",
                DEFAULT_GEMINI_API_BASE,
            )),
            gemini_timeout_seconds: env_u64("GEMINI_TIMEOUT_SECONDS", 90).max(1),
            loading_message_interval_ms: env_u64("LOADING_MESSAGE_INTERVAL_MS", 2500)
                .max(MIN_LOADING_INTERVAL_MS),
            export_dir: env_path("EXPORT_DIR", "."),
        })
    }
}

pub const ANALYSIS_SYSTEM_PROMPT: &str = "당신은 'MINDSPROUT'입니다. 선생님과 부모님을 위한 친절하고 격려하는 AI 어시스턴트입니다. 당신의 목적은 아이의 사진과 제공된 이름, 나이, 특징을 분석하여 긍정적이고, 힘을 북돋아 주며, 동기를 부여하는 개인화된 분석을 생성하는 것입니다. 당신의 어조는 현명하고 친절한 이야기꾼처럼 부드럽고, 창의적이며, 영감을 주어야 합니다. 절대로 부정적이거나 비판으로 오해될 수 있는 말은 하지 마세요. 잠재력, 창의성, 그리고 독특한 강점에 초점을 맞추세요. 관찰한 내용을 재미있고 상상력이 풍부한 해석으로 표현하세요. 짧고 긍정적이며 한두 문단 길이로 유지하세요.";

pub const ANALYSIS_PROMPT_TEMPLATE: &str = "이 아이의 이름은 '{name}'이고, 나이는 '{age}'입니다. 아이의 특징은 '{traits}' 입니다. 이 정보와 사진을 바탕으로, 이 아이의 멋진 잠재력에 대한 재미있고 긍정적인 분석을 작성해주세요. 예를 들어, 아이의 눈이 반짝인다면 호기심의 불꽃을 가지고 있다고 말할 수 있습니다. 만약 아이가 웃고 있다면, 다른 사람에게도 전염되는 즐거움을 가지고 있다고 언급할 수 있습니다. 이름, 나이, 특징을 분석에 자연스럽게 녹여주세요.";

pub const MISSING_FIELD_PLACEHOLDER: &str = "제공되지 않음";
pub const MISSING_TRAITS_PLACEHOLDER: &str = "제공된 특징 없음";

pub const INVALID_IMAGE_MESSAGE: &str = "올바른 이미지 파일을 업로드해주세요.";
pub const MISSING_IMAGE_MESSAGE: &str = "먼저 이미지를 업로드해주세요.";
pub const REQUEST_FAILURE_MESSAGE: &str = "앗! AI가 잠시 휴식 중이에요. 잠시 후 다시 시도해주세요.";

pub const LOADING_MESSAGES: [&str; 4] = [
    "AI가 사진을 자세히 살펴보고 있어요...",
    "놀라운 장점들을 찾아내고 있어요...",
    "특별한 메시지를 만들고 있어요...",
    "밝은 미래를 그리고 있어요...",
];

pub const EXPORT_PNG_FILE_NAME: &str = "mindsprout-analysis.png";
pub const EXPORT_PDF_FILE_NAME: &str = "mindsprout-analysis.pdf";
