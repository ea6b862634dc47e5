pub mod gemini;
pub mod media;

pub use gemini::{AnalysisBackend, AnalysisError, AnalysisRequest, GeminiAnalyzer};
