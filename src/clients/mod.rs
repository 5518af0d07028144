pub mod guideline;
pub mod llm;
pub mod ocr;
pub mod pii;

pub use guideline::GuidelineClient;
pub use llm::{LlmClient, LlmResponse};
pub use ocr::{OcrClient, OcrResponse};
pub use pii::{PiiClient, PiiResponse};
