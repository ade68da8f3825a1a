//! OCR 协作方
//!
//! 定义文本行/单词片段提取接口，并提供基于 Tesseract CLI 的实现。

mod error;
pub mod raster;
pub mod script;
pub mod tesseract;

pub use error::OcrError;
pub use script::{is_devanagari, retain_devanagari};
pub use tesseract::{TesseractConfig, TesseractEngine};

use shade_core::{CancelFlag, TextLine, WordFragment};
use std::path::Path;

/// 主 OCR：按行返回文本与边界框
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<TextLine>, OcrError>;

    /// 可中断的识别：`cancel` 置位后尽快返回，不再读写 `path` 所在目录
    fn extract_cancellable(&self, path: &Path, cancel: &CancelFlag) -> Result<Vec<TextLine>, OcrError> {
        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }
        self.extract(path)
    }
}

/// 第二文字 OCR：返回单词片段
pub trait FragmentExtractor: Send + Sync {
    fn extract_fragments(&self, path: &Path) -> Result<Vec<WordFragment>, OcrError>;

    fn extract_fragments_cancellable(
        &self,
        path: &Path,
        cancel: &CancelFlag,
    ) -> Result<Vec<WordFragment>, OcrError> {
        if cancel.is_cancelled() {
            return Err(OcrError::Cancelled);
        }
        self.extract_fragments(path)
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}
