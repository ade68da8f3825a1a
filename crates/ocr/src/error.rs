//! OCR 错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR 引擎不可用: {0}")]
    EngineUnavailable(String),

    #[error("图像处理失败: {0}")]
    ImageProcess(String),

    #[error("PDF 渲染失败: {0}")]
    Render(String),

    #[error("识别失败: {0}")]
    Recognition(String),

    #[error("暂存失败: {0}")]
    Staging(String),

    #[error("识别已取消")]
    Cancelled,

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}
