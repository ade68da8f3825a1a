use shade_core::RedactionError;
use shade_crypto::CryptoError;

use crate::config::ConfigError;

/// 流水线错误
///
/// `Config` 在处理任何文件之前出现，终止整次运行；其余错误只影响当前文件。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    #[error("密文处理失败: {0}")]
    Ciphertext(#[from] CryptoError),
    #[error("文本/实体提取失败: {0}")]
    ExtractionFailed(String),
    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),
    #[error("脱敏渲染失败: {0}")]
    RedactionFailed(#[from] RedactionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
