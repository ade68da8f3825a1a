//! Shade Redact
//!
//! 加密的扫描件/PDF → 解密暂存 → PII 检测与不可逆涂黑 → 重新加密。

mod collab;
mod config;
mod envelope;
mod error;
mod media;
mod ner;
mod orchestrator;
mod pass;

pub use collab::{call_with_timeout, tesseract_languages, Collaborators, SecondaryCollaborators};
pub use config::{
    ConfigError, HindiConfig, ProcessingConfig, RuntimeConfig, Settings, DEFAULT_CONFIG_PATH,
};
pub use envelope::{PassEnvelope, PassResult, StageState};
pub use error::PipelineError;
pub use media::{media_kind, output_name, review_name, MediaKind, SUPPORTED_EXTENSIONS};
pub use ner::HttpNerClient;
pub use orchestrator::{
    decrypt_outputs_for_review, encrypt_inputs, list_encrypted_inputs, BatchSummary, CancelFlag,
    FileOutcome, Pipeline, SkipReason,
};

use shade_core::mask_snippet;

/// 设置后 debug 日志输出完整实体文本
pub const LOG_FULL_TEXT_ENV: &str = "SHADE_LOG_FULL_TEXT";

/// 初始化日志：`RUST_LOG` 控制级别，默认 `info`；`log` 记录经桥接输出
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

/// 日志中的实体文本，默认掩码
pub(crate) fn loggable(text: &str) -> String {
    if std::env::var_os(LOG_FULL_TEXT_ENV).is_some() {
        text.to_string()
    } else {
        mask_snippet(text)
    }
}
