//! 运行配置（YAML）
//!
//! 未知字段一律拒绝；`pii_patterns` 中未知的类型名同样报错。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shade_core::{CoreError, PiiTypeFilter};
use shade_crypto::CryptoError;

pub const DEFAULT_CONFIG_PATH: &str = "config/settings.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {0}")]
    NotFound(PathBuf),
    #[error("配置文件为空: {0}")]
    Empty(PathBuf),
    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("{0}")]
    UnknownKind(#[from] CoreError),
    #[error("密钥不可用: {0}")]
    Key(#[from] CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingConfig {
    #[serde(default = "default_true")]
    pub english_enabled: bool,
    #[serde(default = "default_true")]
    pub hindi_enabled: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            english_enabled: true,
            hindi_enabled: true,
        }
    }
}

/// 第二文字（天城文）处理
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HindiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// OCR 语言代码（`hi`、`en` 等）
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// 传给 NER 服务的模型名
    #[serde(default = "default_ner_model")]
    pub ner_model: String,
}

impl Default for HindiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            languages: default_languages(),
            ner_model: default_ner_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// 暂存目录所在的工作目录
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// 单次 OCR/NER 调用的超时（秒）
    #[serde(default = "default_collab_timeout")]
    pub collab_timeout_secs: u64,
    /// PDF 输出加密前校验文本层
    #[serde(default = "default_true")]
    pub verify_output: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            collab_timeout_secs: default_collab_timeout(),
            verify_output: true,
        }
    }
}

impl RuntimeConfig {
    pub fn collab_timeout(&self) -> Duration {
        Duration::from_secs(self.collab_timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    #[serde(default)]
    processing: ProcessingConfig,
    #[serde(default)]
    pii_patterns: BTreeMap<String, bool>,
    #[serde(default)]
    hindi_processing: HindiConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
}

/// 校验后的配置
#[derive(Debug, Clone)]
pub struct Settings {
    pub processing: ProcessingConfig,
    pub types: PiiTypeFilter,
    pub hindi: HindiConfig,
    pub runtime: RuntimeConfig,
}

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<String> {
    vec!["hi".to_string()]
}

fn default_ner_model() -> String {
    "ai4bharat/IndicNER".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_collab_timeout() -> u64 {
    120
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Err(ConfigError::Empty(path.to_path_buf()));
        }
        let settings = Self::from_yaml(&raw)?;
        log::info!(
            "[Config] 已加载 {}: english={}, hindi={}, 启用类型 {:?}",
            path.display(),
            settings.processing.english_enabled,
            settings.second_pass_enabled(),
            settings.types.enabled_kinds()
        );
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings = serde_yaml::from_str(raw)?;
        let types = PiiTypeFilter::from_raw(&raw.pii_patterns)?;
        Ok(Self {
            processing: raw.processing,
            types,
            hindi: raw.hindi_processing,
            runtime: raw.runtime,
        })
    }

    /// 第二遍需要总开关与 `hindi_processing.enabled` 同时打开
    pub fn second_pass_enabled(&self) -> bool {
        self.processing.hindi_enabled && self.hindi.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_core::PiiKind;

    const SAMPLE: &str = r#"
processing:
  english_enabled: true
  hindi_enabled: false
pii_patterns:
  aadhar: true
  pan: true
  person: false
  dob: true
hindi_processing:
  enabled: true
  languages: [hi, en]
runtime:
  work_dir: scratch
  collab_timeout_secs: 30
"#;

    #[test]
    fn test_parse_sample() {
        let s = Settings::from_yaml(SAMPLE).unwrap();
        assert!(s.processing.english_enabled);
        assert!(!s.second_pass_enabled());
        assert!(s.types.allows(PiiKind::Pan));
        assert!(!s.types.allows(PiiKind::Person));
        // 未列出的类型视为关闭
        assert!(!s.types.allows(PiiKind::Voter));
        assert_eq!(s.hindi.languages, vec!["hi", "en"]);
        assert_eq!(s.hindi.ner_model, "ai4bharat/IndicNER");
        assert_eq!(s.runtime.work_dir, PathBuf::from("scratch"));
        assert_eq!(s.runtime.collab_timeout(), Duration::from_secs(30));
        assert!(s.runtime.verify_output);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Settings::from_yaml("processing:\n  english_enabled: true\n  exec: rm\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let err = Settings::from_yaml("extra: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = Settings::from_yaml("pii_patterns:\n  ssn: true\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKind(_)));
    }

    #[test]
    fn test_missing_and_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(Settings::load(&missing), Err(ConfigError::NotFound(_))));

        let empty = dir.path().join("empty.yaml");
        fs::write(&empty, "  \n").unwrap();
        assert!(matches!(Settings::load(&empty), Err(ConfigError::Empty(_))));
    }
}
