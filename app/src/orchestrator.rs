//! 批处理编排
//!
//! 顺序处理每个加密输入，每个输入恰好产生一个 `FileOutcome`；单个文件失败不影响其余文件。

use std::fs;
use std::path::{Path, PathBuf};

pub use shade_core::CancelFlag;
use shade_core::PiiEntity;
use shade_crypto::{encrypt_file, sweep_orphans, DataKey, EncryptedArtifact, EncryptedData, KeySource};

use crate::collab::Collaborators;
use crate::config::{ConfigError, Settings};
use crate::envelope::PassEnvelope;
use crate::media::{self, MediaKind, ENCRYPTED_SUFFIX, REDACTED_SUFFIX};
use crate::pass::PassContext;
use crate::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// 文件名不以 `.enc` 结尾
    NotEncrypted,
    UnsupportedFormat(String),
    Cancelled,
}

#[derive(Debug)]
pub enum FileOutcome {
    Succeeded {
        input: PathBuf,
        output: PathBuf,
        entities_redacted: usize,
        passes: u8,
        warnings: Vec<String>,
    },
    Skipped {
        input: PathBuf,
        reason: SkipReason,
    },
    Failed {
        input: PathBuf,
        error: PipelineError,
    },
}

impl FileOutcome {
    pub fn input(&self) -> &Path {
        match self {
            FileOutcome::Succeeded { input, .. }
            | FileOutcome::Skipped { input, .. }
            | FileOutcome::Failed { input, .. } => input,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Succeeded { .. })
    }
}

/// 批处理汇总
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn of(outcomes: &[FileOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Succeeded { .. } => summary.succeeded += 1,
                FileOutcome::Skipped { .. } => summary.skipped += 1,
                FileOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

pub struct Pipeline {
    settings: Settings,
    key: DataKey,
    collaborators: Collaborators,
}

impl Pipeline {
    /// 读取密钥；密钥缺失属于配置错误，任何文件都不会被处理
    pub fn new(
        settings: Settings,
        keys: &dyn KeySource,
        collaborators: Collaborators,
    ) -> Result<Self, PipelineError> {
        let key = keys.load().map_err(ConfigError::from)?;
        if settings.second_pass_enabled() && collaborators.secondary.is_none() {
            log::warn!("[Batch] 已启用第二遍，但未提供第二文字协作方，第二遍将原样输出");
        }
        Ok(Self {
            settings,
            key,
            collaborators,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 加密 `input_dir` 中的明文输入后处理其中全部 `.enc`
    ///
    /// 配置与密钥在构造流水线时已校验，校验失败不会写出任何密文。
    pub fn encrypt_and_process(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        cancel: &CancelFlag,
    ) -> Result<Vec<FileOutcome>, PipelineError> {
        encrypt_inputs(input_dir, &self.key)?;
        let inputs = list_encrypted_inputs(input_dir)?;
        Ok(self.process_all(&inputs, output_dir, cancel))
    }

    /// 处理全部输入，输出写入 `output_dir`
    pub fn process_all(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        cancel: &CancelFlag,
    ) -> Vec<FileOutcome> {
        let work_dir = self.settings.runtime.work_dir.as_path();
        let created_work_dir = !work_dir.exists();
        sweep_orphans(work_dir);

        if let Err(e) = fs::create_dir_all(output_dir) {
            log::error!("[Batch] 无法创建输出目录 {}: {}", output_dir.display(), e);
        }

        let mut outcomes = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("[Batch] 已取消，剩余 {} 个文件跳过", inputs.len() - index);
                outcomes.extend(inputs[index..].iter().map(|input| FileOutcome::Skipped {
                    input: input.clone(),
                    reason: SkipReason::Cancelled,
                }));
                break;
            }
            log::info!("[Batch] ({}/{}) {}", index + 1, inputs.len(), input.display());
            let outcome = self.process_file(input, output_dir);
            match &outcome {
                FileOutcome::Succeeded {
                    output,
                    entities_redacted,
                    ..
                } => log::info!(
                    "[Batch] 完成 {} -> {}（{} 个实体）",
                    input.display(),
                    output.display(),
                    entities_redacted
                ),
                FileOutcome::Skipped { reason, .. } => {
                    log::warn!("[Batch] 跳过 {}: {:?}", input.display(), reason)
                }
                FileOutcome::Failed { error, .. } => {
                    log::error!("[Batch] 失败 {}: {}", input.display(), error)
                }
            }
            outcomes.push(outcome);
        }

        self.cleanup_work_dir(work_dir, created_work_dir);
        let summary = BatchSummary::of(&outcomes);
        log::info!(
            "[Batch] 结束: 成功 {}, 跳过 {}, 失败 {}",
            summary.succeeded,
            summary.skipped,
            summary.failed
        );
        outcomes
    }

    fn cleanup_work_dir(&self, work_dir: &Path, created: bool) {
        sweep_orphans(work_dir);
        if !created {
            return;
        }
        match fs::remove_dir_all(work_dir) {
            Ok(()) => log::debug!("[Batch] 已移除工作目录 {}", work_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[Batch] 移除工作目录失败 {}: {}", work_dir.display(), e),
        }
    }

    /// 处理单个加密输入
    pub fn process_file(&self, input: &Path, output_dir: &Path) -> FileOutcome {
        let file_name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let original = match media::original_name(&file_name) {
            Some(o) => o.to_string(),
            None => {
                return FileOutcome::Skipped {
                    input: input.to_path_buf(),
                    reason: SkipReason::NotEncrypted,
                }
            }
        };
        let media = match media::media_kind(&original) {
            Some(m) => m,
            None => {
                return FileOutcome::Skipped {
                    input: input.to_path_buf(),
                    reason: SkipReason::UnsupportedFormat(
                        media::extension_of(&original).unwrap_or_default(),
                    ),
                }
            }
        };

        let output = output_dir.join(media::output_name(&original));
        match self.run_passes(input, &output, &original, media) {
            Ok((entities, passes, warnings)) => FileOutcome::Succeeded {
                input: input.to_path_buf(),
                output,
                entities_redacted: entities.len(),
                passes,
                warnings,
            },
            Err(error) => FileOutcome::Failed {
                input: input.to_path_buf(),
                error,
            },
        }
    }

    fn run_passes(
        &self,
        input: &Path,
        output: &Path,
        original: &str,
        media: MediaKind,
    ) -> Result<(Vec<PiiEntity>, u8, Vec<String>), PipelineError> {
        let extension = media::extension_of(original).unwrap_or_default();
        let first_label = format!("{}#1", original);
        let first = PassEnvelope {
            key: &self.key,
            work_dir: &self.settings.runtime.work_dir,
            label: &first_label,
            extension: &extension,
        };
        let context = PassContext {
            settings: &self.settings,
            collaborators: &self.collaborators,
            media,
            label: &first_label,
        };
        let pass1 = first.run("input", &EncryptedArtifact::new(input), output, |src, dest| {
            context.primary(src, dest)
        })?;
        let mut entities = pass1.value.entities;
        let mut warnings = pass1.value.warnings;

        if !self.settings.second_pass_enabled() {
            return Ok((entities, 1, warnings));
        }

        // 第二遍以第一遍的密文输出为输入，并覆盖同一输出路径
        let second_label = format!("{}#2", original);
        let second = PassEnvelope {
            label: &second_label,
            ..first
        };
        let context = PassContext {
            label: &second_label,
            ..context
        };
        let covered = entities.clone();
        let pass2 = second.run("redacted_input", &pass1.artifact, output, |src, dest| {
            context.secondary(&covered, src, dest)
        });
        match pass2 {
            Ok(result) => {
                entities.extend(result.value.entities);
                warnings.extend(result.value.warnings);
                Ok((entities, 2, warnings))
            }
            Err(e) => {
                // 不保留只完成一遍的输出
                if let Err(rm) = fs::remove_file(output) {
                    log::warn!("[Batch] 移除未完成的输出失败 {}: {}", output.display(), rm);
                }
                Err(e)
            }
        }
    }
}

/// 列出目录中的 `.enc` 输入（排除 `_redacted.enc` 输出），按文件名排序
pub fn list_encrypted_inputs(input_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(input_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(ENCRYPTED_SUFFIX) && !n.ends_with(REDACTED_SUFFIX))
                .unwrap_or(false)
        })
        .collect();
    inputs.sort();
    Ok(inputs)
}

/// 把目录中所有受支持的明文文件加密为同目录下的 `<name>.enc`
pub fn encrypt_inputs(input_dir: &Path, key: &DataKey) -> Result<Vec<EncryptedArtifact>, PipelineError> {
    let mut plaintexts: Vec<PathBuf> = fs::read_dir(input_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(media::media_kind)
                .is_some()
        })
        .collect();
    plaintexts.sort();

    if plaintexts.is_empty() {
        log::warn!("[Encrypt] {} 中没有受支持的文件", input_dir.display());
    }
    let mut artifacts = Vec::with_capacity(plaintexts.len());
    for path in plaintexts {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(ENCRYPTED_SUFFIX);
        let dest = path.with_file_name(name);
        let artifact = encrypt_file(key, &path, &dest)?;
        log::info!("[Encrypt] {} -> {}", path.display(), dest.display());
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

/// 把 `_redacted.enc` 输出解密为 `decrypted_<original>_redacted.<ext>`，仅供人工核查
pub fn decrypt_outputs_for_review(output_dir: &Path, key: &DataKey) -> Result<Vec<PathBuf>, PipelineError> {
    let mut written = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(output_dir)?.flatten().map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        let Some(review) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(media::review_name)
        else {
            continue;
        };
        let bytes = fs::read(&path)?;
        let plaintext = EncryptedData::from_bytes(&bytes)
            .and_then(|data| key.decrypt(&data))
            .ok_or_else(|| shade_crypto::CryptoError::InvalidCiphertext(path.clone()))?;
        let dest = output_dir.join(&review);
        fs::write(&dest, plaintext)?;
        log::info!("[Review] {} -> {}", path.display(), dest.display());
        written.push(dest);
    }
    Ok(written)
}
