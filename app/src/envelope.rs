//! 加密阶段封装
//!
//! 每一遍处理都走 `Encrypted → Decrypting → Decrypted → Processing → Redacted → Encrypting →
//! EncryptedOutput → Cleaned`。明文只存在于本遍的暂存目录中，函数返回前（无论成败）安全删除。

use std::fmt;
use std::path::Path;

use shade_crypto::{decrypt_to_staged, encrypt_staged, DataKey, EncryptedArtifact, StagingDir};

use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Encrypted,
    Decrypting,
    Decrypted,
    Processing,
    Redacted,
    Encrypting,
    EncryptedOutput,
    Cleaned,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Encrypted => "Encrypted",
            StageState::Decrypting => "Decrypting",
            StageState::Decrypted => "Decrypted",
            StageState::Processing => "Processing",
            StageState::Redacted => "Redacted",
            StageState::Encrypting => "Encrypting",
            StageState::EncryptedOutput => "EncryptedOutput",
            StageState::Cleaned => "Cleaned",
        };
        f.write_str(name)
    }
}

/// 状态迁移记录
#[derive(Debug)]
struct Envelope<'a> {
    label: &'a str,
    state: StageState,
    history: Vec<StageState>,
}

impl<'a> Envelope<'a> {
    fn new(label: &'a str) -> Self {
        log::debug!("[Envelope] {}: {}", label, StageState::Encrypted);
        Self {
            label,
            state: StageState::Encrypted,
            history: vec![StageState::Encrypted],
        }
    }

    fn enter(&mut self, next: StageState) {
        log::debug!("[Envelope] {}: {} -> {}", self.label, self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

/// 一遍处理的共享参数
pub struct PassEnvelope<'a> {
    pub key: &'a DataKey,
    pub work_dir: &'a Path,
    /// 日志中使用的标签，如 `photo.png#1`
    pub label: &'a str,
    /// 暂存文件扩展名（渲染器与 OCR 依赖它判断格式）
    pub extension: &'a str,
}

/// 一遍处理的结果
#[derive(Debug)]
pub struct PassResult<T> {
    pub artifact: EncryptedArtifact,
    pub value: T,
    pub states: Vec<StageState>,
}

impl<'a> PassEnvelope<'a> {
    /// 解密 `input` → `process(明文, 输出路径)` → 加密写入 `output`
    ///
    /// `process` 必须把结果写到给定的输出路径。
    pub fn run<T, F>(
        &self,
        stage_name: &str,
        input: &EncryptedArtifact,
        output: &Path,
        process: F,
    ) -> Result<PassResult<T>, PipelineError>
    where
        F: FnOnce(&Path, &Path) -> Result<T, PipelineError>,
    {
        let mut envelope = Envelope::new(self.label);
        let staging = StagingDir::create_in(self.work_dir)?;

        let result = (|| {
            envelope.enter(StageState::Decrypting);
            let decrypted = decrypt_to_staged(
                self.key,
                input,
                &staging,
                &format!("decrypted_{}.{}", stage_name, self.extension),
            )?;
            envelope.enter(StageState::Decrypted);

            envelope.enter(StageState::Processing);
            let redacted = staging.adopt(&format!("redacted_{}.{}", stage_name, self.extension));
            let value = process(decrypted.path(), redacted.path())?;
            envelope.enter(StageState::Redacted);

            envelope.enter(StageState::Encrypting);
            let artifact = encrypt_staged(self.key, &redacted, output)?;
            envelope.enter(StageState::EncryptedOutput);
            Ok::<_, PipelineError>((artifact, value))
        })();

        if let Err(e) = &result {
            log::warn!("[Envelope] {}: 在 {} 阶段失败: {}", self.label, envelope.state, e);
        }
        // 暂存文件已随闭包结束删除，这里移除目录本身
        drop(staging);
        envelope.enter(StageState::Cleaned);

        let (artifact, value) = result?;
        Ok(PassResult {
            artifact,
            value,
            states: envelope.history,
        })
    }
}
