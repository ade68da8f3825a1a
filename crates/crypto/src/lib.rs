//! 加密封装：数据密钥、密文工件、解密暂存文件与安全删除。
//!
//! 密文格式：`[12 字节 nonce][AES-256-GCM 密文 + 16 字节认证标签]`。

pub mod artifact;
pub mod key;
pub mod staging;

use std::path::PathBuf;

pub use artifact::{decrypt_to_staged, encrypt_file, encrypt_staged, EncryptedArtifact, EncryptedData};
pub use key::{generate_key, DataKey, FileKeyStore, KeySource, DEFAULT_KEY_PATH, KEY_LENGTH};
pub use staging::{secure_delete_file, sweep_orphans, StagedFile, StagingDir, STAGING_PREFIX};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("密钥文件不存在或为空: {0}")]
    KeyNotFound(PathBuf),
    #[error("密钥格式无效: {0}")]
    InvalidKey(String),
    #[error("密钥文件已存在，拒绝覆盖: {0}")]
    KeyExists(PathBuf),
    #[error("密文无效或已被篡改: {0}")]
    InvalidCiphertext(PathBuf),
    #[error("源文件不存在: {0}")]
    SourceMissing(PathBuf),
    #[error("加密失败")]
    EncryptionFailed,
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}
