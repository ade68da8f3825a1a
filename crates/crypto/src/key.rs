//! 数据密钥与密钥来源

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use zeroize::Zeroize;

use crate::artifact::EncryptedData;
use crate::CryptoError;

pub const KEY_LENGTH: usize = 32;

/// 默认密钥位置（相对工作目录）
pub const DEFAULT_KEY_PATH: &str = "config/encryption_key.key";

/// AES-256 数据密钥，离开作用域时清零
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct DataKey {
    bytes: [u8; KEY_LENGTH],
}

impl DataKey {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    /// 随机生成
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// 解析 URL-safe base64 编码的密钥
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if decoded.len() != KEY_LENGTH {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKey(format!(
                "长度应为 {} 字节，实际 {} 字节",
                KEY_LENGTH, len
            )));
        }
        let mut bytes = [0u8; KEY_LENGTH];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self { bytes })
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.bytes)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData, CryptoError> {
        EncryptedData::encrypt(&self.bytes, plaintext)
    }

    pub fn decrypt(&self, data: &EncryptedData) -> Option<Vec<u8>> {
        data.decrypt(&self.bytes)
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(***)")
    }
}

/// 可替换的密钥来源
pub trait KeySource: Send + Sync {
    fn load(&self) -> Result<DataKey, CryptoError>;
}

impl KeySource for DataKey {
    fn load(&self) -> Result<DataKey, CryptoError> {
        Ok(self.clone())
    }
}

/// 从文件读取 base64 密钥
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileKeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PATH)
    }
}

impl KeySource for FileKeyStore {
    fn load(&self) -> Result<DataKey, CryptoError> {
        let mut content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CryptoError::KeyNotFound(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Err(CryptoError::KeyNotFound(self.path.clone()));
        }
        let key = DataKey::from_base64(&content);
        content.zeroize();
        key
    }
}

/// 生成新密钥并写入 `path`，已存在时拒绝覆盖
pub fn generate_key(path: &Path) -> Result<DataKey, CryptoError> {
    if path.exists() {
        return Err(CryptoError::KeyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let key = DataKey::generate();
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(key.to_base64().as_bytes())?;
    file.sync_all()?;
    log::info!("[Key] 已生成新密钥: {}", path.display());
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::new(dir.path().join("none.key"));
        assert!(matches!(store.load(), Err(CryptoError::KeyNotFound(_))));
    }

    #[test]
    fn test_empty_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.key");
        fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            FileKeyStore::new(&path).load(),
            Err(CryptoError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.key");
        fs::write(&path, "not base64 at all!").unwrap();
        assert!(matches!(
            FileKeyStore::new(&path).load(),
            Err(CryptoError::InvalidKey(_))
        ));
        fs::write(&path, URL_SAFE.encode([1u8; 16])).unwrap();
        assert!(matches!(
            FileKeyStore::new(&path).load(),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_generate_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("encryption_key.key");
        let key = generate_key(&path).unwrap();
        let loaded = FileKeyStore::new(&path).load().unwrap();
        assert_eq!(key.to_base64(), loaded.to_base64());
        assert!(matches!(generate_key(&path), Err(CryptoError::KeyExists(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        assert_eq!(format!("{:?}", DataKey::generate()), "DataKey(***)");
    }
}
