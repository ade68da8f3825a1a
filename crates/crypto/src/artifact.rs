//! 密文工件：加密/解密文件，写入一律原子化

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::key::{DataKey, KEY_LENGTH};
use crate::staging::{StagedFile, StagingDir};
use crate::CryptoError;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// nonce + 密文（含认证标签）
#[derive(Debug, Clone)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    pub(crate) fn encrypt(key_bytes: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(Self { nonce, ciphertext })
    }

    /// 认证失败返回 `None`
    pub(crate) fn decrypt(&self, key_bytes: &[u8; KEY_LENGTH]) -> Option<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
        cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .ok()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_LENGTH + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < NONCE_LENGTH + TAG_LENGTH {
            return None;
        }
        let mut nonce = [0u8; NONCE_LENGTH];
        nonce.copy_from_slice(&bytes[..NONCE_LENGTH]);
        Some(Self {
            nonce,
            ciphertext: bytes[NONCE_LENGTH..].to_vec(),
        })
    }
}

/// 磁盘上的密文句柄，不携带密钥
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedArtifact {
    path: PathBuf,
}

impl EncryptedArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// 解密到暂存目录，返回随作用域删除的 `StagedFile`
pub fn decrypt_to_staged(
    key: &DataKey,
    artifact: &EncryptedArtifact,
    staging: &StagingDir,
    file_name: &str,
) -> Result<StagedFile, CryptoError> {
    let bytes = match fs::read(artifact.path()) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CryptoError::SourceMissing(artifact.path().to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let plaintext = EncryptedData::from_bytes(&bytes)
        .and_then(|data| key.decrypt(&data))
        .ok_or_else(|| CryptoError::InvalidCiphertext(artifact.path().to_path_buf()))?;
    staging.write(file_name, &plaintext)
}

/// 加密暂存文件并原子写入 `dest`
pub fn encrypt_staged(
    key: &DataKey,
    staged: &StagedFile,
    dest: &Path,
) -> Result<EncryptedArtifact, CryptoError> {
    encrypt_file(key, staged.path(), dest)
}

/// 加密任意明文文件并原子写入 `dest`
pub fn encrypt_file(
    key: &DataKey,
    plaintext_path: &Path,
    dest: &Path,
) -> Result<EncryptedArtifact, CryptoError> {
    let plaintext = match fs::read(plaintext_path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CryptoError::SourceMissing(plaintext_path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let encrypted = key.encrypt(&plaintext)?;
    write_atomic(dest, &encrypted.to_bytes())?;
    Ok(EncryptedArtifact::new(dest))
}

/// 先写同目录临时文件再重命名，中断不会损坏已有输出
fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), CryptoError> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| CryptoError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let key = DataKey::generate();
        let plain = dir.path().join("photo.png");
        fs::write(&plain, b"fake image bytes").unwrap();

        let artifact = encrypt_file(&key, &plain, &dir.path().join("photo.png.enc")).unwrap();
        let on_disk = fs::read(artifact.path()).unwrap();
        assert_ne!(&on_disk[..], b"fake image bytes");

        let staging = StagingDir::create_in(dir.path()).unwrap();
        let staged = decrypt_to_staged(&key, &artifact, &staging, "decrypted_input.png").unwrap();
        assert_eq!(fs::read(staged.path()).unwrap(), b"fake image bytes");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let key = DataKey::generate();
        let plain = dir.path().join("a.pdf");
        fs::write(&plain, b"%PDF-1.5 ...").unwrap();
        let artifact = encrypt_file(&key, &plain, &dir.path().join("a.pdf.enc")).unwrap();

        let mut bytes = fs::read(artifact.path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(artifact.path(), &bytes).unwrap();

        let staging = StagingDir::create_in(dir.path()).unwrap();
        let err = decrypt_to_staged(&key, &artifact, &staging, "x.pdf").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidCiphertext(_)));
    }

    #[test]
    fn test_truncated_and_wrong_key() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingDir::create_in(dir.path()).unwrap();
        let short = dir.path().join("short.enc");
        fs::write(&short, b"tiny").unwrap();
        let key = DataKey::generate();
        assert!(matches!(
            decrypt_to_staged(&key, &EncryptedArtifact::new(&short), &staging, "a"),
            Err(CryptoError::InvalidCiphertext(_))
        ));

        let plain = dir.path().join("b.png");
        fs::write(&plain, b"data").unwrap();
        let artifact = encrypt_file(&key, &plain, &dir.path().join("b.png.enc")).unwrap();
        assert!(matches!(
            decrypt_to_staged(&DataKey::generate(), &artifact, &staging, "b"),
            Err(CryptoError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingDir::create_in(dir.path()).unwrap();
        let artifact = EncryptedArtifact::new(dir.path().join("gone.enc"));
        assert!(matches!(
            decrypt_to_staged(&DataKey::generate(), &artifact, &staging, "x"),
            Err(CryptoError::SourceMissing(_))
        ));
        assert!(matches!(
            encrypt_file(&DataKey::generate(), &dir.path().join("gone"), &dir.path().join("o.enc")),
            Err(CryptoError::SourceMissing(_))
        ));
    }

    #[test]
    fn test_encrypt_overwrites_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let key = DataKey::generate();
        let dest = dir.path().join("out.enc");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second").unwrap();
        encrypt_file(&key, &a, &dest).unwrap();
        let artifact = encrypt_file(&key, &b, &dest).unwrap();

        let staging = StagingDir::create_in(dir.path()).unwrap();
        let staged = decrypt_to_staged(&key, &artifact, &staging, "out").unwrap();
        assert_eq!(fs::read(staged.path()).unwrap(), b"second");
    }
}
