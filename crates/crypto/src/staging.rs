//! 解密暂存：每个文件独立的临时目录、随作用域销毁的明文文件、安全删除

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::rand_core::{OsRng, RngCore};

use crate::CryptoError;

/// 暂存目录名前缀，启动时据此清理上次崩溃遗留的目录
pub const STAGING_PREFIX: &str = "shade-staging-";

/// 单个文件的暂存目录
///
/// 销毁时先安全删除其中所有文件，再移除目录本身。
#[derive(Debug)]
pub struct StagingDir {
    dir: tempfile::TempDir,
}

impl StagingDir {
    pub fn create_in(work_dir: &Path) -> Result<Self, CryptoError> {
        fs::create_dir_all(work_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(work_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700))?;
        }
        log::debug!("[Staging] 创建暂存目录: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// 写入明文，返回受守护的暂存文件
    pub fn write(&self, file_name: &str, bytes: &[u8]) -> Result<StagedFile, CryptoError> {
        let staged = self.adopt(file_name);
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(staged.path())?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(staged)
    }

    /// 登记一个将由其他组件写入的暂存路径
    pub fn adopt(&self, file_name: &str) -> StagedFile {
        StagedFile {
            path: self.dir.path().join(file_name),
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let cleaned = clean_staging_dir(self.dir.path());
        log::debug!(
            "[Staging] 销毁暂存目录 {}，安全删除 {} 个文件",
            self.dir.path().display(),
            cleaned
        );
    }
}

/// 暂存的明文文件，离开作用域时覆盖后删除
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = secure_delete_file(&self.path) {
            log::warn!("[Staging] 删除暂存文件失败 {}: {}", self.path.display(), e);
        }
    }
}

/// 随机字节覆盖、落盘，再删除；文件不存在视为成功
pub fn secure_delete_file(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let file_size = fs::metadata(path)?.len() as usize;
    if file_size > 0 {
        let mut random_buf = vec![0u8; file_size.min(64 * 1024)];
        let mut file = fs::OpenOptions::new().write(true).open(path)?;
        let mut remaining = file_size;
        while remaining > 0 {
            let chunk = remaining.min(random_buf.len());
            OsRng.fill_bytes(&mut random_buf[..chunk]);
            if let Err(e) = file.write_all(&random_buf[..chunk]) {
                log::warn!("[Staging] 覆盖写失败 {}: {}", path.display(), e);
                break;
            }
            remaining -= chunk;
        }
        if let Err(e) = file.sync_all() {
            log::warn!("[Staging] 覆盖后同步失败 {}: {}", path.display(), e);
        }
    }

    fs::remove_file(path)
}

/// 递归安全删除目录内所有文件，返回删除数量
fn clean_staging_dir(dir: &Path) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return 0,
    };
    let mut cleaned = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            cleaned += clean_staging_dir(&path);
            let _ = fs::remove_dir(&path);
        } else if secure_delete_file(&path).is_ok() {
            cleaned += 1;
        }
    }
    cleaned
}

/// 清理工作目录中上次运行遗留的暂存目录
pub fn sweep_orphans(work_dir: &Path) -> usize {
    let entries = match fs::read_dir(work_dir) {
        Ok(e) => e,
        Err(_) => return 0,
    };
    let mut cleaned = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_staging = entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with(STAGING_PREFIX))
            .unwrap_or(false);
        if !is_staging || !path.is_dir() {
            continue;
        }
        cleaned += clean_staging_dir(&path);
        if let Err(e) = fs::remove_dir_all(&path) {
            log::warn!("[Staging] 移除遗留目录失败 {}: {}", path.display(), e);
        }
    }
    if cleaned > 0 {
        log::info!("[Staging] 清理上次运行遗留的 {} 个暂存文件", cleaned);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_file_deleted_on_drop() {
        let work = tempfile::tempdir().unwrap();
        let staging = StagingDir::create_in(work.path()).unwrap();
        let path = {
            let staged = staging.write("decrypted_input.png", b"plaintext").unwrap();
            assert!(staged.exists());
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_staging_dir_removed_with_untracked_files() {
        let work = tempfile::tempdir().unwrap();
        let dir_path = {
            let staging = StagingDir::create_in(work.path()).unwrap();
            fs::write(staging.path().join("page-0.png"), b"render").unwrap();
            staging.path().to_path_buf()
        };
        assert!(!dir_path.exists());
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_secure_delete_missing_is_ok() {
        let work = tempfile::tempdir().unwrap();
        assert!(secure_delete_file(&work.path().join("nothing")).is_ok());
    }

    #[test]
    fn test_sweep_orphans_only_touches_staging_dirs() {
        let work = tempfile::tempdir().unwrap();
        let orphan = work.path().join(format!("{}abc123", STAGING_PREFIX));
        fs::create_dir_all(orphan.join("nested")).unwrap();
        fs::write(orphan.join("decrypted_input.pdf"), b"secret").unwrap();
        fs::write(orphan.join("nested").join("page.png"), b"secret").unwrap();
        let keep = work.path().join("keep.txt");
        fs::write(&keep, b"not ours").unwrap();

        assert_eq!(sweep_orphans(work.path()), 2);
        assert!(!orphan.exists());
        assert!(keep.exists());
    }
}
