//! 文件类型与命名规则
//!
//! - 加密输入：`photo.png.enc`
//! - 输出：`photo.png_redacted.enc`
//! - 调试解密：`decrypted_photo.png_redacted.png`

use std::path::Path;

pub const ENCRYPTED_SUFFIX: &str = ".enc";
pub const REDACTED_SUFFIX: &str = "_redacted.enc";
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["pdf", "png", "jpg", "jpeg", "bmp", "tiff"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Raster,
}

/// 小写扩展名（不含点）
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn media_kind(name: &str) -> Option<MediaKind> {
    match extension_of(name)?.as_str() {
        "pdf" => Some(MediaKind::Pdf),
        ext if SUPPORTED_EXTENSIONS.contains(&ext) => Some(MediaKind::Raster),
        _ => None,
    }
}

/// `photo.png.enc` → `photo.png`
pub fn original_name(encrypted_name: &str) -> Option<&str> {
    encrypted_name
        .strip_suffix(ENCRYPTED_SUFFIX)
        .filter(|n| !n.is_empty())
}

/// `photo.png` → `photo.png_redacted.enc`
pub fn output_name(original: &str) -> String {
    format!("{}{}", original, REDACTED_SUFFIX)
}

/// `photo.png_redacted.enc` → `decrypted_photo.png_redacted.png`
///
/// 非图片/PDF 扩展名回退为 `png`。
pub fn review_name(redacted_name: &str) -> Option<String> {
    let original = redacted_name
        .strip_suffix(REDACTED_SUFFIX)
        .filter(|n| !n.is_empty())?;
    let ext = extension_of(original)
        .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| "png".to_string());
    Some(format!("decrypted_{}_redacted.{}", original, ext))
}
