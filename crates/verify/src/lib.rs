//! 脱敏后校验
//!
//! 重新读取输出 PDF 的文本层，检查已脱敏实体的原文是否仍然可被提取。
//! 图片没有文本层，直接视为通过。

use std::path::Path;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use shade_core::{mask_snippet, PiiEntity};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("无法读取输出文件 {path}: {reason}")]
    Load { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// 在文本层中搜索残留原文
    pub text_search: bool,
    /// 短于此长度（去空白后字符数）的实体不参与搜索，避免误报
    pub min_chars: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            text_search: true,
            min_chars: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResult {
    pub ok: bool,
    pub warnings: Vec<String>,
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 某页文本层（按显示顺序拼接，去空白、小写）
fn page_text(doc: &Document, page_no: u32, page_id: lopdf::ObjectId) -> String {
    let mut text = doc.extract_text(&[page_no]).unwrap_or_default();
    // 简单字体下 extract_text 可能为空，补充原始字节
    if let Ok(content) = shade_pdf::get_page_content(doc, page_id) {
        for s in shade_pdf::shown_strings(&content) {
            text.push_str(&String::from_utf8_lossy(&s));
        }
    }
    squash(&text)
}

/// 校验输出文件
pub fn verify_output(
    output_path: &Path,
    entities: &[PiiEntity],
    options: &VerifyOptions,
) -> Result<VerifyResult, VerifyError> {
    let mut result = VerifyResult {
        ok: true,
        warnings: Vec::new(),
    };
    let is_pdf = output_path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !options.text_search || !is_pdf {
        return Ok(result);
    }

    let doc = Document::load(output_path).map_err(|e| VerifyError::Load {
        path: output_path.display().to_string(),
        reason: e.to_string(),
    })?;

    for (index, (page_no, page_id)) in doc.get_pages().into_iter().enumerate() {
        let needles: Vec<&PiiEntity> = entities
            .iter()
            .filter(|e| e.page == index && squash(&e.text).chars().count() >= options.min_chars)
            .collect();
        if needles.is_empty() {
            continue;
        }
        let text = page_text(&doc, page_no, page_id);
        for entity in needles {
            if text.contains(&squash(&entity.text)) {
                let warning = format!(
                    "第 {} 页仍可提取 {} 文本: {}",
                    page_no,
                    entity.kind,
                    mask_snippet(&entity.text)
                );
                log::warn!("[Verify] {}", warning);
                result.warnings.push(warning);
                result.ok = false;
            }
        }
    }

    if result.ok {
        log::debug!("[Verify] {} 校验通过", output_path.display());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use shade_core::{BoundingBox, EntitySource, PiiKind};

    fn write_pdf(dir: &Path, text: &str) -> std::path::PathBuf {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(lopdf::Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let path = dir.join("out.pdf");
        doc.save(&path).unwrap();
        path
    }

    fn pan(text: &str) -> PiiEntity {
        PiiEntity {
            kind: PiiKind::Pan,
            text: text.to_string(),
            bbox: BoundingBox::new(0.2, 0.1, 0.1, 0.02),
            page: 0,
            source: EntitySource::Pattern,
        }
    }

    #[test]
    fn test_residual_text_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "PAN ABCDE1234F");
        let result = verify_output(&path, &[pan("ABCDE1234F")], &VerifyOptions::default()).unwrap();
        assert!(!result.ok);
        assert_eq!(result.warnings.len(), 1);
        assert!(!result.warnings[0].contains("ABCDE1234F"));
    }

    #[test]
    fn test_clean_output_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "PAN           ");
        let result = verify_output(&path, &[pan("ABCDE1234F")], &VerifyOptions::default()).unwrap();
        assert!(result.ok);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_images_and_disabled_search_skip() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("x.png");
        let result = verify_output(&png, &[pan("ABCDE1234F")], &VerifyOptions::default()).unwrap();
        assert!(result.ok);

        let path = write_pdf(dir.path(), "PAN ABCDE1234F");
        let options = VerifyOptions {
            text_search: false,
            ..Default::default()
        };
        assert!(verify_output(&path, &[pan("ABCDE1234F")], &options).unwrap().ok);
    }
}
