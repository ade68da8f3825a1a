//! NER 协作方接口与标签映射

use serde::{Deserialize, Serialize};
use shade_core::{
    mask_snippet, EntitySource, OffsetEntity, PiiEntity, PiiKind, PiiTypeFilter, TextLine,
};

#[derive(Debug, thiserror::Error)]
pub enum NerError {
    #[error("NER 请求失败: {0}")]
    Request(String),
    #[error("NER 响应无法解析: {0}")]
    Response(String),
}

/// NER 返回的一个实体片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NerSpan {
    /// `PER` / `LOC` / `ORG` / ...，允许带 `B-`/`I-` 前缀
    pub label: String,
    pub text: String,
}

/// 通用 NER，逐行调用
pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Result<Vec<NerSpan>, NerError>;
}

/// 第二文字 NER，返回拼接文本中的字符偏移（仅人名）
pub trait OffsetRecognizer: Send + Sync {
    fn recognize_offsets(&self, text: &str) -> Result<Vec<OffsetEntity>, NerError>;
}

const NER_KINDS: [PiiKind; 3] = [PiiKind::Person, PiiKind::Address, PiiKind::Org];

/// 标签映射：PER→person，LOC→address，ORG→org，其余丢弃
pub fn kind_for_ner_label(label: &str) -> Option<PiiKind> {
    let label = label.trim();
    let bare = label
        .strip_prefix("B-")
        .or_else(|| label.strip_prefix("I-"))
        .unwrap_or(label);
    match bare.to_ascii_uppercase().as_str() {
        "PER" => Some(PiiKind::Person),
        "LOC" => Some(PiiKind::Address),
        "ORG" => Some(PiiKind::Org),
        _ => None,
    }
}

/// 去掉 WordPiece 的 `##` 标记与首尾空白
pub fn clean_token(word: &str) -> String {
    word.replace("##", "").trim().to_string()
}

/// 对每一行调用通用 NER，实体继承该行的边界框
///
/// person/address/org 全部关闭时不调用协作方。
pub fn entities_from_ner(
    lines: &[TextLine],
    recognizer: &dyn EntityRecognizer,
    types: &PiiTypeFilter,
) -> Result<Vec<PiiEntity>, NerError> {
    if !types.any_enabled(&NER_KINDS) {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for line in lines {
        if line.text.trim().is_empty() {
            continue;
        }
        for span in recognizer.recognize(&line.text)? {
            let Some(kind) = kind_for_ner_label(&span.label) else {
                log::debug!("[NER] 忽略标签 {}", span.label);
                continue;
            };
            if !types.allows(kind) {
                continue;
            }
            let text = clean_token(&span.text);
            if text.is_empty() {
                continue;
            }
            log::debug!("[NER] {} 命中: {}", kind, mask_snippet(&text));
            out.push(PiiEntity {
                kind,
                text,
                bbox: line.bbox,
                page: line.page,
                source: EntitySource::Ner,
            });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_core::BoundingBox;

    struct FixedNer(Vec<NerSpan>);

    impl EntityRecognizer for FixedNer {
        fn recognize(&self, _text: &str) -> Result<Vec<NerSpan>, NerError> {
            Ok(self.0.clone())
        }
    }

    struct FailingNer;

    impl EntityRecognizer for FailingNer {
        fn recognize(&self, _text: &str) -> Result<Vec<NerSpan>, NerError> {
            Err(NerError::Request("connection refused".into()))
        }
    }

    fn span(label: &str, text: &str) -> NerSpan {
        NerSpan {
            label: label.into(),
            text: text.into(),
        }
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(kind_for_ner_label("PER"), Some(PiiKind::Person));
        assert_eq!(kind_for_ner_label("B-LOC"), Some(PiiKind::Address));
        assert_eq!(kind_for_ner_label("I-ORG"), Some(PiiKind::Org));
        assert_eq!(kind_for_ner_label("MISC"), None);
    }

    #[test]
    fn test_clean_token() {
        assert_eq!(clean_token(" ##ram "), "ram");
    }

    #[test]
    fn test_entities_inherit_line_bbox_and_respect_filter() {
        let line = TextLine::new("Ravi works at Infosys", BoundingBox::new(0.1, 0.1, 0.5, 0.1), 2);
        let ner = FixedNer(vec![span("PER", "Ravi"), span("ORG", "Infosys"), span("MISC", "x")]);
        let types = PiiTypeFilter::new([(PiiKind::Person, true)]);
        let out = entities_from_ner(&[line.clone()], &ner, &types).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, PiiKind::Person);
        assert_eq!(out[0].bbox, line.bbox);
        assert_eq!(out[0].page, 2);
        assert_eq!(out[0].source, EntitySource::Ner);
    }

    #[test]
    fn test_recognizer_not_called_when_ner_kinds_disabled() {
        let line = TextLine::new("Ravi", BoundingBox::new(0.0, 0.0, 0.1, 0.1), 0);
        let types = PiiTypeFilter::new([(PiiKind::Pan, true)]);
        assert!(entities_from_ner(&[line], &FailingNer, &types).unwrap().is_empty());
    }

    #[test]
    fn test_recognizer_error_propagates() {
        let line = TextLine::new("Ravi", BoundingBox::new(0.0, 0.0, 0.1, 0.1), 0);
        let types = PiiTypeFilter::new([(PiiKind::Person, true)]);
        assert!(entities_from_ner(&[line], &FailingNer, &types).is_err());
    }
}
