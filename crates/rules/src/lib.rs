//! PII 检测规则：证件号/日期正则表，以及 NER 结果到实体的映射。

pub mod detector;
pub mod ner;
pub mod patterns;

pub use detector::PatternDetector;
pub use ner::{
    clean_token, entities_from_ner, kind_for_ner_label, EntityRecognizer, NerError, NerSpan,
    OffsetRecognizer,
};
