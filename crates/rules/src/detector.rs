//! 基于正则的证件号/日期检测

use regex::Captures;
use shade_core::{mask_snippet, normalize, EntitySource, PiiEntity, PiiTypeFilter, TextLine};

use crate::patterns::{PatternRule, DATE_PATTERNS, ID_PATTERNS};

/// 正则检测器
///
/// 被关闭的类型直接跳过整条规则，不做匹配。
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternDetector;

impl PatternDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, lines: &[TextLine], types: &PiiTypeFilter) -> Vec<PiiEntity> {
        let mut raw = Vec::new();
        for rule in ID_PATTERNS.iter().chain(DATE_PATTERNS.iter()) {
            if !types.allows(rule.kind) {
                continue;
            }
            for line in lines {
                collect_matches(rule, line, &mut raw);
            }
        }
        let entities = normalize(raw);
        log::debug!("[Rules] 正则检测完成，共 {} 个实体", entities.len());
        entities
    }
}

fn collect_matches(rule: &PatternRule, line: &TextLine, out: &mut Vec<PiiEntity>) {
    for caps in rule.regex.captures_iter(&line.text) {
        let Some(value) = match_value(&caps) else {
            continue;
        };
        log::debug!(
            "[Rules] {} 命中: {} (page {})",
            rule.name,
            mask_snippet(value),
            line.page
        );
        out.push(PiiEntity {
            kind: rule.kind,
            text: value.to_string(),
            bbox: line.bbox,
            page: line.page,
            source: EntitySource::Pattern,
        });
    }
}

/// 取最后一个非空捕获组；无捕获组时取整个匹配
fn match_value<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    let value = if caps.len() > 1 {
        (1..caps.len())
            .rev()
            .filter_map(|i| caps.get(i))
            .map(|m| m.as_str().trim())
            .find(|s| !s.is_empty())?
    } else {
        caps.get(0)?.as_str().trim()
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
