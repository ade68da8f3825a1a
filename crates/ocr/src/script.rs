//! 文字脚本过滤

use shade_core::WordFragment;

/// 天城文字符（U+0900–U+097F，含 danda `।` `॥`）或空白
fn is_devanagari_or_space(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c) || c.is_whitespace()
}

pub fn is_devanagari(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && text.chars().all(is_devanagari_or_space)
}

/// 只保留纯天城文片段
pub fn retain_devanagari(fragments: Vec<WordFragment>) -> Vec<WordFragment> {
    let before = fragments.len();
    let kept: Vec<WordFragment> = fragments
        .into_iter()
        .filter(|f| is_devanagari(&f.text))
        .collect();
    log::debug!("[OCR] 天城文过滤: {} -> {}", before, kept.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use shade_core::BoundingBox;

    #[test]
    fn test_is_devanagari() {
        assert!(is_devanagari("राम"));
        assert!(is_devanagari("नाम।"));
        assert!(!is_devanagari("Ram"));
        assert!(!is_devanagari("राम1"));
        assert!(!is_devanagari("  "));
    }

    #[test]
    fn test_retain_devanagari() {
        let frag = |t: &str| WordFragment {
            text: t.to_string(),
            bbox: BoundingBox::new(0.0, 0.0, 0.1, 0.1),
            page: 0,
        };
        let kept = retain_devanagari(vec![frag("सीता"), frag("PAN"), frag("12/03")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text, "सीता");
    }
}
