//! 证件号与出生日期正则表

use once_cell::sync::Lazy;
use regex::Regex;
use shade_core::PiiKind;

/// 一条带类型的检测规则
pub struct PatternRule {
    pub name: &'static str,
    pub kind: PiiKind,
    pub regex: Regex,
}

fn rule(name: &'static str, kind: PiiKind, pattern: &str) -> PatternRule {
    PatternRule {
        name,
        kind,
        regex: Regex::new(&format!("(?i){}", pattern)).expect("Failed to compile built-in pattern"),
    }
}

/// 证件号规则
pub static ID_PATTERNS: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule(
            "Ration Card",
            PiiKind::RationCard,
            r"\b(Ration\s?Card|RC)\s?[-/]?\s?(\d{5,12})\b",
        ),
        rule(
            "Birth Certificate",
            PiiKind::BirthCertificate,
            r"\b(Birth\s?Certificate|BC)\s?[-/]?\s?([A-Z]{2}\d{6,10})\b",
        ),
        rule(
            "Aadhaar Card",
            PiiKind::Aadhar,
            r"\b(Aadhaar\s?Card)?\s?:?\s?(\d{4}\s?\d{4}\s?\d{4})\b",
        ),
        rule("PAN Card", PiiKind::Pan, r"\b([A-Z]{5}\d{4}[A-Z])\b"),
        rule("Passport", PiiKind::Passport, r"\b([A-Z]\d{7})\b"),
        rule(
            "Driving Licence",
            PiiKind::Dl,
            r"\b(DL|Driving\s?Licence)\s?[-/]?\s?([A-Z]{2}\d{7,9})\b",
        ),
        rule(
            "Voter ID Card",
            PiiKind::Voter,
            r"\b(Voter\s?ID\s?Card)?\s?:?\s?([A-Z]{3}\d{7})\b",
        ),
    ]
});

/// 出生日期规则：六种带前缀的格式 + 一条纯数字兜底
pub static DATE_PATTERNS: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule(
            "Date Format 1",
            PiiKind::Dob,
            r"\b(Birth\s?Date)?\s?:?\s?(\d{1,2}[/.-]\d{1,2}[/.-]\d{4})\b",
        ),
        rule(
            "Date Format 2",
            PiiKind::Dob,
            r"\b(Date\s?of\s?Birth)?\s?:?\s?(\d{1,2}[/.-]\d{1,2}[/.-]\d{4})\b",
        ),
        rule(
            "Date Format 3",
            PiiKind::Dob,
            r"\b(DoB)?\s?:?\s?(\d{4}-\d{1,2}-\d{1,2})\b",
        ),
        rule(
            "Date Format 4",
            PiiKind::Dob,
            r"\b(Birth\s?Date)?\s?:?\s?(\d{1,2}\s+(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:tember)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\s+\d{4})\b",
        ),
        rule(
            "Date Format 5",
            PiiKind::Dob,
            r"\b(जन्म\s?तिथि|जन्म\s?दिनांक)?\s?:?\s?(\d{1,2}\s*(?:जनवरी|फरवरी|मार्च|अप्रैल|मई|जून|जुलाई|अगस्त|सितंबर|अक्टूबर|नवंबर|दिसंबर)\s*\d{4})\b",
        ),
        rule(
            "Date Format 6",
            PiiKind::Dob,
            r"\b(DoB)?\s?:?\s?(\d{1,2}\s*(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s*\d{4})\b",
        ),
        rule(
            "Numeric Date",
            PiiKind::Dob,
            r"\b(?:\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}[/-]\d{1,2}[-/]\d{1,2})\b",
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_compile() {
        assert_eq!(ID_PATTERNS.len(), 7);
        assert_eq!(DATE_PATTERNS.len(), 7);
    }

    #[test]
    fn test_every_id_kind_has_rule() {
        for kind in [
            PiiKind::Aadhar,
            PiiKind::Pan,
            PiiKind::Passport,
            PiiKind::Dl,
            PiiKind::RationCard,
            PiiKind::BirthCertificate,
            PiiKind::Voter,
        ] {
            assert!(ID_PATTERNS.iter().any(|r| r.kind == kind), "{}", kind);
        }
    }
}
