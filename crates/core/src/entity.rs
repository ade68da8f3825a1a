//! PII 实体模型：类型枚举、类型开关与实体归并

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;
use crate::CoreError;

/// 封闭的 PII 类型集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Person,
    Address,
    Org,
    Gpe,
    Aadhar,
    Pan,
    Dl,
    Voter,
    RationCard,
    BirthCertificate,
    Passport,
    Dob,
}

impl PiiKind {
    pub const ALL: [PiiKind; 12] = [
        PiiKind::Person,
        PiiKind::Address,
        PiiKind::Org,
        PiiKind::Gpe,
        PiiKind::Aadhar,
        PiiKind::Pan,
        PiiKind::Dl,
        PiiKind::Voter,
        PiiKind::RationCard,
        PiiKind::BirthCertificate,
        PiiKind::Passport,
        PiiKind::Dob,
    ];

    /// 配置文件中使用的键名
    pub fn as_key(&self) -> &'static str {
        match self {
            PiiKind::Person => "person",
            PiiKind::Address => "address",
            PiiKind::Org => "org",
            PiiKind::Gpe => "gpe",
            PiiKind::Aadhar => "aadhar",
            PiiKind::Pan => "pan",
            PiiKind::Dl => "dl",
            PiiKind::Voter => "voter",
            PiiKind::RationCard => "ration_card",
            PiiKind::BirthCertificate => "birth_certificate",
            PiiKind::Passport => "passport",
            PiiKind::Dob => "dob",
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl FromStr for PiiKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        PiiKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_key() == key)
            .ok_or(CoreError::UnknownKind(s.to_string()))
    }
}

/// 实体来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntitySource {
    /// 正则规则（证件号、日期）
    Pattern,
    /// 通用 NER
    Ner,
    /// 第二文字（天城文）NER
    NerSecondaryScript,
}

/// OCR 识别出的一行文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub bbox: BoundingBox,
    /// 页码，从 0 开始；图片恒为 0
    pub page: usize,
}

impl TextLine {
    pub fn new(text: impl Into<String>, bbox: BoundingBox, page: usize) -> Self {
        Self {
            text: text.into(),
            bbox,
            page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiEntity {
    pub kind: PiiKind,
    pub text: String,
    pub bbox: BoundingBox,
    pub page: usize,
    pub source: EntitySource,
}

/// 每个 PII 类型的启用开关，作业开始时加载一次，之后只读
///
/// 配置中缺省的类型一律视为关闭。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PiiTypeFilter {
    enabled: BTreeMap<PiiKind, bool>,
}

impl PiiTypeFilter {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (PiiKind, bool)>,
    {
        Self {
            enabled: entries.into_iter().collect(),
        }
    }

    /// 从原始键值表构造，未知类型直接报错
    pub fn from_raw(raw: &BTreeMap<String, bool>) -> Result<Self, CoreError> {
        let mut enabled = BTreeMap::new();
        for (key, on) in raw {
            enabled.insert(key.parse::<PiiKind>()?, *on);
        }
        Ok(Self { enabled })
    }

    /// 全部类型开启
    pub fn all_enabled() -> Self {
        Self::new(PiiKind::ALL.iter().map(|k| (*k, true)))
    }

    pub fn allows(&self, kind: PiiKind) -> bool {
        self.enabled.get(&kind).copied().unwrap_or(false)
    }

    pub fn any_enabled(&self, kinds: &[PiiKind]) -> bool {
        kinds.iter().any(|k| self.allows(*k))
    }

    pub fn enabled_kinds(&self) -> Vec<PiiKind> {
        PiiKind::ALL.iter().copied().filter(|k| self.allows(*k)).collect()
    }
}

/// 去重：同一行上不同日期/证件正则变体命中同一文本时只保留一个
///
/// 仅对 `Pattern` 来源去重，NER 结果原样保留。
pub fn normalize(raw: Vec<PiiEntity>) -> Vec<PiiEntity> {
    let mut seen: HashSet<(PiiKind, usize, [u32; 4], String)> = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for entity in raw {
        if entity.source == EntitySource::Pattern {
            let b = entity.bbox;
            let key = (
                entity.kind,
                entity.page,
                [
                    b.left.to_bits(),
                    b.top.to_bits(),
                    b.width.to_bits(),
                    b.height.to_bits(),
                ],
                entity.text.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
        }
        out.push(entity);
    }
    out
}

pub fn filter(entities: Vec<PiiEntity>, types: &PiiTypeFilter) -> Vec<PiiEntity> {
    entities
        .into_iter()
        .filter(|e| types.allows(e.kind))
        .collect()
}

pub fn entities_on_page(entities: &[PiiEntity], page: usize) -> impl Iterator<Item = &PiiEntity> {
    entities.iter().filter(move |e| e.page == page)
}

/// 掩码显示敏感片段，用于日志
///
/// - 长度 <= 4：全部替换为 `*`
/// - 其余：保留首尾 `min(4, len/3)` 个字符，中间固定 `****`
pub fn mask_snippet(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    if len <= 4 {
        return "*".repeat(len);
    }
    let keep = std::cmp::min(4, len / 3);
    let prefix: String = chars[..keep].iter().collect();
    let suffix: String = chars[len - keep..].iter().collect();
    format!("{}****{}", prefix, suffix)
}
