//! 字符偏移到几何位置的映射
//!
//! 第二文字的 NER 只返回拼接文本中的字符偏移，这里把偏移重新对应回
//! OCR 单词片段的边界框。

use serde::{Deserialize, Serialize};

use crate::entity::{EntitySource, PiiEntity, PiiKind};
use crate::geometry::BoundingBox;

/// OCR 单词片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordFragment {
    pub text: String,
    pub bbox: BoundingBox,
    pub page: usize,
}

/// 单词片段在拼接文本中的字符区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpannedFragment {
    pub start: usize,
    pub end: usize,
    pub bbox: BoundingBox,
}

/// NER 返回的偏移实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetEntity {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// 单页片段拼接结果：片段之间用一个空格连接
#[derive(Debug, Clone, Default)]
pub struct FragmentText {
    pub text: String,
    pub spans: Vec<SpannedFragment>,
}

impl FragmentText {
    /// 偏移按字符（而非字节）计算，与 NER 服务保持一致
    pub fn build<'a, I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = &'a WordFragment>,
    {
        let mut text = String::new();
        let mut spans = Vec::new();
        let mut cursor = 0usize;
        for (i, frag) in fragments.into_iter().enumerate() {
            if i > 0 {
                text.push(' ');
                cursor += 1;
            }
            let len = frag.text.chars().count();
            text.push_str(&frag.text);
            spans.push(SpannedFragment {
                start: cursor,
                end: cursor + len,
                bbox: frag.bbox,
            });
            cursor += len;
        }
        Self { text, spans }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// 将偏移实体映射为带边界框的 `person` 实体
///
/// 与实体区间有交集的片段框取并集；没有任何片段重叠的实体被丢弃。
pub fn map_offsets_to_boxes(
    entities: &[OffsetEntity],
    text: &FragmentText,
    page: usize,
) -> Vec<PiiEntity> {
    let mut out = Vec::new();
    for entity in entities {
        let boxes: Vec<&BoundingBox> = text
            .spans
            .iter()
            .filter(|s| !(s.end <= entity.start || s.start >= entity.end))
            .map(|s| &s.bbox)
            .collect();
        match BoundingBox::union(boxes) {
            Some(bbox) => out.push(PiiEntity {
                kind: PiiKind::Person,
                text: entity.name.clone(),
                bbox,
                page,
                source: EntitySource::NerSecondaryScript,
            }),
            None => log::warn!(
                "[Mapper] 实体 [{}, {}) 未找到对应片段，已丢弃",
                entity.start,
                entity.end
            ),
        }
    }
    out
}

/// 去掉中心点落在已脱敏区域内的片段
pub fn exclude_covered(fragments: Vec<WordFragment>, covered: &[PiiEntity]) -> Vec<WordFragment> {
    fragments
        .into_iter()
        .filter(|f| {
            let (cx, cy) = f.bbox.center();
            !covered
                .iter()
                .any(|e| e.page == f.page && e.bbox.contains_point(cx, cy))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, left: f32) -> WordFragment {
        WordFragment {
            text: text.to_string(),
            bbox: BoundingBox::new(left, 0.2, 0.1, 0.05),
            page: 0,
        }
    }

    #[test]
    fn test_build_uses_char_offsets() {
        let frags = vec![frag("राम", 0.0), frag("abcd", 0.2)];
        let ft = FragmentText::build(&frags);
        assert_eq!(ft.text, "राम abcd");
        assert_eq!((ft.spans[0].start, ft.spans[0].end), (0, 3));
        assert_eq!((ft.spans[1].start, ft.spans[1].end), (4, 8));
    }

    #[test]
    fn test_offsets_select_only_overlapping_fragment() {
        let frags = vec![frag("aaaa", 0.0), frag("bbbb", 0.2), frag("cccc", 0.4)];
        let ft = FragmentText::build(&frags);
        let ents = vec![OffsetEntity {
            name: "bbbb".into(),
            start: 5,
            end: 9,
        }];
        let out = map_offsets_to_boxes(&ents, &ft, 0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bbox, frags[1].bbox);
        assert_eq!(out[0].kind, PiiKind::Person);
        assert_eq!(out[0].source, EntitySource::NerSecondaryScript);
    }

    #[test]
    fn test_offsets_spanning_fragments_union() {
        let frags = vec![frag("aaaa", 0.0), frag("bbbb", 0.2)];
        let ft = FragmentText::build(&frags);
        let ents = vec![OffsetEntity {
            name: "aaaa bbbb".into(),
            start: 2,
            end: 7,
        }];
        let out = map_offsets_to_boxes(&ents, &ft, 3);
        assert_eq!(out[0].page, 3);
        assert!((out[0].bbox.left - 0.0).abs() < 1e-6);
        assert!((out[0].bbox.right() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_offsets_without_fragment_dropped() {
        let frags = vec![frag("aaaa", 0.0)];
        let ft = FragmentText::build(&frags);
        let ents = vec![OffsetEntity {
            name: "ghost".into(),
            start: 20,
            end: 25,
        }];
        assert!(map_offsets_to_boxes(&ents, &ft, 0).is_empty());
    }

    #[test]
    fn test_exclude_covered_fragments() {
        let frags = vec![frag("aaaa", 0.0), frag("bbbb", 0.5)];
        let covered = vec![PiiEntity {
            kind: PiiKind::Person,
            text: "aaaa".into(),
            bbox: BoundingBox::new(0.0, 0.0, 0.3, 0.5),
            page: 0,
            source: EntitySource::Ner,
        }];
        let left = exclude_covered(frags, &covered);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].text, "bbbb");
    }
}
