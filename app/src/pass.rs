//! 单遍检测与渲染
//!
//! - 第一遍：行级 OCR → 正则检测 + 通用 NER → 归并 → 渲染
//! - 第二遍：单词级 OCR → 天城文过滤 → 按页拼接 → 偏移 NER → 映射到几何位置 → 渲染
//!
//! 协作方失败或超时时输入原样复制到输出。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use shade_core::{
    exclude_covered, filter, map_offsets_to_boxes, normalize, FragmentText, PiiEntity, PiiKind,
    Redactor, WordFragment,
};
use shade_ocr::retain_devanagari;
use shade_pdf::PdfRedactor;
use shade_render::RasterRedactor;
use shade_rules::{entities_from_ner, PatternDetector};
use shade_verify::{verify_output, VerifyOptions};

use crate::collab::{call_with_timeout, CancellableNer, Collaborators};
use crate::config::Settings;
use crate::media::MediaKind;
use crate::{loggable, PipelineError};

pub struct PassContext<'a> {
    pub settings: &'a Settings,
    pub collaborators: &'a Collaborators,
    pub media: MediaKind,
    pub label: &'a str,
}

/// 一遍处理的结果
#[derive(Debug, Default)]
pub struct PassOutcome {
    /// 实际渲染的实体
    pub entities: Vec<PiiEntity>,
    pub warnings: Vec<String>,
}

impl PassOutcome {
    fn degraded(warning: String) -> Self {
        Self {
            entities: Vec::new(),
            warnings: vec![warning],
        }
    }
}

fn pass_through(source: &Path, dest: &Path) -> Result<(), PipelineError> {
    fs::copy(source, dest)?;
    Ok(())
}

fn log_entities(label: &str, entities: &[PiiEntity]) {
    for e in entities {
        log::debug!(
            "[Detect] {} 第 {} 页 {} ({:?}): {}",
            label,
            e.page + 1,
            e.kind,
            e.source,
            loggable(&e.text)
        );
    }
}

impl<'a> PassContext<'a> {
    fn redactor(&self) -> Box<dyn Redactor> {
        match self.media {
            MediaKind::Pdf => Box::new(PdfRedactor::new()),
            MediaKind::Raster => Box::new(RasterRedactor::new()),
        }
    }

    /// 过滤后渲染；没有实体时原样复制
    fn render(
        &self,
        source: &Path,
        dest: &Path,
        entities: Vec<PiiEntity>,
    ) -> Result<PassOutcome, PipelineError> {
        let types = &self.settings.types;
        let entities = filter(entities, types);
        if entities.is_empty() {
            log::info!("[Pass] {}: 未检测到需要脱敏的内容，原样输出", self.label);
            pass_through(source, dest)?;
            return Ok(PassOutcome::default());
        }

        let report = self.redactor().redact(source, &entities, types, dest)?;
        log::info!(
            "[Pass] {}: 脱敏 {} 个区域（{} 页）",
            self.label,
            report.regions,
            report.pages
        );

        let mut outcome = PassOutcome {
            entities,
            warnings: Vec::new(),
        };
        if self.media == MediaKind::Pdf && self.settings.runtime.verify_output {
            match verify_output(dest, &outcome.entities, &VerifyOptions::default()) {
                Ok(result) => outcome.warnings.extend(result.warnings),
                Err(e) => log::warn!("[Pass] {}: 输出校验失败: {}", self.label, e),
            }
        }
        Ok(outcome)
    }

    /// 第一遍：正则 + 通用 NER
    pub fn primary(&self, source: &Path, dest: &Path) -> Result<PassOutcome, PipelineError> {
        if !self.settings.processing.english_enabled {
            log::info!("[Pass] {}: 第一遍已关闭，原样输出", self.label);
            pass_through(source, dest)?;
            return Ok(PassOutcome::default());
        }
        let timeout = self.settings.runtime.collab_timeout();

        let ocr = Arc::clone(&self.collaborators.ocr);
        let path = source.to_path_buf();
        let lines = match call_with_timeout("OCR", timeout, move |cancel| {
            ocr.extract_cancellable(&path, cancel)
        }) {
            Ok(lines) => lines,
            Err(e) => {
                log::warn!("[Pass] {}: {}，原样输出", self.label, e);
                pass_through(source, dest)?;
                return Ok(PassOutcome::degraded(e.to_string()));
            }
        };
        log::info!("[Pass] {}: OCR 识别 {} 行", self.label, lines.len());

        let types = self.settings.types.clone();
        let mut entities = PatternDetector::new().detect(&lines, &types);

        let ner = Arc::clone(&self.collaborators.ner);
        let ner_lines = lines;
        let mut warnings = Vec::new();
        match call_with_timeout("NER", timeout, move |cancel| {
            entities_from_ner(&ner_lines, &CancellableNer::new(ner.as_ref(), cancel), &types)
        }) {
            Ok(found) => entities.extend(found),
            Err(e) => {
                // 正则结果仍然渲染
                log::warn!("[Pass] {}: {}，仅使用正则检测结果", self.label, e);
                warnings.push(e.to_string());
            }
        }

        let entities = normalize(entities);
        log_entities(self.label, &entities);
        let mut outcome = self.render(source, dest, entities)?;
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        Ok(outcome)
    }

    /// 第二遍：天城文人名
    ///
    /// `covered` 为第一遍已渲染的实体，中心落在其中的片段不再参与。
    pub fn secondary(
        &self,
        covered: &[PiiEntity],
        source: &Path,
        dest: &Path,
    ) -> Result<PassOutcome, PipelineError> {
        let collaborators = match &self.collaborators.secondary {
            Some(c) if self.settings.types.allows(PiiKind::Person) => c,
            Some(_) => {
                log::info!("[Pass] {}: person 类型已关闭，第二遍原样输出", self.label);
                pass_through(source, dest)?;
                return Ok(PassOutcome::default());
            }
            None => {
                log::warn!("[Pass] {}: 未配置第二文字协作方，原样输出", self.label);
                pass_through(source, dest)?;
                return Ok(PassOutcome::default());
            }
        };
        let timeout = self.settings.runtime.collab_timeout();

        let ocr = Arc::clone(&collaborators.ocr);
        let path = source.to_path_buf();
        let fragments = match call_with_timeout("OCR-2", timeout, move |cancel| {
            ocr.extract_fragments_cancellable(&path, cancel)
        }) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("[Pass] {}: {}，原样输出", self.label, e);
                pass_through(source, dest)?;
                return Ok(PassOutcome::degraded(e.to_string()));
            }
        };
        let total = fragments.len();
        let fragments = exclude_covered(retain_devanagari(fragments), covered);
        log::info!(
            "[Pass] {}: 第二文字片段 {} 个（共识别 {} 个）",
            self.label,
            fragments.len(),
            total
        );

        let mut by_page: BTreeMap<usize, Vec<WordFragment>> = BTreeMap::new();
        for frag in fragments {
            by_page.entry(frag.page).or_default().push(frag);
        }

        let mut entities = Vec::new();
        for (page, frags) in by_page {
            let text = FragmentText::build(&frags);
            if text.is_empty() {
                continue;
            }
            let ner = Arc::clone(&collaborators.ner);
            let joined = text.text.clone();
            let offsets = match call_with_timeout("NER-2", timeout, move |_| ner.recognize_offsets(&joined)) {
                Ok(o) => o,
                Err(e) => {
                    log::warn!("[Pass] {}: {}，原样输出", self.label, e);
                    pass_through(source, dest)?;
                    return Ok(PassOutcome::degraded(e.to_string()));
                }
            };
            entities.extend(map_offsets_to_boxes(&offsets, &text, page));
        }

        log_entities(self.label, &entities);
        self.render(source, dest, entities)
    }
}
