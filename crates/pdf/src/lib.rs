//! PDF 脱敏
//!
//! 按页把实体区域换算到 PDF 坐标后：
//! 1. 移除区域内的文字字形（含 Form XObject 内的文字）
//! 2. 把区域烧入被覆盖的图片 XObject
//! 3. 移除相交的注释
//! 4. 追加不透明黑框
//!
//! 所有页面先完成读取与计算，最后统一提交；任一步失败则整份文档失败，不写出结果。

mod annotations;
mod image;
mod text;
mod types;
mod utils;
mod xobject;

pub use text::shown_strings;
pub use types::{Matrix, PdfRect, RedactionAnnotation};
pub use utils::{decoded_content, get_page_content, to_pdf_rect};

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use shade_core::{PiiEntity, PiiTypeFilter, RedactionError, Redactor, RenderReport};

use annotations::{apply_annotation_plan, plan_annotation_redaction, AnnotationPlan};
use text::{add_black_overlay, process_content_stream};
use utils::{get_page_box, get_page_rotation, get_page_xobjects};
use xobject::XObjectPlan;

/// PDF 渲染器
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfRedactor;

impl PdfRedactor {
  pub fn new() -> Self {
    Self
  }
}

/// 单页待提交的变更
struct PagePlan {
  content: Vec<u8>,
  annotations: Option<AnnotationPlan>,
  glyphs_removed: usize,
}

/// 计算单页变更（只读），页面引用的 XObject 记入 `xobjects`
fn plan_page(
  doc: &Document,
  page_id: ObjectId,
  rects: &[PdfRect],
  xobjects: &mut XObjectPlan,
) -> Result<PagePlan, RedactionError> {
  let content_data = utils::get_page_content(doc, page_id)?;
  let scan = process_content_stream(&content_data, rects)?;

  let names = get_page_xobjects(doc, page_id);
  xobjects.collect(doc, &names, &scan.placements, rects)?;

  let glyphs_removed = scan.glyphs_removed;
  let content = add_black_overlay(scan.operations, rects)?;
  let annotations = plan_annotation_redaction(doc, page_id, rects);

  Ok(PagePlan {
    content,
    annotations,
    glyphs_removed,
  })
}

/// 提交单页变更
fn commit_page(doc: &mut Document, page_id: ObjectId, plan: PagePlan) {
  let stream_id = doc.add_object(Stream::new(Dictionary::new(), plan.content));
  if let Ok(Object::Dictionary(ref mut dict)) = doc.get_object_mut(page_id) {
    dict.set("Contents", Object::Reference(stream_id));
  }
  if let Some(annots) = plan.annotations {
    apply_annotation_plan(doc, page_id, annots);
  }
}

/// 实体 → 当前页的 PDF 矩形
fn page_annotations(
  doc: &Document,
  page_id: ObjectId,
  entities: &[&PiiEntity],
) -> Vec<RedactionAnnotation> {
  let page_box = get_page_box(doc, page_id);
  let rotation = get_page_rotation(doc, page_id);
  entities
    .iter()
    .map(|e| RedactionAnnotation {
      rect: to_pdf_rect(&e.bbox, page_box, rotation),
      kind: e.kind,
    })
    .collect()
}

fn save_atomic(doc: &mut Document, dest: &Path) -> Result<(), RedactionError> {
  let parent = match dest.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
  doc
    .save_to(tmp.as_file_mut())
    .map_err(|e| RedactionError::Encode(format!("保存 PDF 失败: {}", e)))?;
  tmp.as_file().sync_all()?;
  tmp.persist(dest).map_err(|e| RedactionError::Io(e.error))?;
  Ok(())
}

impl Redactor for PdfRedactor {
  fn redact(
    &self,
    source: &Path,
    entities: &[PiiEntity],
    types: &PiiTypeFilter,
    dest: &Path,
  ) -> Result<RenderReport, RedactionError> {
    if !source.is_file() {
      return Err(RedactionError::SourceMissing(source.to_path_buf()));
    }
    let mut doc = Document::load(source)
      .map_err(|e| RedactionError::Decode(format!("无法打开 PDF {}: {}", source.display(), e)))?;

    let pages = doc.get_pages();
    let selected: Vec<&PiiEntity> = entities.iter().filter(|e| types.allows(e.kind)).collect();
    for e in &selected {
      if e.page >= pages.len() {
        log::warn!("[PDF] 实体页码 {} 超出范围（共 {} 页），已忽略", e.page, pages.len());
      }
    }

    let mut report = RenderReport::default();
    let mut plans = Vec::new();
    let mut xobjects = XObjectPlan::default();
    for (index, page_id) in pages.values().enumerate() {
      let on_page: Vec<&PiiEntity> = selected.iter().copied().filter(|e| e.page == index).collect();
      if on_page.is_empty() {
        continue;
      }
      let rects: Vec<PdfRect> = page_annotations(&doc, *page_id, &on_page)
        .into_iter()
        .map(|a| a.rect)
        .collect();
      let plan = plan_page(&doc, *page_id, &rects, &mut xobjects)?;
      log::debug!(
        "[PDF] 第 {} 页: {} 个区域, 移除 {} 个字形",
        index + 1,
        rects.len(),
        plan.glyphs_removed
      );
      report.regions += rects.len();
      report.pages += 1;
      plans.push((*page_id, plan));
    }

    let form_glyphs = xobjects.glyphs_removed();
    let replacements = xobjects.finish(&doc)?;
    if form_glyphs > 0 {
      log::debug!("[PDF] 表单内移除 {} 个字形", form_glyphs);
    }

    for (page_id, plan) in plans {
      commit_page(&mut doc, page_id, plan);
    }
    for (id, stream) in replacements {
      doc.objects.insert(id, Object::Stream(stream));
    }
    // 旧内容流仍含原文，必须移除
    let pruned = doc.prune_objects();
    log::debug!("[PDF] 清理 {} 个未引用对象", pruned.len());
    doc.compress();

    save_atomic(&mut doc, dest)?;
    log::info!(
      "[PDF] 已脱敏 {} 个区域（{} 页）: {}",
      report.regions,
      report.pages,
      dest.display()
    );
    Ok(report)
  }
}
