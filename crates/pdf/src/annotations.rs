//! 注释脱敏
//!
//! 与脱敏区域相交的注释（含外观流）整体移除。

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::types::PdfRect;
use crate::utils::{get_number, resolve};

/// 待提交的注释变更
#[derive(Debug, Default)]
pub struct AnnotationPlan {
  /// 过滤后的 Annots 数组
  keep: Vec<Object>,
  /// 需要删除的间接注释对象
  removed_ids: Vec<ObjectId>,
  removed: usize,
}

impl AnnotationPlan {
  pub fn removed(&self) -> usize {
    self.removed
  }
}

/// 计算需要移除的注释（只读，不修改文档）
pub fn plan_annotation_redaction(
  doc: &Document,
  page_id: ObjectId,
  rects: &[PdfRect],
) -> Option<AnnotationPlan> {
  let page_dict = doc.get_dictionary(page_id).ok()?;
  let annots = match page_dict.get(b"Annots").ok().and_then(|o| resolve(doc, o)) {
    Some(Object::Array(arr)) => arr,
    _ => return None,
  };

  let mut plan = AnnotationPlan::default();
  for entry in annots {
    let hit = match resolve(doc, entry) {
      Some(Object::Dictionary(dict)) => get_annot_rect(dict)
        .map(|r| rects.iter().any(|m| m.intersects(&r, 0.0)))
        .unwrap_or(false),
      _ => false,
    };
    if hit {
      plan.removed += 1;
      if let Object::Reference(id) = entry {
        plan.removed_ids.push(*id);
      }
    } else {
      plan.keep.push(entry.clone());
    }
  }

  if plan.removed == 0 {
    None
  } else {
    Some(plan)
  }
}

/// 提交注释变更
pub fn apply_annotation_plan(doc: &mut Document, page_id: ObjectId, plan: AnnotationPlan) {
  for id in &plan.removed_ids {
    doc.objects.remove(id);
  }
  if let Ok(Object::Dictionary(ref mut page_dict)) = doc.get_object_mut(page_id) {
    if plan.keep.is_empty() {
      page_dict.remove(b"Annots");
    } else {
      page_dict.set("Annots", Object::Array(plan.keep));
    }
  }
  log::debug!("[PDF] 页面 {:?} 移除 {} 个注释", page_id, plan.removed);
}

/// 获取注释的矩形区域
fn get_annot_rect(annot_dict: &Dictionary) -> Option<PdfRect> {
  let rect = match annot_dict.get(b"Rect") {
    Ok(Object::Array(rect)) if rect.len() == 4 => rect,
    _ => return None,
  };
  let values: Vec<f32> = rect.iter().filter_map(get_number).collect();
  if values.len() != 4 {
    return None;
  }
  let (x1, y1, x2, y2) = (values[0], values[1], values[2], values[3]);
  Some(PdfRect {
    x: x1.min(x2),
    y: y1.min(y2),
    width: (x2 - x1).abs(),
    height: (y2 - y1).abs(),
  })
}
