//! XObject 处理
//!
//! 图片与表单可能被多个页面或同一页面多次引用，这里按对象 ID 汇总所有绘制位置的区域，
//! 全部页面扫描完成后再统一生成替换流。被共享的对象按区域并集处理，
//! 其他引用处的对应位置同样被涂黑或移除。

use std::collections::BTreeMap;

use lopdf::{
    content::{Content, Operation},
    Document, Object, ObjectId, Stream,
};
use shade_core::{BoundingBox, RedactionError};

use crate::image::{burn_image, image_regions};
use crate::text::{decode_operations, process_operations};
use crate::types::{Matrix, PdfRect};
use crate::utils::{get_number, get_stream_content, resolve_dict, xobject_map};

/// 表单嵌套最大深度
const MAX_FORM_DEPTH: usize = 16;

type XObjectNames = BTreeMap<Vec<u8>, ObjectId>;

/// 文档级 XObject 变更（只读阶段收集）
#[derive(Debug, Default)]
pub struct XObjectPlan {
    /// 图片 → 单位正方形内需要涂黑的区域
    images: BTreeMap<ObjectId, Vec<BoundingBox>>,
    /// 表单 → 移除字形后的操作序列
    forms: BTreeMap<ObjectId, Vec<Operation>>,
    glyphs_removed: usize,
}

fn is_subtype(stream: &Stream, expected: &[u8]) -> bool {
    matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == expected)
}

fn form_matrix(stream: &Stream) -> Matrix {
    match stream.dict.get(b"Matrix") {
        Ok(Object::Array(arr)) if arr.len() == 6 => {
            let values: Vec<f32> = arr.iter().filter_map(get_number).collect();
            match <[f32; 6]>::try_from(values.as_slice()) {
                Ok(m) => Matrix(m),
                Err(_) => Matrix::IDENTITY,
            }
        }
        _ => Matrix::IDENTITY,
    }
}

/// 表单 /BBox 经 `ctm` 变换后是否与任一区域相交；缺少 BBox 时视为相交
fn form_touches(stream: &Stream, ctm: &Matrix, rects: &[PdfRect]) -> bool {
    let values: Vec<f32> = match stream.dict.get(b"BBox") {
        Ok(Object::Array(arr)) => arr.iter().filter_map(get_number).collect(),
        _ => return true,
    };
    if values.len() != 4 {
        return true;
    }
    let corners = [
        ctm.apply(values[0], values[1]),
        ctm.apply(values[2], values[1]),
        ctm.apply(values[2], values[3]),
        ctm.apply(values[0], values[3]),
    ];
    match PdfRect::bounding(&corners) {
        Some(bbox) => rects.iter().any(|r| r.intersects(&bbox, 0.0)),
        None => true,
    }
}

impl XObjectPlan {
    pub fn glyphs_removed(&self) -> usize {
        self.glyphs_removed
    }

    /// 记录一组 `Do` 绘制；表单递归进入其内容
    pub fn collect(
        &mut self,
        doc: &Document,
        names: &XObjectNames,
        placements: &[(Vec<u8>, Matrix)],
        rects: &[PdfRect],
    ) -> Result<(), RedactionError> {
        let mut path = Vec::new();
        self.collect_nested(doc, names, placements, rects, &mut path)
    }

    fn collect_nested(
        &mut self,
        doc: &Document,
        names: &XObjectNames,
        placements: &[(Vec<u8>, Matrix)],
        rects: &[PdfRect],
        path: &mut Vec<ObjectId>,
    ) -> Result<(), RedactionError> {
        for (name, ctm) in placements {
            let id = match names.get(name) {
                Some(id) => *id,
                None => {
                    log::debug!("[PDF] 资源中找不到 XObject /{}", String::from_utf8_lossy(name));
                    continue;
                }
            };
            let stream = match doc.get_object(id) {
                Ok(Object::Stream(stream)) => stream,
                _ => continue,
            };

            if is_subtype(stream, b"Image") {
                let hits = image_regions(ctm, rects);
                if !hits.is_empty() {
                    self.images.entry(id).or_default().extend(hits);
                }
            } else if is_subtype(stream, b"Form") {
                if path.contains(&id) {
                    log::warn!("[PDF] 表单 {:?} 循环引用，跳过", id);
                    continue;
                }
                if path.len() >= MAX_FORM_DEPTH {
                    return Err(RedactionError::Decode(format!("表单 {:?} 嵌套超过 {} 层", id, MAX_FORM_DEPTH)));
                }
                path.push(id);
                self.visit_form(doc, id, stream, names, ctm, rects, path)?;
                path.pop();
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_form(
        &mut self,
        doc: &Document,
        id: ObjectId,
        stream: &Stream,
        parent_names: &XObjectNames,
        placement: &Matrix,
        rects: &[PdfRect],
        path: &mut Vec<ObjectId>,
    ) -> Result<(), RedactionError> {
        let ctm = form_matrix(stream).multiply(placement);
        if !form_touches(stream, &ctm, rects) {
            return Ok(());
        }

        // 同一表单已被其他绘制改写过，在改写结果上继续
        let operations = match self.forms.get(&id) {
            Some(ops) => ops.clone(),
            None => decode_operations(&get_stream_content(stream)?)?,
        };
        let scan = process_operations(operations, rects, ctm);
        if scan.glyphs_removed > 0 {
            log::debug!("[PDF] 表单 {:?} 移除 {} 个字形", id, scan.glyphs_removed);
            self.glyphs_removed += scan.glyphs_removed;
            self.forms.insert(id, scan.operations);
        }

        // 表单未声明资源时沿用调用方的资源
        let own_names = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve_dict(doc, o))
            .map(|res| xobject_map(doc, res));
        let names = own_names.as_ref().unwrap_or(parent_names);
        self.collect_nested(doc, names, &scan.placements, rects, path)
    }

    /// 生成替换流（只读），任一图片无法处理则整体失败
    pub fn finish(self, doc: &Document) -> Result<Vec<(ObjectId, Stream)>, RedactionError> {
        let mut replacements = Vec::with_capacity(self.images.len() + self.forms.len());
        for (id, regions) in &self.images {
            if let Some(stream) = burn_image(doc, *id, regions)? {
                replacements.push((*id, stream));
            }
        }
        for (id, operations) in self.forms {
            let original = match doc.get_object(id) {
                Ok(Object::Stream(stream)) => stream,
                _ => continue,
            };
            let content = Content { operations }
                .encode()
                .map_err(|e| RedactionError::Encode(format!("表单内容编码失败: {}", e)))?;
            let mut dict = original.dict.clone();
            dict.remove(b"Filter");
            dict.remove(b"DecodeParms");
            replacements.push((id, Stream::new(dict, content)));
        }
        log::debug!(
            "[PDF] 替换 {} 张图片、{} 个表单",
            self.images.len(),
            replacements.len().saturating_sub(self.images.len())
        );
        Ok(replacements)
    }
}
