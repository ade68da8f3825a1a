use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use shade_core::{BoundingBox, RedactionError};

use crate::types::PdfRect;

/// 页面树继承链最大深度
const MAX_INHERIT_DEPTH: usize = 32;

/// 从 Object 获取数值
pub fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// 解引用
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// 沿 Parent 链查找可继承属性（Resources / MediaBox / CropBox / Rotate）
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?;
        current = resolve_dict(doc, parent)?;
    }
    None
}

fn extract_box_values(doc: &Document, obj: &Object) -> Option<(f32, f32, f32, f32)> {
    let arr = match obj {
        Object::Array(arr) => arr,
        _ => return None,
    };
    let values: Vec<f32> = arr
        .iter()
        .filter_map(|o| resolve(doc, o).and_then(get_number))
        .collect();
    if values.len() != 4 {
        return None;
    }
    // 规范化为 (llx, lly, urx, ury)
    Some((
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ))
}

/// 页面可见区域：优先 CropBox，其次 MediaBox，均可继承
pub fn get_page_box(doc: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    let crop = inherited(doc, page_id, b"CropBox").and_then(|o| extract_box_values(doc, o));
    let media = inherited(doc, page_id, b"MediaBox").and_then(|o| extract_box_values(doc, o));
    crop.or(media).unwrap_or_else(|| {
        log::warn!("[PDF] 页面 {:?} 缺少 MediaBox，使用默认 Letter 尺寸", page_id);
        (0.0, 0.0, 612.0, 792.0)
    })
}

/// 页面旋转角度，规范化到 0/90/180/270
pub fn get_page_rotation(doc: &Document, page_id: ObjectId) -> i32 {
    let raw = inherited(doc, page_id, b"Rotate")
        .and_then(get_number)
        .unwrap_or(0.0) as i32;
    let normalized = raw.rem_euclid(360);
    match normalized {
        0 | 90 | 180 | 270 => normalized,
        other => {
            log::warn!("[PDF] 非法旋转角度 {}，按 0 处理", other);
            0
        }
    }
}

/// 将显示坐标（归一化、左上原点、已应用 /Rotate）转换为未旋转的 PDF 用户空间
///
/// /Rotate 表示显示时顺时针旋转的角度：
/// - 90°：显示 X 对应 PDF 的 Y，显示 Y 对应 PDF 的 X
/// - 180°：X、Y 均反向
/// - 270°：显示 X 对应 PDF 的 (1-Y)，显示 Y 对应 PDF 的 (1-X)
pub fn to_pdf_rect(bbox: &BoundingBox, page_box: (f32, f32, f32, f32), rotation: i32) -> PdfRect {
    let b = bbox.clamped();
    let (llx, lly, urx, ury) = page_box;
    let page_width = urx - llx;
    let page_height = ury - lly;

    let (x, y, width, height) = match rotation {
        90 => (
            llx + b.top * page_width,
            lly + b.left * page_height,
            b.height * page_width,
            b.width * page_height,
        ),
        180 => (
            llx + (1.0 - b.left - b.width) * page_width,
            lly + b.top * page_height,
            b.width * page_width,
            b.height * page_height,
        ),
        270 => (
            llx + (1.0 - b.top - b.height) * page_width,
            lly + (1.0 - b.left - b.width) * page_height,
            b.height * page_width,
            b.width * page_height,
        ),
        _ => (
            llx + b.left * page_width,
            lly + (1.0 - b.top - b.height) * page_height,
            b.width * page_width,
            b.height * page_height,
        ),
    };

    PdfRect { x, y, width, height }
}

/// 按 /Filter 解码流数据，无 Filter 时原样返回
///
/// lopdf 不解码 /Subtype /Image 的流，这里去掉该键后再解码。
pub fn decoded_content(stream: &Stream) -> Result<Vec<u8>, lopdf::Error> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    if matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") {
        let mut dict = stream.dict.clone();
        dict.remove(b"Subtype");
        return Stream::new(dict, stream.content.clone()).decompressed_content();
    }
    stream.decompressed_content()
}

/// 获取内容流数据，无法解码时报错
pub fn get_stream_content(stream: &Stream) -> Result<Vec<u8>, RedactionError> {
    decoded_content(stream).map_err(|e| RedactionError::Decode(format!("内容流解码失败: {}", e)))
}

/// 获取页面的内容流数据（多个流按顺序拼接）
pub fn get_page_content(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, RedactionError> {
    let dict = doc
        .get_dictionary(page_id)
        .map_err(|e| RedactionError::Decode(format!("无法读取页面 {:?}: {}", page_id, e)))?;

    let contents = match dict.get(b"Contents") {
        Ok(c) => c,
        // 没有内容流的空白页
        Err(_) => return Ok(Vec::new()),
    };

    match resolve(doc, contents) {
        Some(Object::Stream(stream)) => get_stream_content(stream),
        Some(Object::Array(arr)) => {
            let mut all_content = Vec::new();
            for item in arr {
                match resolve(doc, item) {
                    Some(Object::Stream(stream)) => {
                        all_content.extend(get_stream_content(stream)?);
                        all_content.push(b'\n');
                    }
                    _ => {
                        return Err(RedactionError::Decode(format!(
                            "页面 {:?} 的内容流引用无效",
                            page_id
                        )))
                    }
                }
            }
            Ok(all_content)
        }
        _ => Err(RedactionError::Decode(format!(
            "无法获取页面 {:?} 的内容",
            page_id
        ))),
    }
}

/// 资源字典中的 XObject 名称 → 对象 ID
pub fn xobject_map(doc: &Document, resources: &Dictionary) -> BTreeMap<Vec<u8>, ObjectId> {
    let mut out = BTreeMap::new();
    let xobjects = match resources.get(b"XObject").ok().and_then(|o| resolve_dict(doc, o)) {
        Some(dict) => dict,
        None => return out,
    };
    for (name, obj) in xobjects.iter() {
        if let Object::Reference(id) = obj {
            out.insert(name.clone(), *id);
        }
    }
    out
}

/// 页面资源中的 XObject 名称 → 对象 ID
pub fn get_page_xobjects(doc: &Document, page_id: ObjectId) -> BTreeMap<Vec<u8>, ObjectId> {
    match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => xobject_map(doc, dict),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_decoded_content_inflates_image_stream() {
        let mut dict = Dictionary::new();
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        let mut stream = Stream::new(dict, vec![7u8; 64]);
        stream.compress().unwrap();
        assert!(stream.dict.get(b"Filter").is_ok());
        assert!(stream.decompressed_content().is_err());
        assert_eq!(decoded_content(&stream).unwrap(), vec![7u8; 64]);
    }

    #[test]
    fn test_decoded_content_passes_raw_through() {
        let stream = Stream::new(Dictionary::new(), b"q Q".to_vec());
        assert_eq!(decoded_content(&stream).unwrap(), b"q Q".to_vec());
    }

    #[test]
    fn test_to_pdf_rect_unrotated() {
        let r = to_pdf_rect(
            &BoundingBox::new(0.25, 0.25, 0.5, 0.25),
            (0.0, 0.0, 100.0, 200.0),
            0,
        );
        assert!(close(r.x, 25.0));
        assert!(close(r.y, 100.0));
        assert!(close(r.width, 50.0));
        assert!(close(r.height, 50.0));
    }

    #[test]
    fn test_to_pdf_rect_respects_box_origin() {
        let r = to_pdf_rect(
            &BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            (10.0, 20.0, 110.0, 220.0),
            0,
        );
        assert!(close(r.x, 10.0));
        assert!(close(r.y, 20.0));
        assert!(close(r.right(), 110.0));
        assert!(close(r.top(), 220.0));
    }

    #[test]
    fn test_to_pdf_rect_rotated() {
        let page = (0.0, 0.0, 100.0, 200.0);
        // 顺时针 90°：显示左上角对应未旋转页面的左下角
        let r = to_pdf_rect(&BoundingBox::new(0.0, 0.0, 0.5, 0.25), page, 90);
        assert!(close(r.x, 0.0) && close(r.y, 0.0));
        assert!(close(r.width, 25.0) && close(r.height, 100.0));

        // 180°：显示左上角对应右下角
        let r = to_pdf_rect(&BoundingBox::new(0.0, 0.0, 0.5, 0.25), page, 180);
        assert!(close(r.right(), 100.0) && close(r.y, 0.0));
        assert!(close(r.width, 50.0) && close(r.height, 50.0));

        // 270°：显示左上角对应右上角
        let r = to_pdf_rect(&BoundingBox::new(0.0, 0.0, 0.5, 0.25), page, 270);
        assert!(close(r.right(), 100.0) && close(r.top(), 200.0));
        assert!(close(r.width, 25.0) && close(r.height, 100.0));
    }
}
