use lopdf::{
    content::{Content, Operation},
    Object,
};
use shade_core::RedactionError;

use crate::types::{Matrix, PdfRect};
use crate::utils::get_number;

/// 字形与脱敏区域比较时的外扩量（pt）
const TEXT_MARGIN: f32 = 2.0;

/// 内容流扫描结果
#[derive(Debug, Default)]
pub struct ContentScan {
    /// 移除字形后的内容流（未追加黑框）
    pub operations: Vec<Operation>,
    /// 被替换为空格的字形数
    pub glyphs_removed: usize,
    /// 页面上每次 `Do` 的 XObject 名称及其当时的 CTM
    pub placements: Vec<(Vec<u8>, Matrix)>,
}

/// 图形状态中与文本相关的参数
#[derive(Debug, Clone, Copy)]
struct TextParams {
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    /// Tz / 100
    horizontal_scale: f32,
    leading: f32,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
        }
    }
}

/// 估算单个字形的宽度（以字号为单位）
fn estimate_glyph_width(byte: u8) -> f32 {
    if byte < 128 {
        0.55
    } else {
        1.0
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(operands) {
        *slot = get_number(obj)?;
    }
    Some(out)
}

struct Scanner<'a> {
    rects: &'a [PdfRect],
    ctm: Matrix,
    params: TextParams,
    stack: Vec<(Matrix, TextParams)>,
    tm: Matrix,
    tlm: Matrix,
    removed: usize,
}

impl<'a> Scanner<'a> {
    fn new(rects: &'a [PdfRect], ctm: Matrix) -> Self {
        Self {
            rects,
            ctm,
            params: TextParams::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            removed: 0,
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).multiply(&self.tlm);
        self.tm = self.tlm;
    }

    /// 逐字节定位字形，落入区域的替换为空格，同时推进文本矩阵
    fn redact_string(&mut self, text: &[u8]) -> (Vec<u8>, bool) {
        let p = self.params;
        let mut result = Vec::with_capacity(text.len());
        let mut any = false;

        for &byte in text {
            let glyph_width = estimate_glyph_width(byte) * p.font_size;
            let trm = self.tm.multiply(&self.ctm);
            let corners = [
                trm.apply(0.0, -0.2 * p.font_size),
                trm.apply(glyph_width * p.horizontal_scale, -0.2 * p.font_size),
                trm.apply(glyph_width * p.horizontal_scale, 0.9 * p.font_size),
                trm.apply(0.0, 0.9 * p.font_size),
            ];
            let hit = PdfRect::bounding(&corners)
                .map(|glyph| self.rects.iter().any(|r| r.intersects(&glyph, TEXT_MARGIN)))
                .unwrap_or(false);

            if hit && byte != b' ' {
                result.push(b' ');
                self.removed += 1;
                any = true;
            } else {
                result.push(byte);
            }

            let spacing = if byte == b' ' { p.word_spacing } else { 0.0 };
            let advance = (glyph_width + p.char_spacing + spacing) * p.horizontal_scale;
            self.tm = Matrix::translate(advance, 0.0).multiply(&self.tm);
        }

        (result, any)
    }

    fn redact_operand(&mut self, obj: &Object) -> Option<Object> {
        match obj {
            Object::String(s, fmt) => {
                let (redacted, any) = self.redact_string(s);
                any.then(|| Object::String(redacted, *fmt))
            }
            _ => None,
        }
    }

    fn redact_array(&mut self, arr: &[Object]) -> Option<Object> {
        let mut new_array = Vec::with_capacity(arr.len());
        let mut any = false;
        for item in arr {
            match item {
                Object::String(s, fmt) => {
                    let (redacted, hit) = self.redact_string(s);
                    any |= hit;
                    new_array.push(Object::String(redacted, *fmt));
                }
                other => {
                    if let Some(n) = get_number(other) {
                        let adjust = -n / 1000.0 * self.params.font_size * self.params.horizontal_scale;
                        self.tm = Matrix::translate(adjust, 0.0).multiply(&self.tm);
                    }
                    new_array.push(other.clone());
                }
            }
        }
        any.then_some(Object::Array(new_array))
    }
}

pub fn decode_operations(content_data: &[u8]) -> Result<Vec<Operation>, RedactionError> {
    Content::decode(content_data)
        .map(|c| c.operations)
        .map_err(|e| RedactionError::Decode(format!("内容流解析失败: {}", e)))
}

/// 扫描页面内容流：把落在区域内的文字替换为空格，并记录 XObject 绘制位置
pub fn process_content_stream(
    content_data: &[u8],
    rects: &[PdfRect],
) -> Result<ContentScan, RedactionError> {
    Ok(process_operations(decode_operations(content_data)?, rects, Matrix::IDENTITY))
}

/// 以 `ctm` 为初始变换扫描一段操作序列（Form XObject 使用其绘制时的 CTM）
pub fn process_operations(source: Vec<Operation>, rects: &[PdfRect], ctm: Matrix) -> ContentScan {
    let mut scanner = Scanner::new(rects, ctm);
    let mut operations = Vec::with_capacity(source.len());
    let mut placements = Vec::new();

    for op in source {
        let operator = op.operator.as_str();
        match operator {
            "q" => scanner.stack.push((scanner.ctm, scanner.params)),
            "Q" => {
                if let Some((ctm, params)) = scanner.stack.pop() {
                    scanner.ctm = ctm;
                    scanner.params = params;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(&op.operands) {
                    scanner.ctm = Matrix(m).multiply(&scanner.ctm);
                }
            }
            "BT" => {
                scanner.tm = Matrix::IDENTITY;
                scanner.tlm = Matrix::IDENTITY;
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(&op.operands) {
                    scanner.tm = Matrix(m);
                    scanner.tlm = Matrix(m);
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(&op.operands) {
                    scanner.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(&op.operands) {
                    scanner.params.leading = -ty;
                    scanner.next_line(tx, ty);
                }
            }
            "T*" => {
                let leading = scanner.params.leading;
                scanner.next_line(0.0, -leading);
            }
            "Tf" => {
                if let Some(size) = op.operands.get(1).and_then(get_number) {
                    scanner.params.font_size = size.abs();
                }
            }
            "Tc" => {
                if let Some([v]) = numbers::<1>(&op.operands) {
                    scanner.params.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some([v]) = numbers::<1>(&op.operands) {
                    scanner.params.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some([v]) = numbers::<1>(&op.operands) {
                    scanner.params.horizontal_scale = v / 100.0;
                }
            }
            "TL" => {
                if let Some([v]) = numbers::<1>(&op.operands) {
                    scanner.params.leading = v;
                }
            }
            "Do" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    placements.push((name.clone(), scanner.ctm));
                }
            }
            _ => {}
        }

        let replaced = match operator {
            "Tj" => op
                .operands
                .first()
                .and_then(|o| scanner.redact_operand(o))
                .map(|o| Operation::new("Tj", vec![o])),
            "TJ" => match op.operands.first() {
                Some(Object::Array(arr)) => scanner
                    .redact_array(arr)
                    .map(|o| Operation::new("TJ", vec![o])),
                _ => None,
            },
            "'" => {
                let leading = scanner.params.leading;
                scanner.next_line(0.0, -leading);
                op.operands
                    .first()
                    .and_then(|o| scanner.redact_operand(o))
                    .map(|o| Operation::new("'", vec![o]))
            }
            "\"" if op.operands.len() >= 3 => {
                if let Some([aw, ac]) = numbers::<2>(&op.operands) {
                    scanner.params.word_spacing = aw;
                    scanner.params.char_spacing = ac;
                }
                let leading = scanner.params.leading;
                scanner.next_line(0.0, -leading);
                scanner.redact_operand(&op.operands[2]).map(|o| {
                    let mut operands = op.operands.clone();
                    operands[2] = o;
                    Operation::new("\"", operands)
                })
            }
            _ => None,
        };

        operations.push(replaced.unwrap_or(op));
    }

    if scanner.removed > 0 {
        log::debug!("[PDF] 移除 {} 个字形", scanner.removed);
    }

    ContentScan {
        operations,
        glyphs_removed: scanner.removed,
        placements,
    }
}

/// 原内容包在 q/Q 中，再在默认用户空间追加不透明黑框
pub fn add_black_overlay(
    operations: Vec<Operation>,
    rects: &[PdfRect],
) -> Result<Vec<u8>, RedactionError> {
    let mut new_operations = Vec::with_capacity(operations.len() + rects.len() * 2 + 6);
    new_operations.push(Operation::new("q", vec![]));
    new_operations.extend(operations);
    new_operations.push(Operation::new("Q", vec![]));

    new_operations.push(Operation::new("q", vec![]));
    new_operations.push(Operation::new(
        "rg",
        vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
    ));
    for rect in rects {
        new_operations.push(Operation::new(
            "re",
            vec![
                Object::Real(rect.x),
                Object::Real(rect.y),
                Object::Real(rect.width),
                Object::Real(rect.height),
            ],
        ));
        new_operations.push(Operation::new("f", vec![]));
    }
    new_operations.push(Operation::new("Q", vec![]));

    Content {
        operations: new_operations,
    }
    .encode()
    .map_err(|e| RedactionError::Encode(format!("内容流编码失败: {}", e)))
}

/// 内容流中所有文本操作数的原始字节
pub fn shown_strings(content_data: &[u8]) -> Vec<Vec<u8>> {
    let content = match Content::decode(content_data) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let mut out = Vec::new();
    for op in content.operations {
        let collect = |obj: &Object, out: &mut Vec<Vec<u8>>| {
            if let Object::String(s, _) = obj {
                out.push(s.clone());
            }
        };
        match op.operator.as_str() {
            "Tj" | "'" | "\"" => {
                if let Some(last) = op.operands.last() {
                    collect(last, &mut out);
                }
            }
            "TJ" => {
                if let Some(Object::Array(arr)) = op.operands.first() {
                    arr.iter().for_each(|o| collect(o, &mut out));
                }
            }
            _ => {}
        }
    }
    out
}
