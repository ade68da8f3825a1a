//! 归一化坐标
//!
//! 所有检测结果统一使用相对于页面/图片宽高的比例坐标 `[0, 1]`，
//! 渲染阶段再换算为像素或 PDF 点。

use serde::{Deserialize, Serialize};

/// 归一化边界框（左上角原点）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// 多个框的外接矩形，空输入返回 `None`
    pub fn union<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        let mut iter = boxes.into_iter();
        let first = iter.next()?;
        let (mut l, mut t, mut r, mut b) = (first.left, first.top, first.right(), first.bottom());
        for bx in iter {
            l = l.min(bx.left);
            t = t.min(bx.top);
            r = r.max(bx.right());
            b = b.max(bx.bottom());
        }
        Some(BoundingBox::new(l, t, r - l, b - t))
    }

    /// 裁剪到 `[0, 1]` 范围内
    ///
    /// 上游（OCR）不保证 `left + width <= 1`，渲染前统一裁剪。
    pub fn clamped(&self) -> BoundingBox {
        let l = clamp01(self.left);
        let t = clamp01(self.top);
        let r = clamp01(self.right()).max(l);
        let b = clamp01(self.bottom()).max(t);
        BoundingBox::new(l, t, r - l, b - t)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }

    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width / 2.0, self.top + self.height / 2.0)
    }
}

fn clamp01(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
