use shade_core::PiiKind;

/// PDF 用户空间中的矩形（左下角原点）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl PdfRect {
  pub fn right(&self) -> f32 {
    self.x + self.width
  }

  pub fn top(&self) -> f32 {
    self.y + self.height
  }

  pub fn corners(&self) -> [(f32, f32); 4] {
    [
      (self.x, self.y),
      (self.right(), self.y),
      (self.right(), self.top()),
      (self.x, self.top()),
    ]
  }

  /// 与另一矩形相交（`margin` 向外扩展本矩形）
  pub fn intersects(&self, other: &PdfRect, margin: f32) -> bool {
    let x_overlap = other.x < self.right() + margin && other.right() > self.x - margin;
    let y_overlap = other.y < self.top() + margin && other.top() > self.y - margin;
    x_overlap && y_overlap
  }

  /// 点集的轴对齐外接矩形
  pub fn bounding(points: &[(f32, f32)]) -> Option<PdfRect> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.0, first.1, first.0, first.1);
    for (x, y) in &points[1..] {
      x0 = x0.min(*x);
      y0 = y0.min(*y);
      x1 = x1.max(*x);
      y1 = y1.max(*y);
    }
    Some(PdfRect { x: x0, y: y0, width: x1 - x0, height: y1 - y0 })
  }
}

/// 已登记、待应用的脱敏标注
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RedactionAnnotation {
  pub rect: PdfRect,
  pub kind: PiiKind,
}

/// PDF 仿射矩阵 `[a b c d e f]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub [f32; 6]);

impl Matrix {
  pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

  pub fn translate(tx: f32, ty: f32) -> Matrix {
    Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
  }

  /// `self × other`：先应用 self，再应用 other
  pub fn multiply(&self, other: &Matrix) -> Matrix {
    let [a, b, c, d, e, f] = self.0;
    let m = other.0;
    Matrix([
      a * m[0] + b * m[2],
      a * m[1] + b * m[3],
      c * m[0] + d * m[2],
      c * m[1] + d * m[3],
      e * m[0] + f * m[2] + m[4],
      e * m[1] + f * m[3] + m[5],
    ])
  }

  pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
    let [a, b, c, d, e, f] = self.0;
    (a * x + c * y + e, b * x + d * y + f)
  }

  pub fn inverse(&self) -> Option<Matrix> {
    let [a, b, c, d, e, f] = self.0;
    let det = a * d - b * c;
    if det.abs() < 1e-9 {
      return None;
    }
    Some(Matrix([
      d / det,
      -b / det,
      -c / det,
      a / det,
      (c * f - d * e) / det,
      (b * e - a * f) / det,
    ]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_matrix_inverse_roundtrip() {
    let m = Matrix([2.0, 0.5, -0.25, 3.0, 10.0, 20.0]);
    let inv = m.inverse().unwrap();
    let (x, y) = m.apply(3.0, 4.0);
    let (bx, by) = inv.apply(x, y);
    assert!((bx - 3.0).abs() < 1e-4);
    assert!((by - 4.0).abs() < 1e-4);
    assert!(Matrix([0.0; 6]).inverse().is_none());
  }

  #[test]
  fn test_matrix_multiply_order() {
    let scale = Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
    let shift = Matrix::translate(5.0, 0.0);
    assert_eq!(scale.multiply(&shift).apply(1.0, 1.0), (7.0, 2.0));
    assert_eq!(shift.multiply(&scale).apply(1.0, 1.0), (12.0, 2.0));
  }

  #[test]
  fn test_rect_intersects_with_margin() {
    let a = PdfRect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
    let b = PdfRect { x: 11.0, y: 0.0, width: 5.0, height: 5.0 };
    assert!(!a.intersects(&b, 0.0));
    assert!(a.intersects(&b, 2.0));
  }
}
