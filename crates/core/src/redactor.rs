//! 统一脱敏接口
//!
//! 图片与 PDF 渲染器都实现 `Redactor`，编排层只依赖此 trait。

use std::path::Path;

use crate::entity::{PiiEntity, PiiTypeFilter};
use crate::RedactionError;

/// 一次渲染的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    /// 实际绘制的区域数
    pub regions: usize,
    /// 被修改的页数（图片恒为 1）
    pub pages: usize,
}

pub trait Redactor: Send + Sync {
    /// 把实体区域不可逆地涂黑，结果写入 `dest`
    ///
    /// 渲染前按 `types` 再过滤一次；只有整份文档渲染成功才会写出 `dest`。
    fn redact(
        &self,
        source: &Path,
        entities: &[PiiEntity],
        types: &PiiTypeFilter,
        dest: &Path,
    ) -> Result<RenderReport, RedactionError>;
}
