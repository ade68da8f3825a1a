//! 脱敏流水线的核心数据模型
//!
//! 坐标、实体、类型开关以及偏移到几何位置的映射。

pub mod cancel;
pub mod entity;
pub mod geometry;
pub mod mapping;
pub mod redactor;

use std::path::PathBuf;

pub use cancel::CancelFlag;
pub use entity::{
    entities_on_page, filter, mask_snippet, normalize, EntitySource, PiiEntity, PiiKind,
    PiiTypeFilter, TextLine,
};
pub use geometry::BoundingBox;
pub use mapping::{
    exclude_covered, map_offsets_to_boxes, FragmentText, OffsetEntity, SpannedFragment,
    WordFragment,
};
pub use redactor::{Redactor, RenderReport};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("未知的 PII 类型: {0}")]
    UnknownKind(String),
}

/// 渲染阶段错误
#[derive(Debug, thiserror::Error)]
pub enum RedactionError {
    #[error("源文件不存在: {0}")]
    SourceMissing(PathBuf),
    #[error("文件解码失败: {0}")]
    Decode(String),
    #[error("无法处理的内嵌图片 {object}: {reason}")]
    UnsupportedImage { object: String, reason: String },
    #[error("坐标转换失败: {0}")]
    Geometry(String),
    #[error("输出编码失败: {0}")]
    Encode(String),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}
