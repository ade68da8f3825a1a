//! 图片脱敏：把归一化边界框换算为像素矩形并涂成不透明黑色。

use std::io::BufWriter;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgba};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use shade_core::{BoundingBox, PiiEntity, PiiTypeFilter, RedactionError, Redactor, RenderReport};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// 栅格图片渲染器（PNG / JPEG / BMP / TIFF）
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterRedactor;

impl RasterRedactor {
    pub fn new() -> Self {
        Self
    }
}

/// 归一化框 → 像素矩形：起点向下取整、终点向上取整，并裁剪到图片范围
pub fn pixel_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let b = bbox.clamped();
    let (w, h) = (width as f32, height as f32);
    let x0 = (b.left * w).floor().max(0.0) as u32;
    let y0 = (b.top * h).floor().max(0.0) as u32;
    let x1 = ((b.right() * w).ceil() as u32).min(width);
    let y1 = ((b.bottom() * h).ceil() as u32).min(height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0))
}

/// 在内存中的图片上绘制黑框，返回实际绘制数
pub fn paint_regions<'a, I>(img: &mut DynamicImage, boxes: I) -> usize
where
    I: IntoIterator<Item = &'a BoundingBox>,
{
    let (width, height) = (img.width(), img.height());
    let mut painted = 0;
    for bbox in boxes {
        if let Some(rect) = pixel_rect(bbox, width, height) {
            draw_filled_rect_mut(img, rect, BLACK);
            painted += 1;
        }
    }
    painted
}

impl Redactor for RasterRedactor {
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
        let format = ImageFormat::from_path(source)
            .map_err(|e| RedactionError::Decode(format!("无法识别图片格式: {}", e)))?;
        let mut img = image::open(source)
            .map_err(|e| RedactionError::Decode(format!("打开图片失败: {}", e)))?;

        let boxes: Vec<&BoundingBox> = entities
            .iter()
            .filter(|e| types.allows(e.kind))
            .map(|e| &e.bbox)
            .collect();
        let painted = paint_regions(&mut img, boxes);
        log::info!(
            "[Raster] {}x{} 图片绘制 {} 个黑框",
            img.width(),
            img.height(),
            painted
        );

        // JPEG 不支持透明通道
        let img = match format {
            ImageFormat::Jpeg | ImageFormat::Bmp => DynamicImage::ImageRgb8(img.to_rgb8()),
            _ => img,
        };
        write_image_atomic(&img, format, dest)?;

        Ok(RenderReport {
            regions: painted,
            pages: 1,
        })
    }
}

fn write_image_atomic(
    img: &DynamicImage,
    format: ImageFormat,
    dest: &Path,
) -> Result<(), RedactionError> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        img.write_to(&mut writer, format)
            .map_err(|e| RedactionError::Encode(format!("写出图片失败: {}", e)))?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| RedactionError::Io(e.error))?;
    Ok(())
}
