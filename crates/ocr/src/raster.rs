//! PDF 页面栅格化（供 OCR 使用）
//!
//! 使用 pdfium-render 把每页渲染为 PNG。渲染结果是明文，
//! 必须写入调用方提供的暂存目录。

use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

use crate::OcrError;

/// 默认渲染 DPI
pub const DEFAULT_DPI: u32 = 200;

/// pdfium 动态库搜索路径
fn pdfium_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(dir) = std::env::var("SHADE_PDFIUM_DIR") {
        paths.push(PathBuf::from(dir));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            paths.push(exe_dir.join("libs"));
            paths.push(exe_dir.to_path_buf());
        }
    }

    paths.push(PathBuf::from("libs"));
    paths.push(PathBuf::from("./"));
    paths
}

fn bind_pdfium() -> Result<Pdfium, OcrError> {
    for path in pdfium_search_paths() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&path);
        log::debug!("[Raster] 尝试加载 pdfium: {:?}", lib_path);
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            log::debug!("[Raster] 成功从 {:?} 加载 pdfium", path);
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| OcrError::EngineUnavailable(format!("Pdfium 库不可用: {}", e)))
}

/// 把 PDF 每一页渲染为 `out_dir/page-<n>.png`，按页序返回
pub fn render_pages(pdf_path: &Path, out_dir: &Path, dpi: u32) -> Result<Vec<PathBuf>, OcrError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| OcrError::Render(format!("加载 PDF 失败: {}", e)))?;

    let scale = dpi as f32 / 72.0;
    let mut outputs = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let target_width = (page.width().value * scale) as i32;
        let target_height = (page.height().value * scale) as i32;
        let config = PdfRenderConfig::new()
            .set_target_width(target_width)
            .set_target_height(target_height);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| OcrError::Render(format!("渲染页面 {} 失败: {}", index, e)))?;

        let output = out_dir.join(format!("page-{}.png", index));
        bitmap
            .as_image()
            .to_rgb8()
            .save(&output)
            .map_err(|e| OcrError::ImageProcess(format!("保存页面图片失败: {}", e)))?;

        log::debug!(
            "[Raster] 页面 {}: {}x{} px (DPI: {})",
            index,
            target_width,
            target_height,
            dpi
        );
        outputs.push(output);
    }

    log::info!("[Raster] 共渲染 {} 页", outputs.len());
    Ok(outputs)
}
