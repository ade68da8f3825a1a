//! Tesseract OCR 引擎（CLI 包装）
//!
//! 调用 `tesseract <image> <outbase> tsv`，解析单词级结果。
//! PDF 先逐页栅格化到暂存目录，再逐页识别；TSV 与日志也写在该暂存目录中。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use shade_core::{BoundingBox, CancelFlag, TextLine, WordFragment};
use shade_crypto::StagingDir;

use crate::raster::{self, DEFAULT_DPI};
use crate::{env_f32, env_u32, FragmentExtractor, OcrError, TextExtractor};

/// 子进程状态轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Tesseract 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TesseractConfig {
    /// 可执行文件路径
    pub binary_path: Option<String>,
    /// tessdata 目录路径
    pub tessdata_path: Option<String>,
    /// 语言（如 "eng"、"hin"）
    pub lang: Option<String>,
    /// 页面分割模式 (0-13)
    pub psm: Option<u8>,
    /// OCR 引擎模式 (0-3)
    pub oem: Option<u8>,
}

impl TesseractConfig {
    pub fn with_lang(lang: impl Into<String>) -> Self {
        Self {
            lang: Some(lang.into()),
            ..Self::default()
        }
    }

    /// 读取 `SHADE_TESSERACT_BIN` / `SHADE_TESSDATA` / `SHADE_OCR_PSM` / `SHADE_OCR_OEM`
    pub fn from_env(lang: impl Into<String>) -> Self {
        Self {
            binary_path: std::env::var("SHADE_TESSERACT_BIN").ok(),
            tessdata_path: std::env::var("SHADE_TESSDATA").ok(),
            lang: Some(lang.into()),
            psm: std::env::var("SHADE_OCR_PSM").ok().and_then(|v| v.parse().ok()),
            oem: std::env::var("SHADE_OCR_OEM").ok().and_then(|v| v.parse().ok()),
        }
    }

    pub fn lang_or_default(&self) -> &str {
        self.lang.as_deref().unwrap_or("eng")
    }

    pub fn psm_or_default(&self) -> u8 {
        self.psm.unwrap_or(3)
    }

    pub fn oem_or_default(&self) -> u8 {
        self.oem.unwrap_or(1)
    }

    fn binary(&self) -> &str {
        self.binary_path.as_deref().unwrap_or("tesseract")
    }
}

/// TSV 中的一个单词
#[derive(Debug, Clone, PartialEq)]
pub struct TsvWord {
    pub block: u32,
    pub par: u32,
    pub line: u32,
    pub text: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

pub struct TesseractEngine {
    config: TesseractConfig,
    version: String,
    dpi: u32,
    min_confidence: f32,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Result<Self, OcrError> {
        let version = get_tesseract_version(config.binary())?;
        log::info!(
            "[Tesseract] 初始化成功，版本: {}，语言: {}",
            version,
            config.lang_or_default()
        );
        Ok(Self {
            config,
            version,
            dpi: env_u32("SHADE_OCR_DPI", DEFAULT_DPI),
            min_confidence: env_f32("SHADE_OCR_MIN_CONF", 0.0),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn command(&self, image_path: &Path, out_base: &Path) -> Command {
        let mut cmd = Command::new(self.config.binary());
        cmd.arg(image_path)
            .arg(out_base)
            .arg("-l")
            .arg(self.config.lang_or_default())
            .arg("--psm")
            .arg(self.config.psm_or_default().to_string())
            .arg("--oem")
            .arg(self.config.oem_or_default().to_string())
            .arg("tsv");
        if let Some(tessdata_path) = &self.config.tessdata_path {
            cmd.env("TESSDATA_PREFIX", tessdata_path);
        }
        cmd
    }

    /// 识别单张图片，返回单词级结果
    ///
    /// 输出写入 `scratch`；`cancel` 置位时终止子进程并返回 `Cancelled`。
    pub fn recognize_words(
        &self,
        image_path: &Path,
        scratch: &Path,
        cancel: &CancelFlag,
    ) -> Result<Vec<TsvWord>, OcrError> {
        let start = Instant::now();
        let stem = image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("page");
        let out_base = scratch.join(format!("{}_ocr", stem));
        let tsv_path = scratch.join(format!("{}_ocr.tsv", stem));
        let log_path = scratch.join(format!("{}_ocr.log", stem));

        let mut child = self
            .command(image_path, &out_base)
            .stdout(Stdio::null())
            .stderr(Stdio::from(File::create(&log_path)?))
            .spawn()
            .map_err(|e| OcrError::EngineUnavailable(format!("执行 tesseract 失败: {}", e)))?;

        let status = loop {
            if cancel.is_cancelled() {
                let pid = child.id();
                let _ = child.kill();
                let _ = child.wait();
                log::warn!("[Tesseract] 识别被取消，已终止进程 {}", pid);
                return Err(OcrError::Cancelled);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => thread::sleep(POLL_INTERVAL),
            }
        };
        if !status.success() {
            let stderr = fs::read_to_string(&log_path).unwrap_or_default();
            return Err(OcrError::Recognition(format!(
                "Tesseract 执行失败: {}",
                stderr.trim()
            )));
        }

        let (width, height) = image::image_dimensions(image_path)
            .map_err(|e| OcrError::ImageProcess(format!("读取图片尺寸失败: {}", e)))?;
        let tsv = fs::read_to_string(&tsv_path)?;
        let words = parse_tsv(&tsv, width as f32, height as f32, self.min_confidence);

        log::info!(
            "[Tesseract] 识别完成，耗时: {} ms，单词数: {}",
            start.elapsed().as_millis(),
            words.len()
        );
        Ok(words)
    }

    /// 对输入逐页识别；中间文件只在本函数内的暂存目录中存在
    ///
    /// 暂存目录建在输入所在目录下，该目录已被清理时直接失败，不会重新创建。
    fn recognize_pages<T>(
        &self,
        path: &Path,
        cancel: &CancelFlag,
        mut per_page: impl FnMut(usize, Vec<TsvWord>) -> Vec<T>,
    ) -> Result<Vec<T>, OcrError> {
        let scratch_root = path.parent().unwrap_or_else(|| Path::new("."));
        if !scratch_root.is_dir() {
            return Err(OcrError::Staging(format!(
                "输入目录不存在: {}",
                scratch_root.display()
            )));
        }
        let scratch = StagingDir::create_in(scratch_root)
            .map_err(|e| OcrError::Staging(e.to_string()))?;

        let mut out = Vec::new();
        if is_pdf(path) {
            let pages: Vec<PathBuf> = raster::render_pages(path, scratch.path(), self.dpi)?;
            for (index, page) in pages.iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(OcrError::Cancelled);
                }
                out.extend(per_page(index, self.recognize_words(page, scratch.path(), cancel)?));
            }
        } else {
            out.extend(per_page(0, self.recognize_words(path, scratch.path(), cancel)?));
        }
        Ok(out)
    }
}

impl TextExtractor for TesseractEngine {
    fn extract(&self, path: &Path) -> Result<Vec<TextLine>, OcrError> {
        self.extract_cancellable(path, &CancelFlag::new())
    }

    fn extract_cancellable(&self, path: &Path, cancel: &CancelFlag) -> Result<Vec<TextLine>, OcrError> {
        self.recognize_pages(path, cancel, |page, words| group_lines(&words, page))
    }
}

impl FragmentExtractor for TesseractEngine {
    fn extract_fragments(&self, path: &Path) -> Result<Vec<WordFragment>, OcrError> {
        self.extract_fragments_cancellable(path, &CancelFlag::new())
    }

    fn extract_fragments_cancellable(
        &self,
        path: &Path,
        cancel: &CancelFlag,
    ) -> Result<Vec<WordFragment>, OcrError> {
        self.recognize_pages(path, cancel, |page, words| {
            words
                .into_iter()
                .map(|w| WordFragment {
                    text: w.text,
                    bbox: w.bbox,
                    page,
                })
                .collect()
        })
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// 解析 Tesseract TSV 输出
///
/// level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
///
/// 只保留 word 级别 (level=5)，坐标归一化到 0-1，置信度换算为 0-1。
pub fn parse_tsv(tsv: &str, img_width: f32, img_height: f32, min_confidence: f32) -> Vec<TsvWord> {
    let mut words = Vec::new();
    if img_width <= 0.0 || img_height <= 0.0 {
        return words;
    }

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }

        let level: i32 = cols[0].parse().unwrap_or(-1);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if level != 5 || text.is_empty() || conf < 0.0 {
            continue;
        }
        let confidence = conf / 100.0;
        if confidence < min_confidence {
            continue;
        }

        let num = |i: usize| cols[i].parse::<f32>().unwrap_or(0.0);
        let id = |i: usize| cols[i].parse::<u32>().unwrap_or(0);
        words.push(TsvWord {
            block: id(2),
            par: id(3),
            line: id(4),
            text: text.to_string(),
            confidence,
            bbox: BoundingBox::new(
                num(6) / img_width,
                num(7) / img_height,
                num(8) / img_width,
                num(9) / img_height,
            ),
        });
    }
    words
}

/// 按 (block, par, line) 把单词合并为行，行框取单词框并集
pub fn group_lines(words: &[TsvWord], page: usize) -> Vec<TextLine> {
    let mut grouped: BTreeMap<(u32, u32, u32), Vec<&TsvWord>> = BTreeMap::new();
    for word in words {
        grouped
            .entry((word.block, word.par, word.line))
            .or_default()
            .push(word);
    }

    grouped
        .into_values()
        .filter_map(|line_words| {
            let bbox = BoundingBox::union(line_words.iter().map(|w| &w.bbox))?;
            let text = line_words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Some(TextLine { text, bbox, page })
        })
        .collect()
}

/// 获取 Tesseract 版本
pub fn get_tesseract_version(binary_path: &str) -> Result<String, OcrError> {
    let output = Command::new(binary_path)
        .arg("--version")
        .output()
        .map_err(|e| OcrError::EngineUnavailable(format!("无法执行 tesseract: {}", e)))?;

    if !output.status.success() {
        return Err(OcrError::EngineUnavailable(
            "tesseract --version 执行失败".to_string(),
        ));
    }

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    for line in combined.lines() {
        if line.contains("tesseract") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                return Ok(parts[1].trim_start_matches('v').to_string());
            }
        }
    }
    Ok("unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t1000\t500\t-1\t
4\t1\t1\t1\t1\t0\t100\t50\t400\t40\t-1\t
5\t1\t1\t1\t1\t1\t100\t50\t100\t40\t96.5\tPAN:
5\t1\t1\t1\t1\t2\t220\t50\t280\t40\t91.0\tABCDE1234F
5\t1\t1\t1\t2\t1\t100\t120\t200\t40\t88.0\tDOB
5\t1\t1\t1\t2\t2\t320\t120\t10\t40\t95.0\t 
5\t1\t2\t1\t1\t1\t600\t300\t100\t50\t12.0\tnoise
";

    #[test]
    fn test_parse_tsv_words() {
        let words = parse_tsv(TSV, 1000.0, 500.0, 0.0);
        assert_eq!(words.len(), 4);
        assert_eq!(words[1].text, "ABCDE1234F");
        assert!((words[1].bbox.left - 0.22).abs() < 1e-6);
        assert!((words[1].bbox.top - 0.1).abs() < 1e-6);
        assert!((words[1].confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tsv_min_confidence() {
        let words = parse_tsv(TSV, 1000.0, 500.0, 0.5);
        assert!(words.iter().all(|w| w.text != "noise"));
    }

    #[test]
    fn test_group_lines() {
        let words = parse_tsv(TSV, 1000.0, 500.0, 0.0);
        let lines = group_lines(&words, 1);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "PAN: ABCDE1234F");
        assert_eq!(lines[0].page, 1);
        assert!((lines[0].bbox.left - 0.1).abs() < 1e-6);
        assert!((lines[0].bbox.right() - 0.5).abs() < 1e-6);
        assert_eq!(lines[1].text, "DOB");
    }

    #[test]
    fn test_config_defaults() {
        let config = TesseractConfig::default();
        assert_eq!(config.lang_or_default(), "eng");
        assert_eq!(config.psm_or_default(), 3);
        assert_eq!(config.oem_or_default(), 1);
        assert_eq!(TesseractConfig::with_lang("hin").lang_or_default(), "hin");
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Path::new("decrypted_input.PDF")));
        assert!(!is_pdf(Path::new("decrypted_input.png")));
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::mpsc;

        const VERSION_GUARD: &str = "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo \"tesseract 5.3.0\"; exit 0; fi\n";

        /// 写出一个假的 tesseract 可执行脚本
        fn fake_tesseract(dir: &Path, body: &str) -> TesseractEngine {
            let bin = dir.join("fake-tesseract");
            {
                let mut file = File::create(&bin).unwrap();
                file.write_all(format!("{}{}", VERSION_GUARD, body).as_bytes()).unwrap();
                file.sync_all().unwrap();
            }
            fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
            let config = TesseractConfig {
                binary_path: Some(bin.to_string_lossy().to_string()),
                ..TesseractConfig::with_lang("eng")
            };
            TesseractEngine::new(config).unwrap()
        }

        fn input_image(dir: &Path) -> PathBuf {
            let input_dir = dir.join("staged");
            fs::create_dir(&input_dir).unwrap();
            let path = input_dir.join("decrypted_primary.png");
            image::GrayImage::from_pixel(100, 50, image::Luma([255u8]))
                .save(&path)
                .unwrap();
            path
        }

        #[test]
        fn test_words_read_from_tsv_file() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_tesseract(
                dir.path(),
                "printf 'level\\tpage_num\\tblock_num\\tpar_num\\tline_num\\tword_num\\tleft\\ttop\\twidth\\theight\\tconf\\ttext\\n5\\t1\\t1\\t1\\t1\\t1\\t10\\t10\\t50\\t20\\t95\\tABCDE1234F\\n' > \"$2.tsv\"\n",
            );
            let input = input_image(dir.path());

            let lines = engine.extract(&input).unwrap();
            assert_eq!(lines.len(), 1);
            assert_eq!(lines[0].text, "ABCDE1234F");
            assert!((lines[0].bbox.left - 0.1).abs() < 1e-6);
            // 暂存目录随识别结束删除
            assert_eq!(fs::read_dir(input.parent().unwrap()).unwrap().count(), 1);
        }

        #[test]
        fn test_cancel_kills_child() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_tesseract(dir.path(), "exec sleep 30\n");
            let input = input_image(dir.path());

            let cancel = CancelFlag::new();
            let (tx, rx) = mpsc::channel();
            let worker_cancel = cancel.clone();
            let worker_input = input.clone();
            let handle = thread::spawn(move || {
                let started = Instant::now();
                let result = engine.extract_cancellable(&worker_input, &worker_cancel);
                let _ = tx.send(started.elapsed());
                result
            });

            thread::sleep(Duration::from_millis(200));
            cancel.cancel();
            let elapsed = rx.recv_timeout(Duration::from_secs(10)).unwrap();
            assert!(elapsed < Duration::from_secs(10));
            assert!(matches!(handle.join().unwrap(), Err(OcrError::Cancelled)));
            assert_eq!(fs::read_dir(input.parent().unwrap()).unwrap().count(), 1);
        }

        #[test]
        fn test_missing_input_dir_not_recreated() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_tesseract(dir.path(), "exit 0\n");
            let gone = dir.path().join("cleaned").join("decrypted_primary.png");

            let err = engine.extract(&gone).unwrap_err();
            assert!(matches!(err, OcrError::Staging(_)));
            assert!(!dir.path().join("cleaned").exists());
        }
    }
}
