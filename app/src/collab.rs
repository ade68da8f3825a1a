//! 协作方（OCR / NER）装配与超时边界
//!
//! 协作方在启动时构造一次，以 `Arc<dyn …>` 注入流水线，运行结束后随 `Collaborators` 一起释放。

use std::fmt::Display;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use shade_core::CancelFlag;
use shade_ocr::{FragmentExtractor, TesseractConfig, TesseractEngine, TextExtractor};
use shade_rules::{EntityRecognizer, NerError, NerSpan, OffsetRecognizer};

use crate::config::Settings;
use crate::ner::HttpNerClient;
use crate::PipelineError;

/// 第二文字（天城文）一遍所需的协作方
#[derive(Clone)]
pub struct SecondaryCollaborators {
    pub ocr: Arc<dyn FragmentExtractor>,
    pub ner: Arc<dyn OffsetRecognizer>,
}

#[derive(Clone)]
pub struct Collaborators {
    pub ocr: Arc<dyn TextExtractor>,
    pub ner: Arc<dyn EntityRecognizer>,
    pub secondary: Option<SecondaryCollaborators>,
}

impl Collaborators {
    pub fn new(ocr: Arc<dyn TextExtractor>, ner: Arc<dyn EntityRecognizer>) -> Self {
        Self {
            ocr,
            ner,
            secondary: None,
        }
    }

    pub fn with_secondary(
        mut self,
        ocr: Arc<dyn FragmentExtractor>,
        ner: Arc<dyn OffsetRecognizer>,
    ) -> Self {
        self.secondary = Some(SecondaryCollaborators { ocr, ner });
        self
    }

    /// 按配置构造 Tesseract + HTTP NER
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let timeout = settings.runtime.collab_timeout();
        let ocr = TesseractEngine::new(TesseractConfig::from_env("eng"))
            .context("主 OCR（Tesseract eng）不可用")?;
        let ner = HttpNerClient::primary_from_env(timeout)?;
        log::info!("[Collab] 主 OCR: Tesseract {}, NER: {}", ocr.version(), ner.endpoint());
        let collaborators = Self::new(Arc::new(ocr), Arc::new(ner));

        if !settings.second_pass_enabled() {
            return Ok(collaborators);
        }
        let lang = tesseract_languages(&settings.hindi.languages);
        let secondary_ocr = TesseractEngine::new(TesseractConfig::from_env(lang.clone()))
            .with_context(|| format!("第二文字 OCR（Tesseract {}）不可用", lang))?;
        let secondary_ner = HttpNerClient::secondary_from_env(&settings.hindi.ner_model, timeout)?;
        log::info!(
            "[Collab] 第二文字 OCR: {}, NER: {} ({})",
            lang,
            secondary_ner.endpoint(),
            settings.hindi.ner_model
        );
        Ok(collaborators.with_secondary(Arc::new(secondary_ocr), Arc::new(secondary_ner)))
    }
}

/// 配置中的语言代码 → Tesseract 语言串（`hi`,`en` → `hin+eng`）
pub fn tesseract_languages(codes: &[String]) -> String {
    let mapped: Vec<&str> = codes
        .iter()
        .map(|c| match c.trim().to_ascii_lowercase().as_str() {
            "hi" => "hin",
            "en" => "eng",
            "mr" => "mar",
            "ne" => "nep",
            "sa" => "san",
            _ => c.trim(),
        })
        .filter(|c| !c.is_empty())
        .collect();
    if mapped.is_empty() {
        "hin".to_string()
    } else {
        mapped.join("+")
    }
}

/// 超时后等待工作线程退出的上限
const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// 在独立线程中执行协作方调用，超时或出错都视为 `ExtractionFailed`
///
/// 超时后置位传给 `call` 的取消标记，并等工作线程退出后才返回，
/// 调用方随后清理暂存目录时协作方已不再访问其中的明文。
/// 宽限期内仍未退出的线程只能分离，记录为错误。
pub fn call_with_timeout<T, E, F>(
    label: &str,
    timeout: Duration,
    call: F,
) -> Result<T, PipelineError>
where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: FnOnce(&CancelFlag) -> Result<T, E> + Send + 'static,
{
    let cancel = CancelFlag::new();
    let worker_cancel = cancel.clone();
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(format!("shade-{}", label.to_ascii_lowercase()))
        .spawn(move || {
            let _ = tx.send(call(&worker_cancel));
        })?;

    let result = match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(PipelineError::ExtractionFailed(format!("{}: {}", label, e))),
        Err(RecvTimeoutError::Timeout) => {
            cancel.cancel();
            let expired = PipelineError::ExtractionFailed(format!(
                "{} 超时（{} 秒）",
                label,
                timeout.as_secs()
            ));
            if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(CANCEL_GRACE) {
                log::error!(
                    "[Collab] {} 取消后 {} 秒仍未退出，线程已分离",
                    label,
                    CANCEL_GRACE.as_secs()
                );
                return Err(expired);
            }
            log::warn!("[Collab] {} 超时，已中止", label);
            Err(expired)
        }
        Err(RecvTimeoutError::Disconnected) => Err(PipelineError::ExtractionFailed(format!(
            "{} 异常退出",
            label
        ))),
    };
    // 结果已送达或线程已结束，这里不会阻塞
    let _ = handle.join();
    result
}

/// 每次请求前检查取消标记的 NER 包装
pub struct CancellableNer<'a> {
    inner: &'a dyn EntityRecognizer,
    cancel: &'a CancelFlag,
}

impl<'a> CancellableNer<'a> {
    pub fn new(inner: &'a dyn EntityRecognizer, cancel: &'a CancelFlag) -> Self {
        Self { inner, cancel }
    }
}

impl EntityRecognizer for CancellableNer<'_> {
    fn recognize(&self, text: &str) -> Result<Vec<NerSpan>, NerError> {
        if self.cancel.is_cancelled() {
            return Err(NerError::Request("已取消".to_string()));
        }
        self.inner.recognize(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_tesseract_languages() {
        let codes = vec!["hi".to_string(), "EN".to_string()];
        assert_eq!(tesseract_languages(&codes), "hin+eng");
        assert_eq!(tesseract_languages(&["guj".to_string()]), "guj");
        assert_eq!(tesseract_languages(&[]), "hin");
    }

    #[test]
    fn test_call_with_timeout_ok_and_err() {
        let ok = call_with_timeout("OCR", Duration::from_secs(5), |_| Ok::<_, String>(7));
        assert_eq!(ok.unwrap(), 7);

        let err = call_with_timeout("OCR", Duration::from_secs(5), |_| Err::<u8, _>("boom"));
        assert!(matches!(err, Err(PipelineError::ExtractionFailed(m)) if m.contains("boom")));
    }

    #[test]
    fn test_call_with_timeout_expires() {
        let err = call_with_timeout("NER", Duration::from_millis(50), |_| {
            thread::sleep(Duration::from_millis(500));
            Ok::<_, String>(())
        });
        assert!(matches!(err, Err(PipelineError::ExtractionFailed(m)) if m.contains("超时")));
    }

    #[test]
    fn test_timeout_cancels_and_waits_for_worker() {
        let finished = Arc::new(AtomicBool::new(false));
        let worker_finished = Arc::clone(&finished);
        let err = call_with_timeout("OCR", Duration::from_millis(50), move |cancel| {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(10));
            }
            thread::sleep(Duration::from_millis(100));
            worker_finished.store(true, Ordering::SeqCst);
            Err::<(), _>("cancelled")
        });
        assert!(matches!(err, Err(PipelineError::ExtractionFailed(m)) if m.contains("超时")));
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_call_with_timeout_panic() {
        let err = call_with_timeout("OCR", Duration::from_secs(5), |_| -> Result<(), String> {
            panic!("collaborator crashed")
        });
        assert!(matches!(err, Err(PipelineError::ExtractionFailed(_))));
    }

    struct EchoNer;

    impl EntityRecognizer for EchoNer {
        fn recognize(&self, text: &str) -> Result<Vec<NerSpan>, NerError> {
            Ok(vec![NerSpan {
                label: "PER".to_string(),
                text: text.to_string(),
            }])
        }
    }

    #[test]
    fn test_cancellable_ner_stops_after_cancel() {
        let cancel = CancelFlag::new();
        let ner = CancellableNer::new(&EchoNer, &cancel);
        assert_eq!(ner.recognize("Ravi").unwrap().len(), 1);
        cancel.cancel();
        assert!(matches!(ner.recognize("Ravi"), Err(NerError::Request(_))));
    }
}
