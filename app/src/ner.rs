//! 基于 HTTP 的 token-classification NER 适配器
//!
//! 请求：`POST {endpoint}`，`{"inputs": text, "model": name?}`
//! 响应：`[{"entity_group"|"entity": "PER", "word": "...", "start": 0, "end": 4}]`

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use shade_core::{OffsetEntity, PiiKind};
use shade_rules::{
    clean_token, kind_for_ner_label, EntityRecognizer, NerError, NerSpan, OffsetRecognizer,
};

pub const PRIMARY_NER_URL_ENV: &str = "SHADE_NER_URL";
pub const SECONDARY_NER_URL_ENV: &str = "SHADE_NER_HINDI_URL";
const DEFAULT_PRIMARY_URL: &str = "http://127.0.0.1:8000/ner/en";
const DEFAULT_SECONDARY_URL: &str = "http://127.0.0.1:8000/ner/hi";

#[derive(Debug, Serialize)]
struct NerRequest<'a> {
    inputs: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// 服务返回的一个预测
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPrediction {
    #[serde(default)]
    entity_group: Option<String>,
    #[serde(default)]
    entity: Option<String>,
    #[serde(default)]
    word: String,
    #[serde(default)]
    start: Option<usize>,
    #[serde(default)]
    end: Option<usize>,
}

impl TokenPrediction {
    fn label(&self) -> &str {
        self.entity_group
            .as_deref()
            .or(self.entity.as_deref())
            .unwrap_or("O")
    }
}

/// 预测 → 通用 NER 片段
pub fn spans_from_predictions(predictions: Vec<TokenPrediction>) -> Vec<NerSpan> {
    predictions
        .into_iter()
        .map(|p| NerSpan {
            label: p.label().to_string(),
            text: p.word,
        })
        .collect()
}

/// 预测 → 人名偏移实体；缺少偏移的预测被丢弃
pub fn person_offsets(predictions: Vec<TokenPrediction>) -> Vec<OffsetEntity> {
    predictions
        .into_iter()
        .filter(|p| kind_for_ner_label(p.label()) == Some(PiiKind::Person))
        .filter_map(|p| match (p.start, p.end) {
            (Some(start), Some(end)) if end > start => Some(OffsetEntity {
                name: clean_token(&p.word),
                start,
                end,
            }),
            _ => {
                log::debug!("[NER] 预测缺少偏移，已忽略");
                None
            }
        })
        .collect()
}

pub struct HttpNerClient {
    endpoint: String,
    model: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpNerClient {
    pub fn new(endpoint: &str, model: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("无法创建 HTTP 客户端")?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    /// 通用 NER，地址取 `SHADE_NER_URL`
    pub fn primary_from_env(timeout: Duration) -> anyhow::Result<Self> {
        let url = std::env::var(PRIMARY_NER_URL_ENV).unwrap_or_else(|_| DEFAULT_PRIMARY_URL.to_string());
        Self::new(&url, None, timeout).with_context(|| format!("通用 NER 客户端初始化失败: {}", url))
    }

    /// 第二文字 NER，地址取 `SHADE_NER_HINDI_URL`
    pub fn secondary_from_env(model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let url =
            std::env::var(SECONDARY_NER_URL_ENV).unwrap_or_else(|_| DEFAULT_SECONDARY_URL.to_string());
        Self::new(&url, Some(model.to_string()), timeout)
            .with_context(|| format!("第二文字 NER 客户端初始化失败: {}", url))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn predict(&self, text: &str) -> Result<Vec<TokenPrediction>, NerError> {
        let body = NerRequest {
            inputs: text,
            model: self.model.as_deref(),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| NerError::Request(e.to_string()))?;
        response
            .json::<Vec<TokenPrediction>>()
            .map_err(|e| NerError::Response(e.to_string()))
    }
}

impl EntityRecognizer for HttpNerClient {
    fn recognize(&self, text: &str) -> Result<Vec<NerSpan>, NerError> {
        Ok(spans_from_predictions(self.predict(text)?))
    }
}

impl OffsetRecognizer for HttpNerClient {
    fn recognize_offsets(&self, text: &str) -> Result<Vec<OffsetEntity>, NerError> {
        Ok(person_offsets(self.predict(text)?))
    }
}
