//! 向量检索客户端
//!
//! 外部最近邻检索服务的抽象接口与 HTTP 实现。
//! 嵌入模型和索引本身是外部协作方，这里只是薄适配层。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, AppResult, RetrievalError};

/// 带分数的检索结果文本
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredText {
    pub text: String,
    pub score: f32,
}

/// 向量检索接口
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// 语义检索，按相关度降序返回至多 top_k 条
    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<ScoredText>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ScoredText>,
}

/// HTTP 向量检索客户端
///
/// POST `{"query": ..., "top_k": ...}` → `{"results": [{"text", "score"}]}`
pub struct HttpVectorSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpVectorSearch {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<ScoredText>> {
        debug!("向量检索: top_k={}, endpoint={}", top_k, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query, "top_k": top_k }))
            .send()
            .await
            .map_err(|e| AppError::retrieval_request_failed(&self.endpoint, e))?;

        if !response.status().is_success() {
            return Err(AppError::Retrieval(RetrievalError::BadResponse {
                endpoint: self.endpoint.clone(),
                message: format!("HTTP {}", response.status()),
            }));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::retrieval_request_failed(&self.endpoint, e))?;

        Ok(body.results)
    }
}
