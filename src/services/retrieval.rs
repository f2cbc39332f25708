//! 知识检索 - 业务能力层
//!
//! 职责：为一道题目找出最相关的背景知识片段。
//!
//! 两级策略：
//! 1. 配置了向量检索端点时优先走向量检索
//! 2. 端点缺失或调用失败时降级为本地语料的关键词匹配，
//!    降级只记 warn 日志，不向上抛错
//!
//! 本地语料在构造时一次性载入，按空行切分成段落。

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clients::vector_client::VectorSearch;
use crate::error::{AppError, AppResult};
use crate::models::question::RetrievedSnippet;

/// 本地语料段落
#[derive(Debug, Clone)]
pub struct CorpusSection {
    pub source_id: String,
    pub text: String,
}

/// 检索服务
pub struct RetrievalService {
    vector_backend: Option<Arc<dyn VectorSearch>>,
    corpus: Vec<CorpusSection>,
    top_k: usize,
}

impl RetrievalService {
    pub fn new(
        vector_backend: Option<Arc<dyn VectorSearch>>,
        corpus: Vec<CorpusSection>,
        top_k: usize,
    ) -> Self {
        Self {
            vector_backend,
            corpus,
            top_k,
        }
    }

    /// 从文本文件载入语料，段落以空行分隔
    pub fn load_corpus(path: impl AsRef<Path>) -> AppResult<Vec<CorpusSection>> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("⚠️ 知识语料文件不存在: {}，关键词降级检索将返回空结果", path.display());
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

        let sections: Vec<CorpusSection> = content
            .split("\n\n")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(idx, text)| CorpusSection {
                source_id: format!("section-{}", idx),
                text: text.to_string(),
            })
            .collect();

        info!("📚 已载入知识语料: {} 个段落", sections.len());
        Ok(sections)
    }

    /// 检索与查询最相关的片段，按相关度降序
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievedSnippet> {
        if let Some(backend) = &self.vector_backend {
            match backend.search(query, self.top_k).await {
                Ok(results) => {
                    debug!("向量检索命中 {} 条", results.len());
                    // 后端是外部黑盒，排序、条数和分值范围都在本地兜底
                    let mut snippets: Vec<RetrievedSnippet> = results
                        .into_iter()
                        .enumerate()
                        .map(|(idx, r)| RetrievedSnippet {
                            text: r.text,
                            source_id: format!("vector-{}", idx),
                            relevance_score: r.score.clamp(0.0, 1.0),
                        })
                        .collect();
                    snippets.sort_by(|a, b| {
                        b.relevance_score
                            .partial_cmp(&a.relevance_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    snippets.truncate(self.top_k);
                    return snippets;
                }
                Err(e) => {
                    warn!("⚠️ 向量检索失败，降级为关键词检索: {}", e);
                }
            }
        }

        self.keyword_search(query)
    }

    /// 关键词降级检索：统计查询词在段落中的出现次数，
    /// 按词长加权后归一化到 (0, 1)
    fn keyword_search(&self, query: &str) -> Vec<RetrievedSnippet> {
        let query_lower = query.to_lowercase();
        let keywords: Vec<&str> = query_lower
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .collect();

        if keywords.is_empty() || self.corpus.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<RetrievedSnippet> = self
            .corpus
            .iter()
            .filter_map(|section| {
                let section_lower = section.text.to_lowercase();
                let raw_score: usize = keywords
                    .iter()
                    .map(|kw| section_lower.matches(kw).count() * kw.chars().count())
                    .sum();
                if raw_score == 0 {
                    return None;
                }
                let score = raw_score as f32 / (raw_score as f32 + 10.0);
                Some(RetrievedSnippet {
                    text: section.text.clone(),
                    source_id: section.source_id.clone(),
                    relevance_score: score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.top_k);
        scored
    }
}
