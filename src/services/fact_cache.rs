//! 事实缓存 - 业务能力层
//!
//! 职责：把历史问答中抽取出的事实持久化，供后续题目复用。
//!
//! 并发约束：内部用一把互斥锁保护全部状态，
//! "算哈希 → 查重 → 追加"在同一个临界区内完成，
//! 多个工作任务并发插入同一事实时只会落库一次。
//!
//! 持久化失败只记日志，不中断答题流程。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::fact::{Fact, FactCacheFile, FactDraft};

/// 缓存统计
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_facts: usize,
    pub by_type: HashMap<String, usize>,
    pub last_updated: Option<String>,
    pub unflushed: usize,
}

struct CacheState {
    facts: Vec<Fact>,
    ids: HashSet<String>,
    last_updated: Option<String>,
    /// 自上次落盘以来新增的事实数
    unflushed: usize,
}

/// 持久化事实缓存
pub struct FactCache {
    cache_file: PathBuf,
    /// 低于该相关度（1-10 分制）的抽取结果整体丢弃
    relevance_threshold: f64,
    /// 每新增多少条事实自动落盘一次
    flush_interval: usize,
    inner: Mutex<CacheState>,
}

impl FactCache {
    /// 构造并载入已有缓存文件。
    /// 文件不存在视为空缓存；文件损坏时记 warn 并从空缓存开始。
    pub fn load(
        cache_file: impl Into<PathBuf>,
        relevance_threshold: f64,
        flush_interval: usize,
    ) -> Self {
        let cache_file = cache_file.into();
        let mut facts: Vec<Fact> = Vec::new();
        let mut last_updated: Option<String> = None;

        if cache_file.exists() {
            match std::fs::read_to_string(&cache_file) {
                Ok(content) => match serde_json::from_str::<FactCacheFile>(&content) {
                    Ok(file) => {
                        facts = file.facts;
                        last_updated = file.last_updated;
                        info!("💾 已载入事实缓存: {} 条 ({})", facts.len(), cache_file.display());
                    }
                    Err(e) => {
                        warn!("⚠️ 缓存文件损坏，从空缓存开始 ({}): {}", cache_file.display(), e);
                    }
                },
                Err(e) => {
                    warn!("⚠️ 缓存文件读取失败，从空缓存开始 ({}): {}", cache_file.display(), e);
                }
            }
        }

        let ids = facts.iter().map(|f| f.id.clone()).collect();
        Self {
            cache_file,
            relevance_threshold,
            flush_interval,
            inner: Mutex::new(CacheState {
                facts,
                ids,
                last_updated,
                unflushed: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 插入一批事实草稿，返回实际新增条数。
    ///
    /// 整体相关度低于阈值时全部丢弃；逐条按内容哈希去重。
    /// 每累计 `flush_interval` 条新事实自动落盘一次。
    pub fn insert(
        &self,
        drafts: Vec<FactDraft>,
        relevance_score: f64,
        source_question: &str,
    ) -> usize {
        if relevance_score < self.relevance_threshold {
            debug!(
                "事实相关度 {:.1} 低于阈值 {:.1}，跳过 {} 条",
                relevance_score,
                self.relevance_threshold,
                drafts.len()
            );
            return 0;
        }

        let mut state = self.lock();
        let mut inserted = 0;

        for draft in drafts {
            let id = Fact::content_hash(&draft.fact_type, &draft.key, &draft.value);
            if !state.ids.insert(id.clone()) {
                continue;
            }

            state.facts.push(Fact {
                id,
                fact_type: draft.fact_type,
                key: draft.key,
                value: draft.value,
                context: draft.context,
                source_question: Some(source_question.to_string()),
                timestamp: Some(Utc::now().to_rfc3339()),
                relevance_score,
            });
            state.last_updated = Some(Utc::now().to_rfc3339());
            state.unflushed += 1;
            inserted += 1;

            if state.unflushed >= self.flush_interval {
                if let Err(e) = self.persist_locked(&mut state) {
                    warn!("⚠️ 事实缓存自动落盘失败: {}", e);
                }
            }
        }

        if inserted > 0 {
            debug!("新增 {} 条事实，缓存共 {} 条", inserted, state.facts.len());
        }
        inserted
    }

    /// 按关键词检索最相关的事实，按命中关键词数降序（同分保持插入顺序）
    pub fn search(&self, query: &str, top_k: usize) -> Vec<Fact> {
        let query_lower = query.to_lowercase();
        let keywords: Vec<&str> = query_lower
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .collect();
        if keywords.is_empty() {
            return Vec::new();
        }

        let state = self.lock();
        let mut scored: Vec<(usize, &Fact)> = state
            .facts
            .iter()
            .filter_map(|fact| {
                let text = fact.searchable_text();
                let score = keywords.iter().filter(|kw| text.contains(*kw)).count();
                (score > 0).then_some((score, fact))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, fact)| fact.clone())
            .collect()
    }

    /// 立即落盘
    pub fn flush(&self) -> AppResult<()> {
        let mut state = self.lock();
        self.persist_locked(&mut state)
    }

    /// 清空缓存并删除缓存文件
    pub fn clear(&self) -> AppResult<()> {
        let mut state = self.lock();
        state.facts.clear();
        state.ids.clear();
        state.last_updated = None;
        state.unflushed = 0;

        if self.cache_file.exists() {
            std::fs::remove_file(&self.cache_file)
                .map_err(|e| AppError::cache_persist_failed(self.cache_file.display().to_string(), e))?;
        }
        info!("🗑️ 事实缓存已清空");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut by_type: HashMap<String, usize> = HashMap::new();
        for fact in &state.facts {
            *by_type.entry(fact.fact_type.clone()).or_insert(0) += 1;
        }
        CacheStats {
            total_facts: state.facts.len(),
            by_type,
            last_updated: state.last_updated.clone(),
            unflushed: state.unflushed,
        }
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    fn persist_locked(&self, state: &mut CacheState) -> AppResult<()> {
        if let Some(parent) = self.cache_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::cache_persist_failed(self.cache_file.display().to_string(), e))?;
        }

        let file = FactCacheFile {
            facts: state.facts.clone(),
            last_updated: state.last_updated.clone(),
            version: FactCacheFile::VERSION.to_string(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| AppError::cache_persist_failed(self.cache_file.display().to_string(), e))?;
        std::fs::write(&self.cache_file, json)
            .map_err(|e| AppError::cache_persist_failed(self.cache_file.display().to_string(), e))?;

        state.unflushed = 0;
        debug!("💾 事实缓存已落盘: {} 条", state.facts.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn draft(fact_type: &str, key: &str, value: &str) -> FactDraft {
        FactDraft {
            fact_type: fact_type.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            context: None,
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = FactCache::load(dir.path().join("cache.json"), 5.0, 5);

        let first = cache.insert(
            vec![draft("สิทธิประโยชน์", "บัตรทอง", "รักษาฟรี")],
            8.0,
            "q1",
        );
        let second = cache.insert(
            vec![draft("สิทธิประโยชน์", "บัตรทอง", "รักษาฟรี")],
            8.0,
            "q2",
        );
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_low_relevance_is_discarded() {
        let dir = TempDir::new().unwrap();
        let cache = FactCache::load(dir.path().join("cache.json"), 5.0, 5);

        let inserted = cache.insert(
            vec![draft("สิทธิประโยชน์", "บัตรทอง", "รักษาฟรี")],
            3.0,
            "q1",
        );
        assert_eq!(inserted, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_flush_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = FactCache::load(&path, 5.0, 100);
        cache.insert(
            vec![
                draft("สิทธิประโยชน์", "บัตรทอง", "รักษาฟรี"),
                draft("เงื่อนไข", "ผู้สูงอายุ", "ไม่เสียค่าธรรมเนียม"),
            ],
            7.0,
            "q1",
        );
        cache.flush().unwrap();

        let reloaded = FactCache::load(&path, 5.0, 100);
        assert_eq!(reloaded.len(), 2);
        // 去重跨进程生效
        let inserted = reloaded.insert(
            vec![draft("สิทธิประโยชน์", "บัตรทอง", "รักษาฟรี")],
            9.0,
            "q9",
        );
        assert_eq!(inserted, 0);
    }

    #[test]
    fn test_auto_flush_every_interval() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = FactCache::load(&path, 5.0, 2);
        cache.insert(
            vec![
                draft("a", "k1", "v1"),
                draft("a", "k2", "v2"),
                draft("a", "k3", "v3"),
            ],
            8.0,
            "q1",
        );
        // 第 2 条触发落盘，第 3 条仍在内存
        assert!(path.exists());
        let on_disk = FactCache::load(&path, 5.0, 2);
        assert_eq!(on_disk.len(), 2);
        assert_eq!(cache.stats().unflushed, 1);
    }

    #[test]
    fn test_search_ranks_by_keyword_hits() {
        let dir = TempDir::new().unwrap();
        let cache = FactCache::load(dir.path().join("cache.json"), 5.0, 100);
        cache.insert(
            vec![
                draft("สิทธิประโยชน์", "บัตรทอง", "รักษาฟรีที่โรงพยาบาลรัฐ"),
                draft("การเดินทาง", "รถเมล์", "สาย 8"),
            ],
            8.0,
            "q1",
        );

        let hits = cache.search("บัตรทอง รักษาฟรีที่โรงพยาบาลรัฐ", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "บัตรทอง");

        let none = cache.search("อวกาศ", 3);
        assert!(none.is_empty());
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let cache = FactCache::load(dir.path().join("cache.json"), 5.0, 100);
        // 两条事实各命中关键词一次，分数打平
        cache.insert(
            vec![
                draft("สิทธิประโยชน์", "บัตรทอง", "ใช้ได้ทั่วประเทศ"),
                draft("เงื่อนไข", "บัตรทอง", "ต้องลงทะเบียนก่อน"),
            ],
            8.0,
            "q1",
        );

        let first = cache.search("บัตรทอง", 5);
        let second = cache.search("บัตรทอง", 5);
        let order: Vec<_> = first.iter().map(|f| f.fact_type.clone()).collect();
        assert_eq!(order, vec!["สิทธิประโยชน์", "เงื่อนไข"]);
        let again: Vec<_> = second.iter().map(|f| f.fact_type.clone()).collect();
        assert_eq!(order, again);
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let cache = FactCache::load(&path, 5.0, 1);
        cache.insert(vec![draft("a", "k", "v")], 8.0, "q");
        assert!(path.exists());

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_cache_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = FactCache::load(&path, 5.0, 5);
        assert!(cache.is_empty());
    }
}
