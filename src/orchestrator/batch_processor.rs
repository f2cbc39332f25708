//! 批量答题处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量题目的处理和资源管理。
//!
//! 1. **应用初始化**：探测补全服务、载入语料与事实缓存、组装流程
//! 2. **批量加载**：从 CSV 读入全部题目
//! 3. **并发控制**：使用 Semaphore 限制同时在飞的补全调用数
//! 4. **容错**：单题失败只记一条占位结果，绝不中断整批
//! 5. **结果汇总**：按题目 ID 归位，按输入顺序写出
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个题目的细节，向下委托 QuestionFlow
//! - **资源所有者**：唯一持有事实缓存句柄并负责收尾落盘
//! - **无全局状态**：所有依赖显式传入，便于在测试中替换

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::clients::{
    CompletionOptions, CompletionService, HttpVectorSearch, OpenAiCompletion, RuleBasedCompletion,
    VectorSearch,
};
use crate::config::Config;
use crate::models::loaders::{load_dataset, write_results, DatasetRow};
use crate::models::question::{ChoiceLetter, OutputRecord};
use crate::services::{AnswerGenerator, AnswerValidator, CacheStats, FactCache, RetrievalService};
use crate::workflow::{QuestionCtx, QuestionFlow};

/// 处理统计（并发任务共享）
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub processed: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
}

/// 应用主结构
pub struct App {
    config: Config,
    flow: Arc<QuestionFlow>,
    cache: Arc<FactCache>,
}

impl App {
    /// 初始化应用：探测外部服务、装配整条流水线
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        // 补全服务：优先真实服务，不可用时降级为规则兜底
        let openai = OpenAiCompletion::new(&config);
        let availability = openai.check_availability().await;
        let completion: Arc<dyn CompletionService> = if availability.is_available() {
            info!("✓ 补全服务可用: {} @ {}", config.llm_model_name, config.llm_api_base_url);
            Arc::new(openai)
        } else {
            warn!(
                "⚠️ 补全服务不可用，降级为规则兜底模式: {:?}",
                availability
            );
            Arc::new(RuleBasedCompletion::new())
        };

        // 向量检索为可选依赖，缺省时靠本地语料关键词降级
        let vector_backend: Option<Arc<dyn VectorSearch>> = config
            .vector_search_url
            .as_deref()
            .map(|url| Arc::new(HttpVectorSearch::new(url)) as Arc<dyn VectorSearch>);
        if vector_backend.is_none() {
            info!("未配置向量检索端点，使用本地语料关键词检索");
        }

        let corpus = RetrievalService::load_corpus(&config.knowledge_file)?;
        let retrieval = Arc::new(RetrievalService::new(
            vector_backend,
            corpus,
            config.retrieval_top_k,
        ));

        let cache = Arc::new(FactCache::load(
            &config.cache_file,
            config.fact_relevance_threshold,
            config.fact_flush_interval,
        ));

        let generator = AnswerGenerator::new(completion, CompletionOptions::from_config(&config));
        let validator = AnswerValidator::new(config.content_relevance_threshold);

        let flow = Arc::new(QuestionFlow::new(
            retrieval,
            Arc::clone(&cache),
            generator,
            validator,
            config.fact_top_k,
            config.verbose_logging,
        ));

        Ok(Self { config, flow, cache })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let rows = load_dataset(&self.config.input_csv)?;
        if rows.is_empty() {
            // 空输入也要产出只含表头的结果文件，保持行数一一对应
            warn!("⚠️ 输入数据集为空，写出空结果文件后结束");
            write_results(&self.config.output_csv, &[], &rows, self.config.extended_output)?;
            return Ok(());
        }

        let total = rows.len();
        info!("✓ 载入 {} 道题目", total);
        info!("📋 并发上限: {}\n", self.config.max_concurrent_questions);

        let stats = Arc::new(ProcessingStats::default());
        let records = if self.config.max_concurrent_questions <= 1 || total <= 1 {
            Self::run_sequential(&self.flow, &rows, &stats).await
        } else {
            Self::run_concurrent(
                &self.flow,
                self.config.max_concurrent_questions,
                &rows,
                &stats,
            )
            .await
        };

        // 收尾落盘，失败只记日志
        if let Err(e) = self.cache.flush() {
            warn!("⚠️ 事实缓存收尾落盘失败: {}", e);
        }

        write_results(&self.config.output_csv, &records, &rows, self.config.extended_output)?;

        print_final_stats(&stats, &self.config, &self.cache.stats());
        Ok(())
    }

    /// 顺序模式：单题放进独立任务执行，崩溃同样只折损自己这一行
    async fn run_sequential(
        flow: &Arc<QuestionFlow>,
        rows: &[DatasetRow],
        stats: &Arc<ProcessingStats>,
    ) -> Vec<OutputRecord> {
        let total = rows.len();
        let mut records = Vec::with_capacity(total);
        for (idx, row) in rows.iter().enumerate() {
            let flow = Arc::clone(flow);
            let ctx = QuestionCtx::new(row.id.clone(), idx + 1, total);
            let question_text = row.question.clone();
            let outcome =
                tokio::spawn(async move { flow.process(&ctx, &question_text).await }).await;

            let record = match outcome {
                Ok(record) => record,
                Err(e) => {
                    error!("[题目 {}/{} ID#{}] ❌ 任务执行失败: {}", idx + 1, total, row.id, e);
                    placeholder_record(row.id.clone(), format!("任务执行失败: {}", e))
                }
            };
            tally(stats, &record);
            records.push(record);
        }
        records
    }

    /// 并发模式：结果先按 ID 归位，再按输入顺序取出
    async fn run_concurrent(
        flow: &Arc<QuestionFlow>,
        max_concurrent: usize,
        rows: &[DatasetRow],
        stats: &Arc<ProcessingStats>,
    ) -> Vec<OutputRecord> {
        let total = rows.len();
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut meta = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);

        for (idx, row) in rows.iter().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break, // Semaphore 不会被关闭，出现也只能终止派发
            };
            let flow = Arc::clone(flow);
            let ctx = QuestionCtx::new(row.id.clone(), idx + 1, total);
            let question_text = row.question.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                flow.process(&ctx, &question_text).await
            });
            meta.push((row.id.clone(), idx + 1));
            handles.push(handle);
        }

        let joined = futures::future::join_all(handles).await;

        let mut by_id: HashMap<String, OutputRecord> = HashMap::with_capacity(total);
        for ((id, index), outcome) in meta.into_iter().zip(joined) {
            let record = match outcome {
                Ok(record) => record,
                Err(e) => {
                    // 单题崩溃只折损自己这一行
                    error!("[题目 {}/{} ID#{}] ❌ 任务执行失败: {}", index, total, id, e);
                    placeholder_record(id.clone(), format!("任务执行失败: {}", e))
                }
            };
            tally(stats, &record);
            by_id.insert(id, record);
        }

        // 按输入顺序重排
        rows.iter()
            .map(|row| {
                by_id.remove(&row.id).unwrap_or_else(|| {
                    placeholder_record(row.id.clone(), "结果缺失".to_string())
                })
            })
            .collect()
    }
}

fn placeholder_record(id: String, note: String) -> OutputRecord {
    OutputRecord {
        id,
        answer: ChoiceLetter::NONE_OF_THE_ABOVE.to_string(),
        confidence: 0.0,
        error: Some(note),
    }
}

/// 带错误注记的记录计入失败
fn tally(stats: &ProcessingStats, record: &OutputRecord) {
    stats.processed.fetch_add(1, Ordering::Relaxed);
    if record.error.is_some() {
        stats.failed.fetch_add(1, Ordering::Relaxed);
    } else {
        stats.succeeded.fetch_add(1, Ordering::Relaxed);
    }
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 泰语医保问答批处理模式");
    info!("📊 最大并发数: {}", config.max_concurrent_questions);
    info!("🤖 模型: {}", config.llm_model_name);
    info!("{}", "=".repeat(60));
}

fn print_final_stats(stats: &ProcessingStats, config: &Config, cache_stats: &CacheStats) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!(
        "✅ 成功: {}/{}",
        stats.succeeded.load(Ordering::Relaxed),
        stats.processed.load(Ordering::Relaxed)
    );
    info!("❌ 失败: {}", stats.failed.load(Ordering::Relaxed));
    info!(
        "💾 缓存事实总数: {} ({} 个类别)",
        cache_stats.total_facts,
        cache_stats.by_type.len()
    );
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", config.output_csv);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ServiceAvailability;
    use crate::error::AppResult;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 遇到特定题目直接 panic 的补全替身
    struct ExplodingCompletion;

    #[async_trait]
    impl CompletionService for ExplodingCompletion {
        async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> AppResult<String> {
            if prompt.contains("ระเบิด") {
                panic!("模拟任务崩溃");
            }
            if prompt.contains("JSON") {
                return Ok(r#"{"facts": [], "relevance_score": 0}"#.to_string());
            }
            Ok("คำตอบ: ก".to_string())
        }

        async fn check_availability(&self) -> ServiceAvailability {
            ServiceAvailability::Available
        }
    }

    fn build_flow(dir: &TempDir) -> Arc<QuestionFlow> {
        let retrieval = Arc::new(RetrievalService::new(None, Vec::new(), 3));
        let cache = Arc::new(FactCache::load(dir.path().join("cache.json"), 5.0, 100));
        let generator = AnswerGenerator::new(
            Arc::new(ExplodingCompletion),
            CompletionOptions::default(),
        );
        let validator = AnswerValidator::new(0.3);
        Arc::new(QuestionFlow::new(retrieval, cache, generator, validator, 3, false))
    }

    fn sample_rows() -> Vec<DatasetRow> {
        vec![
            DatasetRow {
                id: "q1".into(),
                question: "สิทธิใดให้บริการฟรี? ก. บัตรทอง ข. ประกันสังคม".into(),
            },
            DatasetRow {
                id: "q2".into(),
                question: "ระเบิด คำถามนี้ทำให้พัง ก. หนึ่ง ข. สอง".into(),
            },
            DatasetRow {
                id: "q3".into(),
                question: "สิทธิใดครอบคลุมทุกคน? ก. บัตรทอง ข. ไม่มี".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_concurrent_run_survives_a_panicking_task() {
        let dir = TempDir::new().unwrap();
        let flow = build_flow(&dir);
        let stats = Arc::new(ProcessingStats::default());
        let rows = sample_rows();

        let records = App::run_concurrent(&flow, 2, &rows, &stats).await;

        // 一题崩溃不影响整批：行数不变，顺序不变
        assert_eq!(records.len(), rows.len());
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2", "q3"]);

        assert!(records[0].error.is_none());
        assert_eq!(records[1].answer, ChoiceLetter::NONE_OF_THE_ABOVE.to_string());
        assert!(records[1].error.as_deref().unwrap().contains("任务执行失败"));
        assert!(records[2].error.is_none());

        assert_eq!(stats.processed.load(Ordering::Relaxed), 3);
        assert_eq!(stats.succeeded.load(Ordering::Relaxed), 2);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_sequential_run_counts_failures() {
        let dir = TempDir::new().unwrap();
        let flow = build_flow(&dir);
        let stats = Arc::new(ProcessingStats::default());
        let rows = sample_rows();

        let records = App::run_sequential(&flow, &rows, &stats).await;

        assert_eq!(records.len(), rows.len());
        assert!(records[1].error.is_some());
        assert_eq!(stats.succeeded.load(Ordering::Relaxed), 2);
        assert_eq!(stats.failed.load(Ordering::Relaxed), 1);
    }
}
