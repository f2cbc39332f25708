//! 题目处理流程 - 流程层
//!
//! 核心职责：定义"一道题"的完整处理流程
//!
//! 流程顺序：
//! 1. 解析题干与选项
//! 2. 检索背景知识 + 查询事实缓存
//! 3. LLM 生成答案候选
//! 4. 从问答对抽取事实写回缓存
//! 5. 规则校验得到最终答案
//!
//! 每个阶段都自行降级，本流程永远产出一条结果记录。

use std::sync::Arc;

use tracing::{info, warn};

use crate::models::question::{ChoiceLetter, OutputRecord};
use crate::services::{
    AnswerGenerator, AnswerValidator, FactCache, QuestionParser, RetrievalService,
};
use crate::workflow::question_ctx::QuestionCtx;

/// 题目处理流程
///
/// - 编排单题的完整处理顺序
/// - 不持有可变状态，可被多个工作任务共享
/// - 只依赖业务能力（services）
pub struct QuestionFlow {
    parser: QuestionParser,
    retrieval: Arc<RetrievalService>,
    cache: Arc<FactCache>,
    generator: AnswerGenerator,
    validator: AnswerValidator,
    /// 每题最多引用多少条缓存事实
    fact_top_k: usize,
    verbose_logging: bool,
}

impl QuestionFlow {
    pub fn new(
        retrieval: Arc<RetrievalService>,
        cache: Arc<FactCache>,
        generator: AnswerGenerator,
        validator: AnswerValidator,
        fact_top_k: usize,
        verbose_logging: bool,
    ) -> Self {
        Self {
            parser: QuestionParser::new(),
            retrieval,
            cache,
            generator,
            validator,
            fact_top_k,
            verbose_logging,
        }
    }

    /// 处理一道题，永远返回一条结果记录
    pub async fn process(&self, ctx: &QuestionCtx, raw_text: &str) -> OutputRecord {
        // ========== 阶段 1: 解析 ==========
        let question = self.parser.parse(raw_text);
        if !question.has_choices() {
            warn!("{} ⚠️ 未解析出任何选项，按开放题处理", ctx);
        } else if self.verbose_logging {
            info!("{} 解析出 {} 个选项", ctx, question.choices.len());
        }

        // ========== 阶段 2: 检索 + 缓存查询 ==========
        let snippets = self.retrieval.retrieve(&question.stem).await;
        let facts = self.cache.search(&question.stem, self.fact_top_k);
        if self.verbose_logging {
            info!(
                "{} 🔍 检索到 {} 个片段，命中 {} 条缓存事实",
                ctx,
                snippets.len(),
                facts.len()
            );
        }

        // ========== 阶段 3: 生成候选 ==========
        let (candidate, raw_answer) = self.generator.generate(&question, &snippets, &facts).await;

        // ========== 阶段 4: 事实回写 ==========
        if !raw_answer.is_empty() {
            if let Some(extraction) = self
                .generator
                .extract_facts(&question.stem, &raw_answer)
                .await
            {
                let inserted = self.cache.insert(
                    extraction.facts,
                    extraction.relevance_score,
                    &question.stem,
                );
                if inserted > 0 {
                    info!("{} 💾 学到 {} 条新事实", ctx, inserted);
                }
            }
        }

        // ========== 阶段 5: 校验 ==========
        let context_text = snippets
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let validated = self.validator.validate(&question, &candidate, &context_text);

        // 空答案对外统一落为"无正确答案"，并在记录里留下原因
        let (answer, error) = if validated.letters.is_empty() {
            warn!(
                "{} ⚠️ 没有产出答案 ({})，输出 '{}'",
                ctx,
                validated.reasoning,
                ChoiceLetter::NONE_OF_THE_ABOVE
            );
            (
                ChoiceLetter::NONE_OF_THE_ABOVE.to_string(),
                Some(validated.reasoning.clone()),
            )
        } else {
            (validated.answer_string(), None)
        };

        info!(
            "{} ✓ 最终答案: {} (置信度 {:.2})",
            ctx, answer, validated.confidence
        );

        OutputRecord {
            id: ctx.question_id.clone(),
            answer,
            confidence: validated.confidence,
            error,
        }
    }
}
