//! # Thai Healthcare QA
//!
//! 基于检索增强的泰语医保选择题批量答题系统
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 封装外部服务，只暴露能力
//! - `CompletionService` - LLM 补全能力（OpenAI 协议 / 规则兜底）
//! - `VectorSearch` - 向量检索能力（HTTP 端点，可选）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个 Question
//! - `QuestionParser` - 题干/选项解析能力
//! - `RetrievalService` - 知识检索能力（向量 → 关键词降级）
//! - `FactCache` - 事实持久化与去重能力
//! - `AnswerGenerator` - 候选生成与事实抽取能力
//! - `AnswerValidator` - 规则校验能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `QuestionCtx` - 上下文封装（question_id + 序号）
//! - `QuestionFlow` - 流程编排（解析 → 检索 → 生成 → 回写 → 校验）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量题目处理器，管理并发和统计

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::question::{ChoiceLetter, Question, ValidatedAnswer};
pub use models::Fact;
pub use orchestrator::App;
pub use services::{AnswerGenerator, AnswerValidator, FactCache, QuestionParser, RetrievalService};
pub use workflow::{QuestionCtx, QuestionFlow};
