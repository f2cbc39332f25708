//! 业务能力层
//!
//! 每个子模块提供一项独立能力，不关心整体流程的先后顺序。

pub mod answer_generator;
pub mod fact_cache;
pub mod policy;
pub mod question_parser;
pub mod retrieval;
pub mod validator;

pub use answer_generator::AnswerGenerator;
pub use fact_cache::{CacheStats, FactCache};
pub use question_parser::QuestionParser;
pub use retrieval::{CorpusSection, RetrievalService};
pub use validator::AnswerValidator;
