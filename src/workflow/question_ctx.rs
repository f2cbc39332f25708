//! 题目处理上下文
//!
//! 封装"我正在处理这一批的第几题"这一信息

use std::fmt::Display;

/// 题目处理上下文
///
/// 只携带日志展示所需的定位信息
#[derive(Debug, Clone)]
pub struct QuestionCtx {
    /// 数据集中的题目ID
    pub question_id: String,

    /// 题目在本批中的序号（从1开始，仅用于日志显示）
    pub question_index: usize,

    /// 本批题目总数
    pub total: usize,
}

impl QuestionCtx {
    pub fn new(question_id: String, question_index: usize, total: usize) -> Self {
        Self {
            question_id,
            question_index,
            total,
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[题目 {}/{} ID#{}]",
            self.question_index, self.total, self.question_id
        )
    }
}
