//! 题目与答案数据结构
//!
//! 定义单选/多选题、候选答案、校验后答案等核心类型。
//! 泰语选项字母表固定为 ก/ข/ค/ง，其中 ง 按业务约定为"没有正确答案"。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 选项字母
///
/// 固定的有序字母表。派生 `Ord` 保证排序结果确定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChoiceLetter {
    /// ก
    KoKai,
    /// ข
    KhoKhai,
    /// ค
    KhoKhwai,
    /// ง（ไม่มีข้อใดถูกต้อง，即"没有正确答案"）
    NgoNgu,
}

impl ChoiceLetter {
    /// 完整字母表（按顺序）
    pub const ALL: [ChoiceLetter; 4] = [
        ChoiceLetter::KoKai,
        ChoiceLetter::KhoKhai,
        ChoiceLetter::KhoKhwai,
        ChoiceLetter::NgoNgu,
    ];

    /// "没有正确答案"对应的字母
    pub const NONE_OF_THE_ABOVE: ChoiceLetter = ChoiceLetter::NgoNgu;

    /// 转换为泰语字符
    pub fn as_char(self) -> char {
        match self {
            ChoiceLetter::KoKai => 'ก',
            ChoiceLetter::KhoKhai => 'ข',
            ChoiceLetter::KhoKhwai => 'ค',
            ChoiceLetter::NgoNgu => 'ง',
        }
    }

    /// 从泰语字符解析
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'ก' => Some(ChoiceLetter::KoKai),
            'ข' => Some(ChoiceLetter::KhoKhai),
            'ค' => Some(ChoiceLetter::KhoKhwai),
            'ง' => Some(ChoiceLetter::NgoNgu),
            _ => None,
        }
    }

    /// 从字符串中提取第一个合法字母
    pub fn from_str(s: &str) -> Option<Self> {
        s.chars().find_map(Self::from_char)
    }

    /// 是否为"没有正确答案"
    pub fn is_none_of_the_above(self) -> bool {
        self == Self::NONE_OF_THE_ABOVE
    }
}

impl fmt::Display for ChoiceLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// 解析后的题目
///
/// 由 `QuestionParser` 从原始文本生成，之后不可变。
/// choices 为空即表示"未识别到任何选项标记"（开放题），调用方必须显式检查。
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    /// 题干
    pub stem: String,
    /// 选项字母 → 选项文本（BTreeMap 保证键唯一且有序）
    pub choices: BTreeMap<ChoiceLetter, String>,
}

impl Question {
    pub fn new(stem: impl Into<String>) -> Self {
        Self {
            stem: stem.into(),
            choices: BTreeMap::new(),
        }
    }

    /// 是否成功解析出选项
    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }

    /// 选项格式化为提示词使用的文本
    pub fn format_choices(&self) -> String {
        self.choices
            .iter()
            .map(|(letter, text)| format!("{}. {}", letter, text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 检索到的上下文片段
///
/// 每次查询临时生成，从不持久化。relevance_score 越高越相关，范围 [0, 1]。
#[derive(Debug, Clone)]
pub struct RetrievedSnippet {
    pub text: String,
    pub source_id: String,
    pub relevance_score: f32,
}

/// 校验前的候选答案（AnswerGenerator 的输出）
#[derive(Debug, Clone, Default)]
pub struct AnswerCandidate {
    /// 从 LLM 输出中提取到的字母集合
    pub letters: BTreeSet<ChoiceLetter>,
    /// 提取阶段的启发式置信度
    pub confidence: f64,
}

impl AnswerCandidate {
    /// LLM 调用失败时的降级结果
    pub fn empty() -> Self {
        Self {
            letters: BTreeSet::new(),
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }
}

/// 校验后的最终答案（AnswerValidator 的输出，不可变）
#[derive(Debug, Clone)]
pub struct ValidatedAnswer {
    /// 排序后的字母列表
    pub letters: Vec<ChoiceLetter>,
    pub confidence: f64,
    /// 每条修正规则留下的说明
    pub corrections: Vec<String>,
    pub reasoning: String,
}

impl ValidatedAnswer {
    /// 字母列表拼接为输出格式（如 "ก,ค"）
    pub fn answer_string(&self) -> String {
        self.letters
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// 单条输出记录
#[derive(Debug, Clone)]
pub struct OutputRecord {
    pub id: String,
    /// 逗号拼接的字母（空答案按约定替换为 ง）
    pub answer: String,
    pub confidence: f64,
    /// 处理失败时的错误说明
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_letter_roundtrip() {
        for letter in ChoiceLetter::ALL {
            assert_eq!(ChoiceLetter::from_char(letter.as_char()), Some(letter));
        }
        assert_eq!(ChoiceLetter::from_char('a'), None);
    }

    #[test]
    fn test_choice_letter_ordering() {
        let mut letters = vec![
            ChoiceLetter::NgoNgu,
            ChoiceLetter::KoKai,
            ChoiceLetter::KhoKhwai,
        ];
        letters.sort();
        assert_eq!(
            letters,
            vec![
                ChoiceLetter::KoKai,
                ChoiceLetter::KhoKhwai,
                ChoiceLetter::NgoNgu
            ]
        );
    }

    #[test]
    fn test_answer_string_joins_sorted_letters() {
        let answer = ValidatedAnswer {
            letters: vec![ChoiceLetter::KoKai, ChoiceLetter::KhoKhwai],
            confidence: 0.8,
            corrections: vec![],
            reasoning: String::new(),
        };
        assert_eq!(answer.answer_string(), "ก,ค");
    }
}
