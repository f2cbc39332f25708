//! 答案生成 - 业务能力层
//!
//! 职责：
//! 1. 把检索片段、缓存事实和题目拼成提示词，调用补全服务
//! 2. 从自由文本回答中抽取选项字母（标记模式 → 哨兵短语 → 全文扫描）
//! 3. 答题成功后再调一次补全服务，从问答对中抽取结构化事实
//!
//! 补全服务不可用或超时都不往上抛：返回零置信度的空候选，
//! 让整批继续跑。

use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::clients::llm_client::{CompletionOptions, CompletionService};
use crate::models::fact::ExtractionResult;
use crate::models::question::{AnswerCandidate, ChoiceLetter, Question, RetrievedSnippet};
use crate::models::Fact;

/// 回答中"没有正确答案"的哨兵短语
pub const NONE_SENTINEL: &str = "ไม่มีข้อใดถูกต้อง";

/// 答案生成器
pub struct AnswerGenerator {
    completion: Arc<dyn CompletionService>,
    options: CompletionOptions,
    /// "คำตอบ: ก, ข" 之类的显式标记
    marker_patterns: Vec<Regex>,
}

impl AnswerGenerator {
    pub fn new(completion: Arc<dyn CompletionService>, options: CompletionOptions) -> Self {
        let marker_patterns = [
            r"คำตอบ\s*[::]?\s*((?:[ก-ง][\s,、]*)+)",
            r"ตอบ\s*[::]?\s*((?:[ก-ง][\s,、]*)+)",
            r"เลือก\s*[::]?\s*((?:[ก-ง][\s,、]*)+)",
            r"(?i)answer\s*[::]?\s*((?:[ก-ง][\s,、]*)+)",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect();

        Self {
            completion,
            options,
            marker_patterns,
        }
    }

    /// 生成答案候选，同时返回原始回答文本（供事实抽取使用）
    pub async fn generate(
        &self,
        question: &Question,
        snippets: &[RetrievedSnippet],
        facts: &[Fact],
    ) -> (AnswerCandidate, String) {
        let prompt = self.build_prompt(question, snippets, facts);

        let raw = match self.completion.complete(&prompt, &self.options).await {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ 补全服务调用失败，返回空候选: {}", e);
                return (AnswerCandidate::empty(), String::new());
            }
        };

        let (letters, marker_matched) = self.extract_letters(&raw, question);
        let confidence = Self::candidate_confidence(&letters, marker_matched, &raw);
        debug!(
            "抽取到答案字母 {:?}，置信度 {:.2}",
            letters.iter().map(|l| l.as_char()).collect::<Vec<_>>(),
            confidence
        );

        (AnswerCandidate { letters, confidence }, raw)
    }

    /// 从问答对中抽取结构化事实，JSON 格式错误时丢弃并记日志
    pub async fn extract_facts(&self, question_stem: &str, answer_text: &str) -> Option<ExtractionResult> {
        if answer_text.trim().is_empty() {
            return None;
        }

        let prompt = format!(
            "จากคำถามและคำตอบต่อไปนี้ ให้สกัดข้อเท็จจริงด้านสุขภาพที่นำกลับมาใช้ได้ \
             ตอบเป็น JSON เท่านั้น ตามรูปแบบ:\n\
             {{\"facts\": [{{\"type\": \"ประเภท\", \"key\": \"หัวข้อ\", \"value\": \"เนื้อหา\", \"context\": \"บริบท\"}}], \"relevance_score\": 1-10}}\n\n\
             คำถาม: {}\n\
             คำตอบ: {}",
            question_stem, answer_text
        );

        let raw = match self.completion.complete(&prompt, &self.options).await {
            Ok(text) => text,
            Err(e) => {
                warn!("⚠️ 事实抽取调用失败，跳过: {}", e);
                return None;
            }
        };

        // 模型经常在 JSON 前后夹杂说明文字，只取首个 { 到末个 } 之间
        let json_slice = match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if start < end => &raw[start..=end],
            _ => {
                warn!("⚠️ 事实抽取结果中没有 JSON，丢弃");
                return None;
            }
        };

        match serde_json::from_str::<ExtractionResult>(json_slice) {
            Ok(result) => {
                debug!(
                    "抽取到 {} 条事实草稿，相关度 {:.1}",
                    result.facts.len(),
                    result.relevance_score
                );
                Some(result)
            }
            Err(e) => {
                warn!("⚠️ 事实抽取 JSON 解析失败，丢弃: {}", e);
                None
            }
        }
    }

    fn build_prompt(
        &self,
        question: &Question,
        snippets: &[RetrievedSnippet],
        facts: &[Fact],
    ) -> String {
        let mut sections: Vec<String> = Vec::new();

        sections.push(
            "คุณเป็นผู้เชี่ยวชาญด้านระบบหลักประกันสุขภาพของประเทศไทย \
             จงตอบคำถามปรนัยต่อไปนี้โดยอ้างอิงข้อมูลที่ให้มา \
             ตอบในรูปแบบ 'คำตอบ: <ตัวอักษร>' และเลือกได้มากกว่าหนึ่งข้อหากจำเป็น \
             หากไม่มีข้อใดถูกต้องให้ตอบว่า 'ไม่มีข้อใดถูกต้อง'"
                .to_string(),
        );

        if !snippets.is_empty() {
            let context = snippets
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n---\n");
            sections.push(format!("ข้อมูลอ้างอิง:\n{}", context));
        }

        if !facts.is_empty() {
            let summary = facts
                .iter()
                .map(|f| format!("- {} {}: {}", f.fact_type, f.key, f.value))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("ข้อเท็จจริงที่เรียนรู้มาก่อนหน้า:\n{}", summary));
        }

        sections.push(format!("คำถาม: {}", question.stem));
        if question.has_choices() {
            sections.push(format!("ตัวเลือก:\n{}", question.format_choices()));
        }

        sections.join("\n\n")
    }

    /// 字母抽取，返回 (字母集合, 是否由显式标记命中)
    fn extract_letters(&self, raw: &str, question: &Question) -> (BTreeSet<ChoiceLetter>, bool) {
        let valid = |letter: ChoiceLetter| -> bool {
            // 有选项表时只接受实际存在的字母
            !question.has_choices() || question.choices.contains_key(&letter)
        };

        for pattern in &self.marker_patterns {
            if let Some(cap) = pattern.captures(raw) {
                let letters: BTreeSet<ChoiceLetter> = cap[1]
                    .chars()
                    .filter_map(ChoiceLetter::from_char)
                    .filter(|l| valid(*l))
                    .collect();
                if !letters.is_empty() {
                    return (letters, true);
                }
            }
        }

        if raw.contains(NONE_SENTINEL) {
            let mut letters = BTreeSet::new();
            letters.insert(ChoiceLetter::NONE_OF_THE_ABOVE);
            return (letters, false);
        }

        let letters: BTreeSet<ChoiceLetter> = raw
            .chars()
            .filter_map(ChoiceLetter::from_char)
            .filter(|l| valid(*l))
            .collect();
        (letters, false)
    }

    /// 候选置信度：基准 0.5，显式标记 +0.2，
    /// 短回答却只说 ง 视为模型敷衍 -0.1
    fn candidate_confidence(
        letters: &BTreeSet<ChoiceLetter>,
        marker_matched: bool,
        raw: &str,
    ) -> f64 {
        if letters.is_empty() {
            return 0.0;
        }
        let mut confidence: f64 = 0.5;
        if marker_matched {
            confidence += 0.2;
        }
        let single_none = letters.len() == 1
            && letters.iter().next().is_some_and(|l| l.is_none_of_the_above());
        if single_none && raw.chars().count() < 40 {
            confidence -= 0.1;
        }
        confidence.clamp(0.0, 1.0)
    }
}
