//! 答案校验 - 业务能力层
//!
//! 一条规则流水线：每条规则拿到上一条的输出，
//! 要么原样放行，要么改写字母集合并追加一条修正说明。
//!
//! 规则顺序：
//! 1. 矛盾规则："ง（无正确答案）"与其他字母同时出现时只保留 ง
//! 2. 全选规则：四个字母全选视为模型兜底失败，收敛为 ง
//! 3. 政策规则：题目提到某医保制度时，剔除含该制度排除内容的选项
//! 4. 相关度规则：最终选项文本与上下文重叠度过低只降置信度，不改字母
//!
//! 本组件永不报错；空输入直接给出零置信度的终态结果。

use std::collections::BTreeSet;

use tracing::debug;

use crate::models::question::{AnswerCandidate, ChoiceLetter, Question, ValidatedAnswer};
use crate::services::policy;

/// 规则执行的中间状态
struct RuleState {
    letters: BTreeSet<ChoiceLetter>,
    corrections: Vec<String>,
    reasoning_parts: Vec<String>,
    low_relevance: bool,
}

/// 答案校验器
pub struct AnswerValidator {
    /// 选项文本与上下文的最低词重叠度
    content_relevance_threshold: f64,
}

impl AnswerValidator {
    pub fn new(content_relevance_threshold: f64) -> Self {
        Self {
            content_relevance_threshold,
        }
    }

    /// 校验候选答案并计算最终置信度
    pub fn validate(
        &self,
        question: &Question,
        candidate: &AnswerCandidate,
        context_text: &str,
    ) -> ValidatedAnswer {
        if candidate.is_empty() {
            return ValidatedAnswer {
                letters: Vec::new(),
                confidence: 0.0,
                corrections: Vec::new(),
                reasoning: "ไม่มีคำตอบจากแบบจำลอง".to_string(),
            };
        }

        let mut state = RuleState {
            letters: candidate.letters.clone(),
            corrections: Vec::new(),
            reasoning_parts: Vec::new(),
            low_relevance: false,
        };

        Self::rule_contradiction(&mut state);
        Self::rule_all_selected(&mut state);
        Self::rule_policy_exclusion(question, &mut state);
        self.rule_content_relevance(question, context_text, &mut state);

        let confidence = Self::compute_confidence(question, &state);
        let letters: Vec<ChoiceLetter> = state.letters.into_iter().collect();

        let reasoning = if state.reasoning_parts.is_empty() {
            "คำตอบผ่านการตรวจสอบโดยไม่มีการแก้ไข".to_string()
        } else {
            state.reasoning_parts.join("; ")
        };

        debug!(
            "校验完成: {:?} 置信度 {:.2}，修正 {} 处",
            letters.iter().map(|l| l.as_char()).collect::<Vec<_>>(),
            confidence,
            state.corrections.len()
        );

        ValidatedAnswer {
            letters,
            confidence,
            corrections: state.corrections,
            reasoning,
        }
    }

    /// 规则 1：ง 与其他字母互斥
    fn rule_contradiction(state: &mut RuleState) {
        let has_none = state
            .letters
            .iter()
            .any(|l| l.is_none_of_the_above());
        if has_none && state.letters.len() > 1 {
            state.letters.clear();
            state.letters.insert(ChoiceLetter::NONE_OF_THE_ABOVE);
            state
                .corrections
                .push("ตัด 'ง' ที่ขัดแย้งกับตัวเลือกอื่น เหลือเพียง 'ง'".to_string());
            state
                .reasoning_parts
                .push("'ไม่มีข้อใดถูกต้อง' ขัดแย้งกับการเลือกข้ออื่นพร้อมกัน".to_string());
        }
    }

    /// 规则 2：全字母表选中视为兜底失败
    fn rule_all_selected(state: &mut RuleState) {
        if state.letters.len() == ChoiceLetter::ALL.len() {
            state.letters.clear();
            state.letters.insert(ChoiceLetter::NONE_OF_THE_ABOVE);
            state
                .corrections
                .push("เลือกครบทุกข้อ ปรับเป็น 'ง'".to_string());
            state
                .reasoning_parts
                .push("การเลือกทุกตัวเลือกบ่งชี้ว่าแบบจำลองตอบแบบสุ่ม".to_string());
        }
    }

    /// 规则 3：医保政策排除表
    fn rule_policy_exclusion(question: &Question, state: &mut RuleState) {
        let policies = policy::policies_mentioned(&question.stem);
        if policies.is_empty() {
            return;
        }

        let rejected: Vec<ChoiceLetter> = state
            .letters
            .iter()
            .copied()
            .filter(|letter| {
                question
                    .choices
                    .get(letter)
                    .and_then(|text| policy::excluded_term_hit(text, &policies))
                    .is_some()
            })
            .collect();

        for letter in rejected {
            let (policy_name, term) = question
                .choices
                .get(&letter)
                .and_then(|text| policy::excluded_term_hit(text, &policies))
                .unwrap_or(("", ""));
            state.letters.remove(&letter);
            state.corrections.push(format!(
                "ตัดข้อ '{}' เพราะ '{}' ไม่อยู่ในความคุ้มครองของ{}",
                letter.as_char(),
                term,
                policy_name
            ));
            state.reasoning_parts.push(format!(
                "ตัวเลือก '{}' ขัดกับขอบเขตของ{}",
                letter.as_char(),
                policy_name
            ));
        }
    }

    /// 规则 4：选项文本与上下文的词重叠度，过低只降置信度
    fn rule_content_relevance(&self, question: &Question, context_text: &str, state: &mut RuleState) {
        if context_text.trim().is_empty() || state.letters.is_empty() {
            return;
        }

        let chosen_text: String = state
            .letters
            .iter()
            .filter_map(|l| question.choices.get(l))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        if chosen_text.is_empty() {
            return;
        }

        let relevance = Self::keyword_overlap(&chosen_text, context_text);
        if relevance < self.content_relevance_threshold {
            state.low_relevance = true;
            state.reasoning_parts.push(format!(
                "เนื้อหาตัวเลือกสอดคล้องกับบริบทต่ำ ({:.2})",
                relevance
            ));
        }
    }

    /// Jaccard 式词重叠
    fn keyword_overlap(a: &str, b: &str) -> f64 {
        let words_a: BTreeSet<String> = a
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .map(String::from)
            .collect();
        let words_b: BTreeSet<String> = b
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .map(String::from)
            .collect();

        if words_a.is_empty() || words_b.is_empty() {
            return 0.0;
        }
        let intersection = words_a.intersection(&words_b).count() as f64;
        let union = words_a.union(&words_b).count() as f64;
        intersection / union
    }

    /// 置信度：基准 0.7，有修正 +0.15，单选 ง +0.1，其他单选 +0.05，
    /// 题干过长 -0.05，相关度过低 -0.15，夹到 [0.1, 0.95]。
    /// 规则把字母剔空时直接落到下限。
    fn compute_confidence(question: &Question, state: &RuleState) -> f64 {
        if state.letters.is_empty() {
            return 0.1;
        }

        let mut confidence: f64 = 0.7;

        if !state.corrections.is_empty() {
            confidence += 0.15;
        }
        if state.letters.len() == 1 {
            let only = *state.letters.iter().next().unwrap();
            confidence += if only.is_none_of_the_above() { 0.1 } else { 0.05 };
        }
        if question.stem.chars().count() > 100 {
            confidence -= 0.05;
        }
        if state.low_relevance {
            confidence -= 0.15;
        }

        confidence.clamp(0.1, 0.95)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn question_with_choices() -> Question {
        let mut choices = BTreeMap::new();
        choices.insert(ChoiceLetter::KoKai, "การตรวจรักษาพยาบาลทั่วไป".to_string());
        choices.insert(ChoiceLetter::KhoKhai, "ค่าห้องพิเศษ".to_string());
        choices.insert(ChoiceLetter::KhoKhwai, "ยาจำเป็น".to_string());
        choices.insert(ChoiceLetter::NgoNgu, "ไม่มีข้อใดถูกต้อง".to_string());
        let mut q = Question::new("สิทธิหลักประกันสุขภาพแห่งชาติครอบคลุมข้อใด");
        q.choices = choices;
        q
    }

    fn candidate(letters: &[ChoiceLetter]) -> AnswerCandidate {
        AnswerCandidate {
            letters: letters.iter().copied().collect(),
            confidence: 0.7,
        }
    }

    #[test]
    fn test_contradiction_collapses_to_none() {
        let validator = AnswerValidator::new(0.3);
        let result = validator.validate(
            &question_with_choices(),
            &candidate(&[ChoiceLetter::KoKai, ChoiceLetter::NgoNgu]),
            "",
        );
        assert_eq!(result.letters, vec![ChoiceLetter::NgoNgu]);
        assert!(!result.corrections.is_empty());
    }

    #[test]
    fn test_all_selected_collapses_to_none() {
        let validator = AnswerValidator::new(0.3);
        let result = validator.validate(
            &question_with_choices(),
            &candidate(&[
                ChoiceLetter::KoKai,
                ChoiceLetter::KhoKhai,
                ChoiceLetter::KhoKhwai,
                ChoiceLetter::NgoNgu,
            ]),
            "",
        );
        assert_eq!(result.letters, vec![ChoiceLetter::NgoNgu]);
    }

    #[test]
    fn test_policy_exclusion_rejects_choice() {
        // ข คือ ค่าห้องพิเศษ ซึ่งอยู่ในรายการยกเว้นของหลักประกันสุขภาพแห่งชาติ
        let validator = AnswerValidator::new(0.3);
        let result = validator.validate(
            &question_with_choices(),
            &candidate(&[ChoiceLetter::KoKai, ChoiceLetter::KhoKhai]),
            "",
        );
        assert_eq!(result.letters, vec![ChoiceLetter::KoKai]);
        assert_eq!(result.corrections.len(), 1);
    }

    #[test]
    fn test_policy_rejecting_all_letters_is_low_confidence() {
        let validator = AnswerValidator::new(0.3);
        let result = validator.validate(
            &question_with_choices(),
            &candidate(&[ChoiceLetter::KhoKhai]),
            "",
        );
        assert!(result.letters.is_empty());
        assert!((result.confidence - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_clean_answer_passes_unchanged() {
        let mut q = question_with_choices();
        q.stem = "ข้อใดคือยาที่ควรพกติดตัว".to_string();
        let validator = AnswerValidator::new(0.3);
        let result = validator.validate(&q, &candidate(&[ChoiceLetter::KhoKhwai]), "");
        assert_eq!(result.letters, vec![ChoiceLetter::KhoKhwai]);
        assert!(result.corrections.is_empty());
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_candidate_is_terminal() {
        let validator = AnswerValidator::new(0.3);
        let result = validator.validate(&question_with_choices(), &AnswerCandidate::empty(), "");
        assert!(result.letters.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasoning, "ไม่มีคำตอบจากแบบจำลอง");
    }

    #[test]
    fn test_low_relevance_lowers_confidence_without_changing_letters() {
        let mut q = question_with_choices();
        q.stem = "ข้อใดคือยาที่ควรพกติดตัว".to_string();
        let validator = AnswerValidator::new(0.3);
        let with_context = validator.validate(
            &q,
            &candidate(&[ChoiceLetter::KhoKhwai]),
            "documents about orbital mechanics and rocket engines",
        );
        let without_context =
            validator.validate(&q, &candidate(&[ChoiceLetter::KhoKhwai]), "");
        assert_eq!(with_context.letters, without_context.letters);
        assert!(with_context.confidence < without_context.confidence);
    }

    #[test]
    fn test_long_stem_penalty() {
        let mut q = question_with_choices();
        q.stem = "ก".repeat(150);
        let validator = AnswerValidator::new(0.3);
        let result = validator.validate(&q, &candidate(&[ChoiceLetter::KhoKhwai]), "");
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }
}
