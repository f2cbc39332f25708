//! 题目解析 - 业务能力层
//!
//! 只负责"原始文本 → 题干 + 选项"这一能力，不关心流程。
//!
//! 两种输入形态：
//! - 单行：题干和 `ก. ... ข. ...` 选项挤在一行
//! - 多行：前面的行是题干，后续以字母开头的行是选项
//!
//! 完全没有选项标记时返回空选项表（开放题是常见输入，不算错误），
//! 调用方必须显式检查 `has_choices()`。

use regex::Regex;

use crate::models::question::{ChoiceLetter, Question};

/// 题目解析器
pub struct QuestionParser {
    /// 单行模式的选项标记：字母 + 句点，且前面必须是空白或行首，
    /// 避免把题干正文里出现的字母误判成选项边界
    inline_marker: Regex,
    /// 多行模式的选项行
    line_marker: Regex,
}

impl QuestionParser {
    pub fn new() -> Self {
        Self {
            inline_marker: Regex::new(r"(?:^|\s)([ก-ง])\.").unwrap(),
            line_marker: Regex::new(r"^([ก-ง])[.\s]\s*(.*)$").unwrap(),
        }
    }

    /// 解析原始题目文本
    pub fn parse(&self, raw_text: &str) -> Question {
        let text = raw_text.trim();

        if !text.contains('\n') && self.inline_marker.is_match(text) {
            self.parse_single_line(text)
        } else {
            self.parse_multi_line(text)
        }
    }

    /// 单行格式：定位每个标记，截取到下一个标记或行尾
    fn parse_single_line(&self, text: &str) -> Question {
        // (字母, 标记整体起点, 选项文本起点)
        let mut markers: Vec<(ChoiceLetter, usize, usize)> = Vec::new();
        for cap in self.inline_marker.captures_iter(text) {
            let full = cap.get(0).unwrap();
            let letter_match = cap.get(1).unwrap();
            if let Some(letter) = ChoiceLetter::from_str(letter_match.as_str()) {
                markers.push((letter, full.start(), full.end()));
            }
        }

        if markers.is_empty() {
            return Question::new(text);
        }

        let mut question = Question::new(text[..markers[0].1].trim());
        for (i, &(letter, _, text_start)) in markers.iter().enumerate() {
            let text_end = markers
                .get(i + 1)
                .map(|&(_, next_start, _)| next_start)
                .unwrap_or(text.len());
            let choice_text = text[text_start..text_end].trim();
            if !choice_text.is_empty() {
                question.choices.entry(letter).or_insert_with(|| choice_text.to_string());
            }
        }
        question
    }

    /// 多行格式：首个选项行之前的行拼成题干
    fn parse_multi_line(&self, text: &str) -> Question {
        let mut stem_lines: Vec<&str> = Vec::new();
        let mut question = Question::new("");
        let mut in_choices = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(cap) = self.line_marker.captures(line) {
                if let Some(letter) = ChoiceLetter::from_str(&cap[1]) {
                    in_choices = true;
                    let choice_text = cap[2].trim().to_string();
                    question.choices.entry(letter).or_insert(choice_text);
                    continue;
                }
            }

            if !in_choices {
                stem_lines.push(line);
            }
        }

        question.stem = stem_lines.join(" ");
        question
    }
}

impl Default for QuestionParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_single_line() {
        let parser = QuestionParser::new();
        let q = parser.parse(
            "สิทธิใดที่ให้บริการฟรี? ก. สิทธิหลักประกัน ข. สิทธิบัตรทอง ค. สิทธิ 30 บาท ง. ไม่มีข้อใดถูกต้อง",
        );
        assert_eq!(q.stem, "สิทธิใดที่ให้บริการฟรี?");
        assert_eq!(q.choices.len(), 4);
        assert_eq!(q.choices[&ChoiceLetter::KoKai], "สิทธิหลักประกัน");
        assert_eq!(q.choices[&ChoiceLetter::NgoNgu], "ไม่มีข้อใดถูกต้อง");
    }

    #[test]
    fn test_parse_multi_line() {
        let parser = QuestionParser::new();
        let q = parser.parse(
            "สิทธิบัตรทองครอบคลุมอะไรบ้าง\nก. การรักษาฟรี\nข. ยาฟรี\nค. ค่าห้องพิเศษ\nง. ไม่มีข้อใดถูกต้อง",
        );
        assert_eq!(q.stem, "สิทธิบัตรทองครอบคลุมอะไรบ้าง");
        assert_eq!(q.choices.len(), 4);
        assert_eq!(q.choices[&ChoiceLetter::KhoKhai], "ยาฟรี");
    }

    #[test]
    fn test_parse_without_markers_yields_empty_choices() {
        let parser = QuestionParser::new();
        let q = parser.parse("หลักประกันสุขภาพแห่งชาติคืออะไร");
        assert!(!q.has_choices());
        assert_eq!(q.stem, "หลักประกันสุขภาพแห่งชาติคืออะไร");
    }

    #[test]
    fn test_letter_in_stem_prose_is_not_a_boundary() {
        // ง ปลาไม่ตามด้วยจุด ไม่ใช่ตัวเลือก
        let parser = QuestionParser::new();
        let q = parser.parse("คำที่ขึ้นต้นด้วย ง เช่นอะไร ก. งู ข. ม้า");
        assert_eq!(q.stem, "คำที่ขึ้นต้นด้วย ง เช่นอะไร");
        assert_eq!(q.choices.len(), 2);
    }

    #[test]
    fn test_parse_roundtrip() {
        let parser = QuestionParser::new();
        let stem = "สิทธิใดบ้างที่ประชาชนได้รับ?";
        let mut choices = BTreeMap::new();
        choices.insert(ChoiceLetter::KoKai, "สิทธิหลักประกัน".to_string());
        choices.insert(ChoiceLetter::KhoKhai, "สิทธิบัตรทอง".to_string());
        choices.insert(ChoiceLetter::KhoKhwai, "สิทธิ30บาท".to_string());
        choices.insert(ChoiceLetter::NgoNgu, "ไม่มีข้อใดถูกต้อง".to_string());

        let raw = format!(
            "{} {}",
            stem,
            choices
                .iter()
                .map(|(l, t)| format!("{}. {}", l, t))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let q = parser.parse(&raw);
        assert_eq!(q.stem, stem);
        assert_eq!(q.choices, choices);
    }
}
