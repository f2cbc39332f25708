//! 医保政策知识表
//!
//! 泰国医保三大制度的静态排除表：题目提到某项制度时，
//! 含有该制度明确不覆盖内容的选项应被剔除。
//! 编译期构建，运行时只读。

use phf::phf_map;

/// 单项制度的特征词与排除词
pub struct PolicyProfile {
    /// 题干中出现这些词视为在谈论该制度
    pub keywords: &'static [&'static str],
    /// 该制度明确不覆盖的内容
    pub excluded_terms: &'static [&'static str],
}

/// 制度名 → 特征/排除表
pub static HEALTHCARE_POLICIES: phf::Map<&'static str, PolicyProfile> = phf_map! {
    "สิทธิหลักประกันสุขภาพแห่งชาติ" => PolicyProfile {
        keywords: &["หลักประกัน", "สุขภาพแห่งชาติ", "UC"],
        excluded_terms: &[
            "การรักษาเสริมความงาม",
            "ยาแบรนด์เนม",
            "ค่าห้องพิเศษ",
            "การรักษาทดลอง",
            "อุปกรณ์เสริม",
            "การท่องเที่ยวเพื่อสุขภาพ",
        ],
    },
    "สิทธิบัตรทอง" => PolicyProfile {
        keywords: &["บัตรทอง"],
        excluded_terms: &["ค่าใช้จ่าย", "เงินสด", "ค่าบริการ", "ค่าตรวจ"],
    },
    "สิทธิ30บาทรักษาทุกโรค" => PolicyProfile {
        keywords: &["30บาท", "รักษาทุกโรค"],
        excluded_terms: &["ฟรี", "ไม่เสียค่าใช้จ่าย", "ผู้สูงอายุเท่านั้น"],
    },
};

/// 找出题干涉及的制度
pub fn policies_mentioned(stem: &str) -> Vec<(&'static str, &'static PolicyProfile)> {
    HEALTHCARE_POLICIES
        .entries()
        .filter(|(name, profile)| {
            stem.contains(*name) || profile.keywords.iter().any(|kw| stem.contains(kw))
        })
        .map(|(name, profile)| (*name, profile))
        .collect()
}

/// 选项文本是否命中某制度的排除词，命中时返回第一个排除词
pub fn excluded_term_hit(
    choice_text: &str,
    policies: &[(&'static str, &'static PolicyProfile)],
) -> Option<(&'static str, &'static str)> {
    for (name, profile) in policies {
        for term in profile.excluded_terms {
            if choice_text.contains(term) {
                return Some((name, term));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_detection_by_keyword() {
        let hits = policies_mentioned("ผู้ถือบัตรทองต้องจ่ายอะไรบ้าง");
        assert!(hits.iter().any(|(name, _)| *name == "สิทธิบัตรทอง"));
    }

    #[test]
    fn test_no_policy_mentioned() {
        assert!(policies_mentioned("วันนี้อากาศเป็นอย่างไร").is_empty());
    }

    #[test]
    fn test_excluded_term_hit() {
        let policies = policies_mentioned("สิทธิหลักประกันสุขภาพแห่งชาติครอบคลุมอะไร");
        let hit = excluded_term_hit("ค่าห้องพิเศษในโรงพยาบาลเอกชน", &policies);
        assert_eq!(hit.map(|(_, term)| term), Some("ค่าห้องพิเศษ"));

        let miss = excluded_term_hit("การผ่าตัดที่จำเป็น", &policies);
        assert!(miss.is_none());
    }
}
