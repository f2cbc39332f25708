//! 学习事实数据结构
//!
//! 从历史问答中抽取出来的小块结构化知识，由事实缓存持久化复用。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 缓存中的一条事实
///
/// id 为 `(type, key, value)` 的内容哈希，仅用于去重，不作展示用。
/// 创建之后不再修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fact {
    pub id: String,
    #[serde(rename = "type")]
    pub fact_type: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub source_question: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// 抽取时对来源问题的相关度（1-10 分制，仅在创建时有意义）
    #[serde(default)]
    pub relevance_score: f64,
}

impl Fact {
    /// 计算内容哈希（SHA-256 前 8 位十六进制）
    pub fn content_hash(fact_type: &str, key: &str, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}", fact_type, key, value).as_bytes());
        format!("{:x}", hasher.finalize())[..8].to_string()
    }

    /// 用于关键词匹配的拼接文本（小写）
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {} {}",
            self.key,
            self.value,
            self.context.as_deref().unwrap_or("")
        )
        .to_lowercase()
    }
}

/// 抽取阶段产生的事实草稿（尚未分配 id 和时间戳）
#[derive(Debug, Clone, Deserialize)]
pub struct FactDraft {
    #[serde(rename = "type")]
    pub fact_type: String,
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// 事实抽取调用的 JSON 结构
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub facts: Vec<FactDraft>,
    #[serde(default)]
    pub relevance_score: f64,
}

/// 持久化缓存文件格式（版本 1.0）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactCacheFile {
    pub facts: Vec<Fact>,
    pub last_updated: Option<String>,
    pub version: String,
}

impl FactCacheFile {
    pub const VERSION: &'static str = "1.0";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = Fact::content_hash("ราคายา", "พาราเซตามอล", "10 บาท");
        let b = Fact::content_hash("ราคายา", "พาราเซตามอล", "10 บาท");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_content_hash_differs_on_value() {
        let a = Fact::content_hash("ราคายา", "พาราเซตามอล", "10 บาท");
        let b = Fact::content_hash("ราคายา", "พาราเซตามอล", "20 บาท");
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_file_roundtrip_keeps_optional_fields() {
        let json = r#"{
            "facts": [
                {"id": "abcd1234", "type": "สิทธิประโยชน์", "key": "บัตรทอง", "value": "รักษาฟรี"}
            ],
            "last_updated": null,
            "version": "1.0"
        }"#;
        let file: FactCacheFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.facts.len(), 1);
        assert!(file.facts[0].context.is_none());
        assert_eq!(file.facts[0].relevance_score, 0.0);
    }
}
