use std::str::FromStr;

use tracing::warn;

use crate::error::ConfigError;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的题目数量（1 为顺序处理）
    pub max_concurrent_questions: usize,
    /// 输入数据集（CSV，列: id,question）
    pub input_csv: String,
    /// 输出文件（CSV，列: id,answer）
    pub output_csv: String,
    /// 扩展输出模式（额外输出 question 和 confidence 列）
    pub extended_output: bool,
    /// 知识库文本文件（按空行分段）
    pub knowledge_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 单次 LLM 调用超时（秒）
    pub llm_timeout_secs: u64,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 向量检索配置 ---
    /// 向量检索服务地址（为空时退化为关键词检索）
    pub vector_search_url: Option<String>,
    /// 每个问题检索的上下文片段数
    pub retrieval_top_k: usize,
    // --- 事实缓存配置 ---
    pub cache_file: String,
    /// 每个问题注入的缓存事实数
    pub fact_top_k: usize,
    /// 事实写入的相关度阈值（1-10 分制）
    pub fact_relevance_threshold: f64,
    /// 每新增多少条事实落盘一次
    pub fact_flush_interval: usize,
    // --- 校验配置 ---
    /// 内容相关度阈值，低于此值降低置信度
    pub content_relevance_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_questions: 8,
            input_csv: "data/test.csv".to_string(),
            output_csv: "data/answers.csv".to_string(),
            extended_output: false,
            knowledge_file: "data/knowledge.txt".to_string(),
            verbose_logging: false,
            llm_api_key: "ollama".to_string(),
            llm_api_base_url: "http://localhost:11434/v1".to_string(),
            llm_model_name: "llama3.1:8b".to_string(),
            llm_timeout_secs: 30,
            llm_temperature: 0.3,
            llm_max_tokens: 512,
            vector_search_url: None,
            retrieval_top_k: 5,
            cache_file: "data/cache/knowledge_cache.json".to_string(),
            fact_top_k: 3,
            fact_relevance_threshold: 5.0,
            fact_flush_interval: 5,
            content_relevance_threshold: 0.3,
        }
    }
}

/// 解析环境变量，值非法时记 warn 并回退默认值
fn parse_env<T: FromStr>(var_name: &str, expected_type: &str, default: T) -> T {
    match std::env::var(var_name) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    "⚠️ {}",
                    ConfigError::EnvVarParseFailed {
                        var_name: var_name.to_string(),
                        value,
                        expected_type: expected_type.to_string(),
                    }
                );
                default
            }
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_questions: parse_env(
                "MAX_CONCURRENT_QUESTIONS",
                "usize",
                default.max_concurrent_questions,
            ),
            input_csv: std::env::var("INPUT_CSV").unwrap_or(default.input_csv),
            output_csv: std::env::var("OUTPUT_CSV").unwrap_or(default.output_csv),
            extended_output: parse_env("EXTENDED_OUTPUT", "bool", default.extended_output),
            knowledge_file: std::env::var("KNOWLEDGE_FILE").unwrap_or(default.knowledge_file),
            verbose_logging: parse_env("VERBOSE_LOGGING", "bool", default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS", "u64", default.llm_timeout_secs),
            llm_temperature: parse_env("LLM_TEMPERATURE", "f32", default.llm_temperature),
            llm_max_tokens: parse_env("LLM_MAX_TOKENS", "u32", default.llm_max_tokens),
            vector_search_url: std::env::var("VECTOR_SEARCH_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K", "usize", default.retrieval_top_k),
            cache_file: std::env::var("CACHE_FILE").unwrap_or(default.cache_file),
            fact_top_k: parse_env("FACT_TOP_K", "usize", default.fact_top_k),
            fact_relevance_threshold: parse_env(
                "FACT_RELEVANCE_THRESHOLD",
                "f64",
                default.fact_relevance_threshold,
            ),
            fact_flush_interval: parse_env(
                "FACT_FLUSH_INTERVAL",
                "usize",
                default.fact_flush_interval,
            ),
            content_relevance_threshold: parse_env(
                "CONTENT_RELEVANCE_THRESHOLD",
                "f64",
                default.content_relevance_threshold,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_questions, 8);
        assert_eq!(config.fact_flush_interval, 5);
        assert!(config.vector_search_url.is_none());
    }

    #[test]
    fn test_parse_env_falls_back_on_bad_value() {
        std::env::set_var("TEST_BAD_USIZE_VALUE", "not-a-number");
        let parsed: usize = parse_env("TEST_BAD_USIZE_VALUE", "usize", 7);
        assert_eq!(parsed, 7);
        std::env::remove_var("TEST_BAD_USIZE_VALUE");
    }
}
