pub mod llm_client;
pub mod vector_client;

pub use llm_client::{
    CompletionOptions, CompletionService, OpenAiCompletion, RuleBasedCompletion,
    ServiceAvailability,
};
pub use vector_client::{HttpVectorSearch, ScoredText, VectorSearch};
