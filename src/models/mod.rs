pub mod fact;
pub mod loaders;
pub mod question;

pub use fact::{ExtractionResult, Fact, FactCacheFile, FactDraft};
pub use loaders::{load_dataset, write_results, DatasetRow};
pub use question::{
    AnswerCandidate, ChoiceLetter, OutputRecord, Question, RetrievedSnippet, ValidatedAnswer,
};
