pub mod batch_processor;

pub use batch_processor::{App, ProcessingStats};
