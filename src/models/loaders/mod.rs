pub mod csv_loader;

pub use csv_loader::{load_dataset, write_results, DatasetRow};
