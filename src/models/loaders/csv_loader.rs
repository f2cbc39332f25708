//! 数据集 CSV 读写
//!
//! 输入列: `id,question`；输出列: `id,answer`（扩展模式追加 `question,confidence`）。

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, AppResult, FileError};
use crate::models::question::OutputRecord;

/// 数据集中的一行
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetRow {
    pub id: String,
    pub question: String,
}

/// 从 CSV 文件加载全部题目
pub fn load_dataset(path: &str) -> AppResult<Vec<DatasetRow>> {
    if !Path::new(path).exists() {
        return Err(AppError::File(FileError::NotFound {
            path: path.to_string(),
        }));
    }

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::File(FileError::ReadFailed {
            path: path.to_string(),
            source: Box::new(e),
        }))?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: DatasetRow = record.map_err(|e| AppError::File(FileError::CsvParseFailed {
            path: path.to_string(),
            source: Box::new(e),
        }))?;
        rows.push(row);
    }

    info!("成功加载 {} 个题目: {}", rows.len(), path);
    Ok(rows)
}

/// 写出结果 CSV
///
/// 行数与输入一一对应，由调用方保证顺序。
pub fn write_results(
    path: &str,
    records: &[OutputRecord],
    questions: &[DatasetRow],
    extended: bool,
) -> AppResult<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::File(FileError::WriteFailed {
                path: path.to_string(),
                source: Box::new(e),
            }))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::File(FileError::WriteFailed {
            path: path.to_string(),
            source: Box::new(e),
        }))?;

    if extended {
        writer.write_record(["id", "question", "answer", "confidence"])?;
        for (record, row) in records.iter().zip(questions) {
            writer.write_record([
                record.id.as_str(),
                row.question.as_str(),
                record.answer.as_str(),
                &format!("{:.2}", record.confidence),
            ])?;
        }
    } else {
        writer.write_record(["id", "answer"])?;
        for record in records {
            writer.write_record([record.id.as_str(), record.answer.as_str()])?;
        }
    }

    writer.flush().map_err(|e| AppError::File(FileError::WriteFailed {
        path: path.to_string(),
        source: Box::new(e),
    }))?;

    info!("已写出 {} 条结果: {}", records.len(), path);
    Ok(())
}
