use std::path::PathBuf;
use thiserror::Error;

/// Stage-level failures. Row-level problems never end up here; they are
/// collected as `ValidationError`s instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML or misses required keys.
    #[error("Invalid configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// The configuration parsed but a value is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required input workbook does not exist.
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    /// A workbook exists but could not be opened or a sheet could not be read.
    #[error("Failed to read workbook {path}: {source}")]
    Workbook {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("Workbook {path} has no sheets")]
    EmptyWorkbook { path: PathBuf },

    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The temporary file could not be renamed over the destination.
    #[error("Failed to replace {}: {}", .0.file.path().display(), .0.error)]
    Persist(#[from] tempfile::PersistError),

    /// Both serialization strategies failed; the destination is untouched.
    #[error("Failed to write {path}: {primary}; fallback also failed: {fallback}")]
    OutputFailed {
        path: PathBuf,
        primary: String,
        fallback: String,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_not_found_names_the_file() {
        let err = PipelineError::InputNotFound(PathBuf::from("prod_quantita.xlsx"));
        assert_eq!(err.to_string(), "Input file not found: prod_quantita.xlsx");
    }

    #[test]
    fn output_failed_carries_both_causes() {
        let err = PipelineError::OutputFailed {
            path: PathBuf::from("data.xlsx"),
            primary: "string too long".to_string(),
            fallback: "disk full".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("data.xlsx"));
        assert!(msg.contains("string too long"));
        assert!(msg.contains("disk full"));
    }
}
