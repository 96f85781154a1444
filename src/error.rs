use thiserror::Error;

pub type RollCallResult<T> = Result<T, RollCallError>;

#[derive(Error, Debug)]
pub enum RollCallError {
    #[error("Error reading Poll file: {0}")]
    Parse(String),

    #[error("Poll report must contain a column named '{column}'.")]
    MissingColumn { column: String },

    #[error("Column '{column}' not found in Master Sheet (row 1).")]
    MissingEmailColumn { column: String },

    #[error("No Poll report column header contains '{substring}'.")]
    NoMatchingColumns { substring: String },

    #[error("No valid student emails were found in the Poll report.")]
    EmptyRoster,

    #[error("Error reading Master Excel file: {0}")]
    MasterRead(String),

    #[error("Failed to write updated Master Excel file: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RollCallError {
    /// True for failures caused by the uploaded files rather than the
    /// environment or the configuration.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RollCallError::Parse(_)
                | RollCallError::MissingColumn { .. }
                | RollCallError::MissingEmailColumn { .. }
                | RollCallError::NoMatchingColumns { .. }
                | RollCallError::EmptyRoster
                | RollCallError::MasterRead(_)
        )
    }
}
