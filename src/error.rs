use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum CodeError {
    #[display("invalid stock or index code format: \"{input}\"")]
    InvalidFormat { input: String },
}

#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("request to {source_name} failed")]
    Request { source_name: String },
    #[display("failed to parse response from {source_name}")]
    ResponseParse { source_name: String },
    #[display("{source_name} does not provide {operation}")]
    Unsupported {
        source_name: String,
        operation: String,
    },
    #[display("no {what} available for {code}")]
    Unavailable { what: String, code: String },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum ReportError {
    #[display("failed to write report to {path}")]
    Write { path: String },
}
