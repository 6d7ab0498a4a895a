//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("ingest error: {0}")]
    Ingest(String),

    #[error("research error: {0}")]
    Research(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn search_error_display() {
        let e = AppError::Search("HTTP 429".into());
        assert!(e.to_string().contains("HTTP 429"));
    }

    #[test]
    fn research_error_display() {
        let e = AppError::Research("no plan returned".into());
        assert!(e.to_string().contains("no plan returned"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        // satisfies std::error::Error trait
        let _: &dyn Error = &e;
    }
}
