//! Tests for error types

use abtrack::Error;

#[test]
fn test_invalid_experiment_error() {
    let error = Error::InvalidExperiment {
        id: "exp_1".to_string(),
        reason: "no variants".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid experiment 'exp_1'"));
    assert!(error_str.contains("no variants"));
}

#[test]
fn test_transport_error() {
    let error = Error::Transport("connection reset".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Transport error"));
    assert!(error_str.contains("kept for retry"));
    assert!(error.is_transient());
}

#[test]
fn test_storage_error() {
    let error = Error::StorageError("quota exceeded".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("quota exceeded"));
    assert!(error.is_transient());
}

#[test]
fn test_no_runtime_error() {
    let error = Error::NoRuntime("interval flush timer".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("No async runtime"));
    assert!(error_str.contains("tokio runtime"));
    assert!(!error.is_transient());
}

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("sample sizes must be positive".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("sample sizes must be positive"));
    assert!(!error.is_transient());
}

#[test]
fn test_serialization_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("Serialization error"));
    assert!(!error.is_transient());
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error.is_transient());
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error message".to_string());
    let error_str = format!("{error}");
    assert_eq!(error_str, "custom error message");
}

#[test]
fn test_error_debug() {
    let error = Error::Transport("down".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Transport"));
}

#[test]
fn test_result_type_alias() {
    #[allow(clippy::unnecessary_wraps)]
    fn returns_result() -> abtrack::Result<i32> {
        Ok(42)
    }

    let result = returns_result();
    assert!(result.is_ok());
    assert_eq!(result.unwrap(), 42);
}

#[test]
fn test_result_type_alias_error() {
    fn returns_error() -> abtrack::Result<i32> {
        Err(Error::Other("test error".to_string()))
    }

    let result = returns_error();
    assert!(result.is_err());
}
