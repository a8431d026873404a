/*!
 * Tests for error types and conversions
 */

use subburn::errors::{AppError, CaptionError, ExportError, ServiceError};
use subburn::export::JobStatus;

#[test]
fn test_serviceError_apiError_shouldDisplayStatusAndMessage() {
    let error = ServiceError::ApiError {
        status_code: 429,
        message: "Too many requests".to_string(),
    };
    let display = format!("{}", error);
    assert!(display.contains("429"));
    assert!(display.contains("Too many requests"));
}

#[test]
fn test_serviceError_connectionError_shouldDisplayCorrectly() {
    let error = ServiceError::ConnectionError("Host unreachable".to_string());
    let display = format!("{}", error);
    assert!(display.contains("Connection error"));
    assert!(display.contains("Host unreachable"));
}

#[test]
fn test_serviceError_isTransient_shouldClassifyErrors() {
    assert!(ServiceError::ConnectionError("down".to_string()).is_transient());
    assert!(ServiceError::ApiError { status_code: 503, message: String::new() }.is_transient());
    assert!(ServiceError::ApiError { status_code: 429, message: String::new() }.is_transient());
    assert!(!ServiceError::ApiError { status_code: 404, message: String::new() }.is_transient());
    assert!(!ServiceError::ParseError("bad".to_string()).is_transient());
    assert!(!ServiceError::Cancelled.is_transient());
}

#[test]
fn test_serviceError_cancelled_shouldBeDistinguishable() {
    assert!(ServiceError::Cancelled.is_cancelled());
    assert!(!ServiceError::RequestFailed("timeout".to_string()).is_cancelled());
}

#[test]
fn test_exportError_notDownloadable_shouldNameStatus() {
    let error = ExportError::NotDownloadable {
        project_id: "intro".to_string(),
        status: JobStatus::Processing,
    };
    let display = error.to_string();
    assert!(display.contains("intro"));
    assert!(display.contains("processing"));
}

#[test]
fn test_exportError_fromServiceError_shouldWrap() {
    let error: ExportError = ServiceError::Cancelled.into();
    assert_eq!(error, ExportError::Service(ServiceError::Cancelled));
}

#[test]
fn test_captionError_invalidTiming_shouldIncludeIndex() {
    let error = CaptionError::InvalidTiming {
        index: 4,
        start: 2.0,
        end: 1.0,
    };
    assert!(error.to_string().contains("cue 4"));
}

#[test]
fn test_appError_conversions_shouldPreserveMessages() {
    let from_service: AppError = ServiceError::ParseError("Invalid JSON".to_string()).into();
    assert!(matches!(from_service, AppError::Service(_)));
    assert!(from_service.to_string().contains("Invalid JSON"));

    let from_export: AppError = ExportError::EmptyBatch.into();
    assert!(matches!(from_export, AppError::Export(_)));

    let from_io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.srt").into();
    assert!(matches!(from_io, AppError::File(_)));

    let from_anyhow: AppError = anyhow::anyhow!("something odd").into();
    assert!(matches!(from_anyhow, AppError::Unknown(_)));
}
