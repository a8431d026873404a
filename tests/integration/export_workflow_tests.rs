/*!
 * Integration tests for the batch export workflow
 */

use std::sync::Arc;

use anyhow::Result;
use subburn::app_controller::Controller;
use subburn::export::{BatchStatus, ExportParams, JobStatus, OutputFormat};
use subburn::services::mock::{MockExportService, MockRenderService};
use tokio_util::sync::CancellationToken;

use crate::common;

use JobStatus::{Failed, Pending, Processing};

fn controller(export: &MockExportService) -> Controller {
    common::init_logging();
    Controller::with_services(
        common::test_config(),
        Arc::new(MockRenderService::new()),
        Arc::new(export.clone()),
    )
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn test_export_withCompletedBatch_shouldDownloadEveryProject() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let service = MockExportService::new();

    let batch = controller(&service)
        .export(
            ids(&["intro", "outro"]),
            ExportParams::default(),
            Some(temp_dir.path().to_path_buf()),
            CancellationToken::new(),
        )
        .await?;

    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(std::fs::read_to_string(temp_dir.path().join("intro.mp4"))?, "video:intro");
    assert_eq!(std::fs::read_to_string(temp_dir.path().join("outro.mp4"))?, "video:outro");
    Ok(())
}

#[tokio::test]
async fn test_export_withFailedJob_shouldDownloadOnlyCompleted() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let service = MockExportService::new();
    service.script("project-2", vec![Pending, Processing, Failed]);
    let params = ExportParams {
        format: OutputFormat::Webm,
        ..ExportParams::default()
    };

    let batch = controller(&service)
        .export(
            ids(&["project-1", "project-2", "project-3"]),
            params,
            Some(temp_dir.path().to_path_buf()),
            CancellationToken::new(),
        )
        .await?;

    assert_eq!(batch.status, BatchStatus::Failed);
    assert!(temp_dir.path().join("project-1.webm").exists());
    assert!(!temp_dir.path().join("project-2.webm").exists());
    assert!(temp_dir.path().join("project-3.webm").exists());
    Ok(())
}

#[tokio::test]
async fn test_export_withUnsafeProjectId_shouldSanitizeFileName() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let service = MockExportService::new();

    controller(&service)
        .export(
            ids(&["../season 1/ep"]),
            ExportParams::default(),
            Some(temp_dir.path().to_path_buf()),
            CancellationToken::new(),
        )
        .await?;

    assert!(temp_dir.path().join("___season_1_ep.mp4").exists());
    Ok(())
}

#[tokio::test]
async fn test_export_withInterrupt_shouldCancelBatch() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let service = MockExportService::new();
    service.script("project-1", vec![Pending, Processing, Processing, Processing, Processing]);
    let interrupt = CancellationToken::new();
    interrupt.cancel();

    let batch = controller(&service)
        .export(
            ids(&["project-1"]),
            ExportParams::default(),
            Some(temp_dir.path().to_path_buf()),
            interrupt,
        )
        .await?;

    assert_eq!(batch.status, BatchStatus::Cancelled);
    assert_eq!(service.cancels(), 1);
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_export_withFailingCancel_shouldStopPolling() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let service = MockExportService::new();
    service.script("project-1", vec![Pending, Processing, Processing, Processing, Processing]);
    service.fail_cancels(1);
    let interrupt = CancellationToken::new();
    interrupt.cancel();

    let result = controller(&service)
        .export(
            ids(&["project-1"]),
            ExportParams::default(),
            Some(temp_dir.path().to_path_buf()),
            interrupt,
        )
        .await;
    tokio_test::assert_err!(result);
    assert_eq!(service.cancels(), 1);

    let polls = service.polls();
    tokio::time::sleep(common::POLL_INTERVAL * 10).await;
    assert_eq!(service.polls(), polls);
    Ok(())
}

#[tokio::test]
async fn test_export_withNoProjects_shouldFail() {
    let service = MockExportService::new();
    let result = controller(&service)
        .export(vec![], ExportParams::default(), None, CancellationToken::new())
        .await;
    tokio_test::assert_err!(result);
}

#[tokio::test]
async fn test_status_shouldReflectServiceState() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let service = MockExportService::new();
    let controller = controller(&service);

    let batch = controller
        .export(
            ids(&["project-1"]),
            ExportParams::default(),
            Some(temp_dir.path().to_path_buf()),
            CancellationToken::new(),
        )
        .await?;

    let status = controller.status(&batch.id).await?;
    assert_eq!(status.status, BatchStatus::Completed);
    assert_eq!(status.total_count, 1);
    tokio_test::assert_err!(controller.status("missing").await);
    Ok(())
}
