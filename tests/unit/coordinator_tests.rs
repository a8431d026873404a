/*!
 * Tests for debounced, cancellable preview coordination
 */

use std::sync::Arc;
use std::time::Duration;

use subburn::preview::{ChangeOutcome, PreviewCache, PreviewCoordinator, PreviewStatus};
use subburn::services::mock::MockRenderService;
use subburn::services::PreviewRequest;
use subburn::style::{compute_key, StyleDescriptor};

use crate::common::{sample_cues, style_with_size};

const DEBOUNCE: Duration = Duration::from_millis(250);

fn coordinator(service: &MockRenderService) -> PreviewCoordinator {
    PreviewCoordinator::new(
        PreviewCache::new(16, Duration::from_secs(300)),
        Arc::new(service.clone()),
        DEBOUNCE,
    )
}

fn expected_artifact(style: &StyleDescriptor) -> String {
    MockRenderService::artifact_for(&PreviewRequest::new(&sample_cues(), style))
}

#[tokio::test(start_paused = true)]
async fn test_on_change_withBurstOfEdits_shouldIssueOneRequest() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);
    let cues = sample_cues();

    for size in [40.0, 42.0, 44.0, 46.0, 48.0] {
        assert_eq!(coordinator.on_change(&cues, &style_with_size(size)), ChangeOutcome::Scheduled);
    }
    assert_eq!(coordinator.state().status, PreviewStatus::Debouncing);

    let state = coordinator.settled().await;
    assert_eq!(service.calls(), 1);
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&style_with_size(48.0)).as_str()));
    assert_eq!(service.requests()[0].style.font_size, 48.0);
}

#[tokio::test(start_paused = true)]
async fn test_on_change_withEditsInsideQuietPeriod_shouldRestartDebounce() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);
    let cues = sample_cues();

    for size in [40.0, 44.0, 48.0] {
        coordinator.on_change(&cues, &style_with_size(size));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(service.calls(), 0);
    }

    coordinator.settled().await;
    assert_eq!(service.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_on_change_withSameInput_shouldBeUnchanged() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let style = StyleDescriptor::default();

    assert_eq!(coordinator.on_change(&cues, &style), ChangeOutcome::Scheduled);
    assert_eq!(coordinator.on_change(&cues, &style), ChangeOutcome::Unchanged);
    coordinator.settled().await;

    let mut decorated = style.clone();
    decorated.extra.insert("selectedTab".to_string(), serde_json::json!("colors"));
    assert_eq!(coordinator.on_change(&cues, &decorated), ChangeOutcome::Unchanged);
    assert_eq!(service.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_on_change_whileRequestInFlight_shouldAbortIt() {
    let service = MockRenderService::new().with_delay(Duration::from_secs(1));
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let first = style_with_size(40.0);
    let second = style_with_size(60.0);

    coordinator.on_change(&cues, &first);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(coordinator.state().status, PreviewStatus::Loading);

    coordinator.on_change(&cues, &second);
    let state = coordinator.settled().await;

    assert_eq!(service.calls(), 2);
    assert_eq!(service.cancellations(), 1);
    assert_eq!(service.completed(), 1);
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&second).as_str()));
    assert_eq!(state.displayed_key, Some(compute_key(&cues, &second)));
    assert!(!coordinator.cache().contains(&compute_key(&cues, &first)));
}

#[tokio::test(start_paused = true)]
async fn test_late_response_forSupersededInput_shouldBeCachedNotDisplayed() {
    let service = MockRenderService::new().with_delay(Duration::from_millis(100));
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let first = style_with_size(40.0);
    let second = style_with_size(60.0);

    // First request goes out at 250ms and answers at 350ms
    coordinator.on_change(&cues, &first);
    tokio::time::sleep(Duration::from_millis(300)).await;
    coordinator.on_change(&cues, &second);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = coordinator.state();
    assert!(state.artifact.is_none());
    assert_eq!(state.status, PreviewStatus::Debouncing);
    assert!(coordinator.cache().contains(&compute_key(&cues, &first)));

    let state = coordinator.settled().await;
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&second).as_str()));
    assert_eq!(service.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_on_change_withCachedInput_shouldBypassDebounce() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let first = style_with_size(40.0);
    let second = style_with_size(60.0);

    coordinator.on_change(&cues, &first);
    coordinator.settled().await;
    coordinator.on_change(&cues, &second);
    coordinator.settled().await;
    assert_eq!(service.calls(), 2);

    assert_eq!(coordinator.on_change(&cues, &first), ChangeOutcome::CacheHit);
    let state = coordinator.state();
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&first).as_str()));
    assert_eq!(service.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_whileRequestInFlight_shouldAbortRequest() {
    let service = MockRenderService::new().with_delay(Duration::from_secs(1));
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let cached = style_with_size(40.0);
    coordinator.cache().put(compute_key(&cues, &cached), "cached artifact");

    coordinator.on_change(&cues, &style_with_size(60.0));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(coordinator.on_change(&cues, &cached), ChangeOutcome::CacheHit);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let state = coordinator.state();
    assert_eq!(state.artifact.as_deref(), Some("cached artifact"));
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(service.cancellations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_render_shouldKeepPreviousArtifactAndNotCache() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let good = style_with_size(40.0);
    let bad = style_with_size(60.0);

    coordinator.on_change(&cues, &good);
    coordinator.settled().await;

    service.fail_next(1);
    coordinator.on_change(&cues, &bad);
    let state = coordinator.settled().await;

    assert!(matches!(state.status, PreviewStatus::Error(_)));
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&good).as_str()));
    assert_eq!(state.displayed_key, Some(compute_key(&cues, &good)));
    assert_eq!(state.committed_key, Some(compute_key(&cues, &bad)));
    assert!(!coordinator.cache().contains(&compute_key(&cues, &bad)));

    // The same input is retried on the next edit
    assert_eq!(coordinator.on_change(&cues, &bad), ChangeOutcome::Scheduled);
    let state = coordinator.settled().await;
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&bad).as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_withCachedInput_shouldRenderAgain() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let style = StyleDescriptor::default();

    coordinator.on_change(&cues, &style);
    coordinator.settled().await;

    coordinator.force_refresh(&cues, &style);
    let state = coordinator.settled().await;
    assert_eq!(service.calls(), 2);
    assert_eq!(state.status, PreviewStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_whileRequestInFlight_shouldAbortIt() {
    let service = MockRenderService::new().with_delay(Duration::from_secs(1));
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let first = style_with_size(40.0);
    let second = style_with_size(60.0);

    coordinator.on_change(&cues, &first);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(coordinator.state().status, PreviewStatus::Loading);

    coordinator.force_refresh(&cues, &second);
    let state = coordinator.settled().await;

    assert_eq!(service.calls(), 2);
    assert_eq!(service.cancellations(), 1);
    assert_eq!(state.status, PreviewStatus::Ready);
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&second).as_str()));
    assert_eq!(state.displayed_key, Some(compute_key(&cues, &second)));
    assert!(!coordinator.cache().contains(&compute_key(&cues, &first)));
}

#[tokio::test(start_paused = true)]
async fn test_force_refresh_withStaleCacheEntry_shouldReplaceIt() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);
    let cues = sample_cues();
    let style = StyleDescriptor::default();
    let key = compute_key(&cues, &style);
    coordinator.cache().put(key.clone(), "stale artifact");

    coordinator.force_refresh(&cues, &style);
    let state = coordinator.settled().await;

    assert_eq!(service.calls(), 1);
    assert_eq!(state.artifact.as_deref(), Some(expected_artifact(&style).as_str()));
    assert_eq!(
        coordinator.cache().get(&key).as_deref(),
        Some(expected_artifact(&style).as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_pending_shouldDropScheduledRender() {
    let service = MockRenderService::new();
    let coordinator = coordinator(&service);

    coordinator.on_change(&sample_cues(), &StyleDescriptor::default());
    coordinator.cancel_pending();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(service.calls(), 0);
    assert_eq!(coordinator.state().status, PreviewStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_shouldObserveStatusTransitions() {
    let service = MockRenderService::new().with_delay(Duration::from_millis(100));
    let coordinator = coordinator(&service);
    let mut receiver = coordinator.subscribe();

    coordinator.on_change(&sample_cues(), &StyleDescriptor::default());
    assert_eq!(receiver.borrow_and_update().status, PreviewStatus::Debouncing);

    receiver.changed().await.unwrap();
    assert_eq!(receiver.borrow_and_update().status, PreviewStatus::Loading);

    receiver.changed().await.unwrap();
    assert_eq!(receiver.borrow_and_update().status, PreviewStatus::Ready);
}
