//! Integration tests for the integration event log and activity summary.

use anyhow::Result;
use integrations::models::integration_event::{EventDirection, EventStatus};
use integrations::repositories::integration_event::EventFilter;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::setup_services;

#[tokio::test]
async fn recorded_events_list_newest_first_with_filters() -> Result<()> {
    let services = setup_services().await?;
    let user_id = Uuid::new_v4();
    let other_user = Uuid::new_v4();

    for (event_type, status) in [
        ("sync.started", EventStatus::Pending),
        ("sync.completed", EventStatus::Success),
        ("sync.completed", EventStatus::Failed),
    ] {
        services
            .events
            .record(
                user_id,
                Some("github".to_string()),
                event_type.to_string(),
                EventDirection::Outbound,
                status,
                None,
                None,
            )
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }
    services
        .events
        .record(
            other_user,
            None,
            "sync.completed".to_string(),
            EventDirection::Inbound,
            EventStatus::Success,
            None,
            None,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let all = services
        .events
        .list(
            EventFilter {
                user_id: Some(user_id),
                ..Default::default()
            },
            100,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(all.len(), 3);

    let failures = services
        .events
        .list(
            EventFilter {
                user_id: Some(user_id),
                event_type: Some("sync.completed".to_string()),
                status: Some(EventStatus::Failed),
                ..Default::default()
            },
            100,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(failures.len(), 1);

    Ok(())
}

#[tokio::test]
async fn empty_event_type_is_rejected() -> Result<()> {
    let services = setup_services().await?;

    let result = services
        .events
        .record(
            Uuid::new_v4(),
            None,
            "   ".to_string(),
            EventDirection::Outbound,
            EventStatus::Success,
            None,
            None,
        )
        .await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn activity_summary_reports_trailing_window() -> Result<()> {
    let services = setup_services().await?;
    let user_id = Uuid::new_v4();

    // Idle log reports a perfect success rate.
    let idle = services
        .events
        .activity_summary()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(idle.successes, 0);
    assert_eq!(idle.success_rate, 1.0);

    for status in [
        EventStatus::Success,
        EventStatus::Success,
        EventStatus::Success,
        EventStatus::Failed,
        EventStatus::Pending,
    ] {
        services
            .events
            .record(
                user_id,
                None,
                "sync.completed".to_string(),
                EventDirection::Outbound,
                status,
                None,
                None,
            )
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }

    let summary = services
        .events
        .activity_summary()
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(summary.window_hours, 24);
    assert_eq!(summary.successes, 3);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.pending, 1);
    assert!((summary.success_rate - 0.75).abs() < f64::EPSILON);

    Ok(())
}
