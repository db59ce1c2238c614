// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracked event streams: chunk decoding, event log entries and the stream
//! summary written back onto the parent record.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use scanflow::analysis::{follow_until_terminal, AnalysisBackend, AnalysisOrchestrator, IssuePage, TaskStatus};
use scanflow::error::AnalysisError;
use scanflow::monitor::{CallContext, Monitor, Operation, META_KEY};
use scanflow::stream::{EventPayload, EventTracker, DEFAULT_STREAM_TIMEOUT};
use scanflow::telemetry::CorrelationId;
use scanflow::TtlCache;

/// Run a trivial instrumented call so the returned id has a record.
async fn parent_record(monitor: &Monitor, operation: &str) -> CorrelationId {
    let value: Value = monitor
        .run(&Operation::new(operation), CallContext::new(), (), |_, _| async {
            Ok::<Value, String>(json!({}))
        })
        .await
        .unwrap();
    CorrelationId::from(value[META_KEY]["correlation_id"].as_str().unwrap())
}

fn chunks(parts: Vec<&'static str>) -> impl futures_util::Stream<Item = Result<&'static str, String>> + Send {
    stream::iter(parts.into_iter().map(Ok))
}

// ============================================================================
// In-memory sources
// ============================================================================

#[tokio::test]
async fn test_frames_split_across_chunks() {
    let monitor = Arc::new(Monitor::new());
    let parent = parent_record(&monitor, "sonar.watch").await;
    let tracker = EventTracker::new(Arc::clone(&monitor));

    let source = chunks(vec![
        ": keep-alive\n\n",
        "data: {\"status\":\"QUE",
        "UED\"}\n\ndata: not json\n\n",
        "event: progress\ndata: {\"status\":\"SUCCESS\"}\n\n",
    ]);
    let events: Vec<_> = tracker
        .track(source, parent.clone(), DEFAULT_STREAM_TIMEOUT)
        .collect()
        .await;

    let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();
    assert_eq!(events.len(), 3);
    assert_eq!(events.iter().map(|e| e.sequence).collect::<Vec<_>>(), [1, 2, 3]);
    assert_eq!(events[0].payload, EventPayload::Json(json!({"status": "QUEUED"})));
    assert_eq!(
        events[1].payload,
        EventPayload::Raw {
            raw: "not json".to_string()
        }
    );
    assert_eq!(events[2].payload.status(), Some("SUCCESS"));

    let logged = monitor.events().events_for(&parent);
    assert_eq!(logged.len(), 3);
    let summary = monitor.chain().get(&parent).unwrap().stream.unwrap();
    assert_eq!(summary.events, 3);
    assert!(!summary.timed_out);
}

#[tokio::test]
async fn test_streams_are_logged_per_parent() {
    let monitor = Arc::new(Monitor::new());
    let first = parent_record(&monitor, "sonar.watch").await;
    let second = parent_record(&monitor, "sonar.watch").await;
    let tracker = EventTracker::new(Arc::clone(&monitor));

    let a = tracker.track(chunks(vec!["data: 1\n\ndata: 2\n\n"]), first.clone(), DEFAULT_STREAM_TIMEOUT);
    let b = tracker.track(chunks(vec!["data: 3\n\n"]), second.clone(), DEFAULT_STREAM_TIMEOUT);
    let (a, b) = tokio::join!(a.collect::<Vec<_>>(), b.collect::<Vec<_>>());
    assert_eq!(a.len(), 2);
    assert_eq!(b.len(), 1);

    let summary = monitor.events().summary(10);
    assert_eq!(summary.total_events, 3);
    assert_eq!(summary.streams, 2);
    assert_eq!(summary.events_by_stream[first.as_str()], 2);
    assert_eq!(summary.events_by_stream[second.as_str()], 1);
    assert_eq!(monitor.events().events_for(&second)[0].sequence, 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_source_times_out() {
    let monitor = Arc::new(Monitor::new());
    let parent = parent_record(&monitor, "sonar.watch").await;
    let tracker = EventTracker::new(Arc::clone(&monitor));

    let source = chunks(vec!["data: {\"status\":\"IN_PROGRESS\"}\n\n"]).chain(stream::pending::<Result<&'static str, String>>());
    let events: Vec<_> = tracker
        .track(source, parent.clone(), Duration::from_secs(5))
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    let summary = monitor.chain().get(&parent).unwrap().stream.unwrap();
    assert!(summary.timed_out);
    assert_eq!(summary.events, 1);
}

#[tokio::test]
async fn test_follow_stops_at_terminal_status() {
    let monitor = Arc::new(Monitor::new());
    let parent = parent_record(&monitor, "sonar.watch").await;
    let tracker = EventTracker::new(Arc::clone(&monitor));

    let source = chunks(vec![
        "data: {\"status\":\"PENDING\"}\n\n",
        "data: {\"status\":\"IN_PROGRESS\"}\n\n",
        "data: {\"status\":\"SUCCESS\"}\n\n",
        "data: {\"status\":\"IGNORED\"}\n\n",
    ]);
    let outcome = follow_until_terminal(tracker.track(source, parent.clone(), DEFAULT_STREAM_TIMEOUT))
        .await
        .unwrap();

    assert_eq!(outcome.events, 3);
    assert_eq!(outcome.final_status, Some(TaskStatus::Success));
    assert_eq!(monitor.chain().get(&parent).unwrap().stream.unwrap().events, 3);
}

// ============================================================================
// Over HTTP
// ============================================================================

/// Serve one SSE response with `body` on an ephemeral port.
async fn serve_once(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await;
        let head = format!(
            "{status_line}\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n"
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(body.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    format!("http://{addr}/api/ce/task/AY-1/events")
}

struct StreamOnlyBackend {
    url: String,
}

#[async_trait]
impl AnalysisBackend for StreamOnlyBackend {
    async fn run_scanner(&self, _project_key: &str, _workdir: &Path) -> Result<Option<String>, AnalysisError> {
        Ok(None)
    }

    async fn task_status(&self, _task_id: &str) -> Result<TaskStatus, AnalysisError> {
        Ok(TaskStatus::Pending)
    }

    async fn issues_page(&self, _project_key: &str, _page: u32, _page_size: u32) -> Result<IssuePage, AnalysisError> {
        Ok(IssuePage::default())
    }

    async fn quality_gate(&self, _project_key: &str) -> Result<Value, AnalysisError> {
        Ok(json!({}))
    }

    fn task_events_url(&self, _task_id: &str) -> String {
        self.url.clone()
    }

    fn stream_token(&self) -> Option<String> {
        Some("squ_token".to_string())
    }
}

#[tokio::test]
async fn test_watch_follows_remote_stream() {
    let url = serve_once(
        "HTTP/1.1 200 OK",
        "data: {\"status\":\"IN_PROGRESS\"}\n\ndata: {\"status\":\"SUCCESS\"}\n\n",
    )
    .await;
    let monitor = Arc::new(Monitor::new());
    let parent = parent_record(&monitor, "sonar.scan").await;
    let orchestrator = AnalysisOrchestrator::new(Arc::clone(&monitor), Arc::new(TtlCache::new()))
        .with_backend(Arc::new(StreamOnlyBackend { url }))
        .with_stream_timeout(Duration::from_secs(5));
    monitor
        .events()
        .append_marker(&parent, json!({"event": "STARTED", "task_id": "AY-1"}));

    let outcome = orchestrator.watch("AY-1", parent.clone()).await.unwrap();

    assert_eq!(outcome.events, 2);
    assert_eq!(outcome.final_status, Some(TaskStatus::Success));
    let sequences: Vec<u64> = monitor.events().events_for(&parent).iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert!(monitor.chain().get(&parent).unwrap().stream.is_some());
}

#[tokio::test]
async fn test_rejected_stream_still_finalizes_parent() {
    let url = serve_once("HTTP/1.1 401 Unauthorized", "").await;
    let monitor = Arc::new(Monitor::new());
    let parent = parent_record(&monitor, "sonar.scan").await;
    let tracker = EventTracker::new(Arc::clone(&monitor));

    let events: Vec<_> = tracker
        .connect(&reqwest::Client::new(), &url, None, parent.clone(), Duration::from_secs(5))
        .await
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert!(events[0].as_ref().unwrap_err().to_string().contains("401"));
    let summary = monitor.chain().get(&parent).unwrap().stream.unwrap();
    assert_eq!(summary.events, 0);
    assert!(monitor.events().events_for(&parent).is_empty());
}
