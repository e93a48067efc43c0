//! Full-engine tests: monitor → pipeline → store → command surface,
//! plus the retention and re-embedding hooks.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{capabilities, test_config, MockModel, ScriptedClipboard};
use sage::{ClipSage, ClipboardApi, WindowDelegate};
use tempfile::TempDir;

struct HideFlag(AtomicBool);

impl WindowDelegate for HideFlag {
    fn hide(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn open_service(model: &Arc<MockModel>) -> (TempDir, Arc<ClipSage>) {
    common::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let service = ClipSage::open(
        dir.path().join("clips.db"),
        capabilities(model),
        test_config(),
    )
    .unwrap();
    (dir, service)
}

/// Poll until the engine has committed `expected` clips or the deadline hits.
async fn wait_for_clips(service: &ClipSage, expected: usize) {
    for _ in 0..100 {
        let clips = service.get_recent_clips().await.unwrap();
        if clips.len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("engine never committed {expected} clips");
}

#[tokio::test]
async fn end_to_end_capture_to_search() {
    let model = MockModel::new();
    let (_dir, service) = open_service(&model);

    service
        .spawn_with_source(ScriptedClipboard::new(&[
            "The quick brown fox jumps over the lazy dog",
            "second clipboard payload",
        ]))
        .unwrap();
    wait_for_clips(&service, 2).await;

    let recent = service.get_recent_clips().await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].content, "second clipboard payload");
    assert!(!recent[0].summary.is_empty());

    let hits = service.search_clips("quick".to_string()).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "The quick brown fox jumps over the lazy dog");

    assert!(service.search_clips("zebra".to_string()).await.unwrap().is_empty());

    // Empty query is the recent list
    let empty = service.search_clips(String::new()).await.unwrap();
    assert_eq!(empty, recent);

    service.shutdown().await;
}

#[tokio::test]
async fn repeated_clipboard_content_is_captured_once() {
    let model = MockModel::new();
    let (_dir, service) = open_service(&model);

    service
        .spawn_with_source(ScriptedClipboard::new(&[
            "same text here",
            "same text here",
            "same text here",
        ]))
        .unwrap();
    wait_for_clips(&service, 1).await;
    // Give the remaining polls time to (not) produce duplicates
    tokio::time::sleep(Duration::from_millis(100)).await;

    let recent = service.get_recent_clips().await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].content, "same text here");

    service.shutdown().await;
}

#[tokio::test]
async fn hide_window_reaches_the_delegate_and_never_fails() {
    let model = MockModel::new();
    let (_dir, service) = open_service(&model);

    // No delegate registered: still a no-op success
    service.hide_window().await;

    let flag = Arc::new(HideFlag(AtomicBool::new(false)));
    service.set_window_delegate(flag.clone());
    service.hide_window().await;
    assert!(flag.0.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_stops_capturing() {
    let model = MockModel::new();
    let (_dir, service) = open_service(&model);

    service
        .spawn_with_source(ScriptedClipboard::new(&["captured before shutdown"]))
        .unwrap();
    wait_for_clips(&service, 1).await;
    service.shutdown().await;

    let recent = service.get_recent_clips().await.unwrap();
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn reembed_fills_only_missing_vectors() {
    let model = MockModel::new();
    let (_dir, service) = open_service(&model);

    // Capture while the embedder is down
    model.set_fail(true);
    service
        .spawn_with_source(ScriptedClipboard::new(&["needs a vector later"]))
        .unwrap();
    wait_for_clips(&service, 1).await;
    service.shutdown().await;

    // Capability comes back; the pass fills the gap and records the version
    model.set_fail(false);
    assert_eq!(service.reembed_missing(10).await.unwrap(), 1);
    // Nothing left pending on a second pass
    assert_eq!(service.reembed_missing(10).await.unwrap(), 0);
}

#[tokio::test]
async fn purge_and_clear_remove_history() {
    let model = MockModel::new();
    let (_dir, service) = open_service(&model);

    service
        .spawn_with_source(ScriptedClipboard::new(&[
            "first history entry",
            "second history entry",
        ]))
        .unwrap();
    wait_for_clips(&service, 2).await;
    service.shutdown().await;

    // Everything is older than a future cutoff
    let removed = service
        .purge_older_than(chrono::Utc::now() + chrono::Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(service.get_recent_clips().await.unwrap().is_empty());
    assert!(service
        .search_clips("history".to_string())
        .await
        .unwrap()
        .is_empty());

    service.clear_history().await.unwrap();
}
