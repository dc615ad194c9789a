//! Duplicate suppression tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use meshlink_commands::{
    CommandKind, CommandParams, CommandProcessor, DispatchConfig, Dispatcher, MockTransport,
};

const NODE: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

fn message(text: &str) -> CommandParams {
    serde_json::from_value(json!({ "destination": NODE, "text": text })).unwrap()
}

fn unlimited() -> DispatchConfig {
    DispatchConfig {
        rate_limit_enabled: false,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_duplicates_share_one_execution() {
    let dispatcher = Dispatcher::new(unlimited());
    let mock = Arc::new(MockTransport::new());

    let first = dispatcher
        .enqueue(CommandKind::SendMessage, message("hello"))
        .unwrap();
    let second = dispatcher
        .enqueue(CommandKind::SendMessage, message("hello"))
        .unwrap();

    assert!(!first.queue_info.debounced);
    assert!(second.queue_info.debounced);
    assert!(second.success);
    assert_eq!(second.message, "Command already queued (pending execution)");
    assert_eq!(second.queue_info.position, 0);
    assert!(first.queue_info.original_submission_time.is_none());
    assert!(second.queue_info.original_submission_time.is_some());
    assert_eq!(dispatcher.queue_len(), 1);

    let processor = CommandProcessor::new(dispatcher.clone(), mock.clone());
    processor.start().await;

    let a = first.watcher.wait().await;
    let b = second.watcher.wait().await;
    assert!(a.success);
    assert_eq!(a, b);
    assert_eq!(b.request_id, first.request_id);
    assert_eq!(mock.executed_count(), 1);

    // Within the window the settled outcome is replayed.
    let third = dispatcher
        .enqueue(CommandKind::SendMessage, message("hello"))
        .unwrap();
    assert!(third.queue_info.debounced);
    assert_eq!(third.outcome, Some(a));

    let stats = dispatcher.stats();
    assert_eq!(stats.commands_debounced_total, 2);
    assert_eq!(stats.commands_processed_total, 1);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_resubmission_after_window_is_new() {
    let dispatcher = Dispatcher::new(unlimited());

    let first = dispatcher
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    let second = dispatcher
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();

    assert!(!second.queue_info.debounced);
    assert_ne!(first.request_id, second.request_id);
    assert_eq!(dispatcher.queue_len(), 2);
}

#[tokio::test]
async fn test_time_varying_kinds_never_merge() {
    let dispatcher = Dispatcher::new(unlimited());
    let ping: CommandParams = serde_json::from_value(json!({ "destination": NODE })).unwrap();

    let a = dispatcher.enqueue(CommandKind::Ping, ping.clone()).unwrap();
    let b = dispatcher.enqueue(CommandKind::Ping, ping).unwrap();

    assert!(!a.queue_info.debounced);
    assert!(!b.queue_info.debounced);
    assert_eq!(dispatcher.queue_len(), 2);
    assert_eq!(dispatcher.stats().debounce_cache_size, 0);
}

#[tokio::test]
async fn test_debounce_disabled() {
    let dispatcher = Dispatcher::new(DispatchConfig {
        debounce_enabled: false,
        ..unlimited()
    });

    dispatcher
        .enqueue(CommandKind::SendMessage, message("hi"))
        .unwrap();
    let again = dispatcher
        .enqueue(CommandKind::SendMessage, message("hi"))
        .unwrap();
    assert!(!again.queue_info.debounced);
    assert_eq!(dispatcher.queue_len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_while_executing() {
    let dispatcher = Dispatcher::new(unlimited());
    let mock = Arc::new(MockTransport::new().with_latency(Duration::from_secs(5)));
    let processor = CommandProcessor::new(dispatcher.clone(), mock.clone());

    let first = dispatcher
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();
    processor.start().await;

    // Let the worker pick it up; the transport is still busy.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(dispatcher.queue_len(), 0);

    let late = dispatcher
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();
    assert!(late.queue_info.debounced);
    assert_eq!(late.queue_info.position, 0);
    assert!(late.outcome.is_none());

    let a = first.watcher.wait().await;
    let b = late.watcher.wait().await;
    assert_eq!(a, b);
    assert_eq!(mock.executed_count(), 1);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_purges_expired_records() {
    let dispatcher = Dispatcher::new(unlimited());
    let processor = CommandProcessor::new(dispatcher.clone(), Arc::new(MockTransport::new()));
    processor.start().await;

    dispatcher
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();
    assert_eq!(dispatcher.stats().debounce_cache_size, 1);

    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(dispatcher.stats().debounce_cache_size, 0);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_oversized_window_does_not_panic() {
    let config = DispatchConfig {
        debounce_window_seconds: 1e19,
        ..unlimited()
    };
    assert!(config.validate().is_err());

    let dispatcher = Dispatcher::new(config);
    let mock = Arc::new(MockTransport::new());
    let processor = CommandProcessor::new(dispatcher.clone(), mock.clone());

    let first = dispatcher
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();
    let second = dispatcher
        .enqueue(CommandKind::SendAdvert, CommandParams::new())
        .unwrap();
    assert!(second.queue_info.debounced);

    processor.start().await;
    assert!(first.watcher.wait().await.success);
    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert_eq!(dispatcher.stats().debounce_cache_size, 1);
    assert_eq!(mock.executed_count(), 1);

    processor.stop().await;
}
