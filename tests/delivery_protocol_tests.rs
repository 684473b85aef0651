mod common;

use common::{Reply, ScriptedDelivery};
use logship::shipper::{BatchPublisher, EventBuffer, LossReason, PublishOutcome};
use logship::{DestinationIdentity, LogEvent};
use std::sync::Arc;

fn buffer_with(n: usize) -> Arc<EventBuffer> {
    let buffer = Arc::new(EventBuffer::unbounded());
    for i in 0..n {
        assert!(buffer.try_enqueue(LogEvent::new(format!("event {}", i), 1_000 + i as i64)));
    }
    buffer
}

fn publisher(
    buffer: &Arc<EventBuffer>,
    adapter: &Arc<ScriptedDelivery>,
    token: Option<&str>,
) -> BatchPublisher {
    BatchPublisher::new(
        Arc::clone(buffer),
        adapter.clone(),
        DestinationIdentity::new("orders", "api-1"),
        token.map(str::to_string),
        50,
    )
}

#[tokio::test]
async fn test_one_conflict_then_success() {
    let adapter = Arc::new(ScriptedDelivery::new(
        vec![Reply::conflict("T2")],
        Reply::accept("T3"),
    ));
    let buffer = buffer_with(5);
    let mut publisher = publisher(&buffer, &adapter, Some("T1"));

    let outcome = publisher.publish().await;

    assert_eq!(
        outcome,
        PublishOutcome::Delivered {
            events: 5,
            attempts: 2
        }
    );
    assert_eq!(adapter.call_count(), 2);
    assert_eq!(publisher.sequence_token(), Some("T3"));

    let calls = adapter.calls();
    assert_eq!(calls[0].token.as_deref(), Some("T1"));
    assert_eq!(calls[1].token.as_deref(), Some("T2"));
    assert_eq!(calls[1].destination, DestinationIdentity::new("orders", "api-1"));
}

#[tokio::test]
async fn test_conflict_forever_abandons_after_budget() {
    let adapter = Arc::new(ScriptedDelivery::new(
        vec![Reply::conflict("E1"), Reply::conflict("E2")],
        Reply::conflict("E-final"),
    ));
    let buffer = buffer_with(3);
    let mut publisher = publisher(&buffer, &adapter, None);

    let outcome = publisher.publish().await;

    assert_eq!(
        outcome,
        PublishOutcome::Lost {
            events: 3,
            attempts: 10,
            reason: LossReason::RetriesExhausted
        }
    );
    assert_eq!(adapter.call_count(), 10);
    assert_eq!(publisher.sequence_token(), Some("E-final"));
    assert!(buffer.is_empty());
}

#[tokio::test]
async fn test_lost_batch_does_not_block_next_batch() {
    let adapter = Arc::new(ScriptedDelivery::new(
        vec![Reply::Fail],
        Reply::accept("next"),
    ));
    let buffer = buffer_with(2);
    let mut publisher = publisher(&buffer, &adapter, Some("T1"));

    let first = publisher.publish().await;
    assert!(matches!(
        first,
        PublishOutcome::Lost {
            attempts: 1,
            reason: LossReason::Transport(_),
            ..
        }
    ));

    buffer.try_enqueue(LogEvent::new("later", 5_000));
    let second = publisher.publish().await;

    assert_eq!(
        second,
        PublishOutcome::Delivered {
            events: 1,
            attempts: 1
        }
    );
    let calls = adapter.calls();
    assert_eq!(calls.len(), 2);
    // The failed batch was not re-queued in front of the new event
    assert_eq!(calls[1].events, vec![LogEvent::new("later", 5_000)]);
    assert_eq!(calls[1].token.as_deref(), Some("T1"));
}

#[tokio::test]
async fn test_empty_publish_is_idempotent() {
    let adapter = Arc::new(ScriptedDelivery::always(Reply::accept("unused")));
    let buffer = buffer_with(0);
    let mut publisher = publisher(&buffer, &adapter, Some("keep-me"));

    for _ in 0..3 {
        assert_eq!(publisher.publish().await, PublishOutcome::Empty);
    }

    assert_eq!(adapter.call_count(), 0);
    assert_eq!(publisher.sequence_token(), Some("keep-me"));
}

#[tokio::test]
async fn test_batches_preserve_fifo_across_drains() {
    let adapter = Arc::new(ScriptedDelivery::always(Reply::Accept(None)));
    let buffer = buffer_with(120);
    let mut publisher = publisher(&buffer, &adapter, None);

    while publisher.publish().await != PublishOutcome::Empty {}

    let delivered: Vec<i64> = adapter
        .calls()
        .iter()
        .flat_map(|c| c.events.iter().map(|e| e.timestamp))
        .collect();
    assert_eq!(delivered, (1_000..1_120).collect::<Vec<_>>());

    let sizes: Vec<usize> = adapter.calls().iter().map(|c| c.events.len()).collect();
    assert_eq!(sizes, vec![50, 50, 20]);
}

#[tokio::test]
async fn test_null_next_token_is_stored() {
    let adapter = Arc::new(ScriptedDelivery::always(Reply::Accept(None)));
    let buffer = buffer_with(1);
    let mut publisher = publisher(&buffer, &adapter, Some("T1"));

    publisher.publish().await;

    assert_eq!(publisher.sequence_token(), None);
}
