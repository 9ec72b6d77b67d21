// Common test utilities for integration tests
#![allow(dead_code)]

use std::sync::Once;

use chrono::{DateTime, Duration, Utc};
use futures::{FutureExt, StreamExt};
use log::LevelFilter;
use tokio_stream::wrappers::UnboundedReceiverStream;

use chatline::{Address, ChatMessage, Direction, EventKind, EventLog, MessageState, TimelineChange};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

pub fn addr(user: &str) -> Address {
    format!("sip:{}@example.org", user)
        .parse()
        .expect("valid test address")
}

pub fn outgoing(user: &str, text: &str) -> EventLog {
    EventLog::message(ChatMessage::new(addr(user), Direction::Outgoing).with_text(text))
}

pub fn incoming(user: &str, text: &str) -> EventLog {
    EventLog::message(ChatMessage::new(addr(user), Direction::Incoming).with_text(text))
}

pub fn subject_changed(subject: &str) -> EventLog {
    EventLog::conference(EventKind::SubjectChanged, None, Some(subject.to_string()))
        .expect("conference event")
}

pub fn participant_event(kind: EventKind, user: &str) -> EventLog {
    EventLog::conference(kind, Some(addr(user)), None).expect("conference event")
}

/// Fixed base time so receipt tests are reproducible
pub fn at_minute(minute: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("valid timestamp") + Duration::minutes(minute)
}

/// Outgoing group message with the given recipient states, in that order
pub fn group_message(recipients: &[(&str, MessageState)]) -> ChatMessage {
    recipients
        .iter()
        .enumerate()
        .fold(
            ChatMessage::new(addr("me"), Direction::Outgoing).with_text("group hello"),
            |message, (i, (user, state))| message.with_participant_state(addr(user), *state, at_minute(i as i64)),
        )
}

/// Text of the message at each display row, "-" for non-message rows
pub fn texts(timeline: &chatline::Timeline) -> Vec<String> {
    timeline
        .iter()
        .map(|event| {
            event
                .chat_message()
                .and_then(|m| m.text())
                .unwrap_or("-")
                .to_string()
        })
        .collect()
}

/// Everything currently queued on a change stream
pub fn drain_changes(changes: &mut UnboundedReceiverStream<TimelineChange>) -> Vec<TimelineChange> {
    let mut drained = Vec::new();
    while let Some(Some(change)) = changes.next().now_or_never() {
        drained.push(change);
    }
    drained
}
