use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use chatline::{
    Address, ChatMessage, ContactBook, DeliveryNotification, Direction, EventKind, EventLog,
    MessageId, MessageState, ParticipantImdnState,
};

/// Conversation dump read by the command line tool
#[derive(Debug, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub contacts: Vec<ContactEntry>,
    /// Oldest first, as the session layer returns history
    pub history: Vec<TranscriptEvent>,
    /// Replayed through the delivery hub after the history is loaded
    #[serde(default)]
    pub notifications: Vec<DeliveryNotification>,
}

#[derive(Debug, Deserialize)]
pub struct ContactEntry {
    pub address: Address,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptEvent {
    kind: EventKind,
    id: Option<Uuid>,
    timestamp: Option<DateTime<Utc>>,
    // Message fields
    from: Option<Address>,
    direction: Option<Direction>,
    text: Option<String>,
    #[serde(default)]
    state: MessageState,
    #[serde(default)]
    participants: Vec<ParticipantImdnState>,
    // Conference event fields
    participant: Option<Address>,
    subject: Option<String>,
    detail: Option<String>,
}

impl TranscriptEvent {
    pub fn into_event(self) -> Result<EventLog> {
        let mut event = if self.kind == EventKind::Message {
            let from = self
                .from
                .ok_or_else(|| anyhow!("Message entry is missing 'from'"))?;
            let mut message = ChatMessage::new(from, self.direction.unwrap_or(Direction::Incoming))
                .with_state(self.state);
            if let Some(id) = self.id {
                message = message.with_id(MessageId::from(id));
            }
            if let Some(text) = self.text {
                message = message.with_text(text);
            }
            for participant in self.participants {
                message = message.with_participant_state(participant.address, participant.state, participant.timestamp);
            }
            EventLog::message(message)
        } else {
            let mut event = EventLog::conference(self.kind, self.participant, self.subject)?;
            if let Some(detail) = self.detail {
                event = event.with_detail(detail);
            }
            if let Some(id) = self.id {
                event = event.with_id(id);
            }
            event
        };
        if let Some(timestamp) = self.timestamp {
            event = event.with_timestamp(timestamp);
        }
        Ok(event)
    }
}

impl Transcript {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read transcript {}: {}", path.display(), e))?;
        let transcript: Transcript = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse transcript {}: {}", path.display(), e))?;
        info!(
            "Loaded transcript {} ({} events, {} notifications)",
            path.display(),
            transcript.history.len(),
            transcript.notifications.len()
        );
        Ok(transcript)
    }
}

pub fn contact_book(contacts: &[ContactEntry]) -> ContactBook {
    let mut book = ContactBook::new();
    for contact in contacts {
        book.insert(&contact.address, contact.name.clone());
    }
    book
}

pub fn history_events(history: Vec<TranscriptEvent>) -> Result<Vec<EventLog>> {
    history.into_iter().map(TranscriptEvent::into_event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcript() {
        let json = r#"{
            "contacts": [{ "address": "sip:bob@example.org", "name": "Bob Builder" }],
            "history": [
                { "kind": "conference_created" },
                { "kind": "message", "from": "sip:bob@example.org", "text": "hi" },
                { "kind": "subject_changed", "subject": "Planning" }
            ]
        }"#;
        let transcript: Transcript = serde_json::from_str(json).unwrap();
        assert_eq!(contact_book(&transcript.contacts).len(), 1);

        let events = history_events(transcript.history).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].chat_message().unwrap().text(), Some("hi"));
        assert_eq!(events[1].chat_message().unwrap().direction(), Direction::Incoming);
        assert_eq!(events[2].subject(), Some("Planning"));
    }

    #[test]
    fn test_message_without_sender_is_rejected() {
        let json = r#"{ "history": [{ "kind": "message", "text": "orphan" }] }"#;
        let transcript: Transcript = serde_json::from_str(json).unwrap();
        assert!(history_events(transcript.history).is_err());
    }
}
