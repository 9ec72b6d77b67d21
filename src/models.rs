use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::Subscription;
use crate::error::{Result, TimelineError};

// `"Display Name" <uri>` or `Display Name <uri>`
static NAME_ADDR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:"([^"]*)"|([^<"]*?))\s*<([^>]+)>$"#).expect("valid name-addr regex")
});

// scheme:user@host:port;param=value;flag
static URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):(?:([^@;:]+)@)?([^:;@<>\s]+)(?::(\d+))?((?:;[^;]*)*)$")
        .expect("valid uri regex")
});

/// Participant identity, e.g. `"Alice" <sip:alice@example.org;transport=tls>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    display_name: Option<String>,
    scheme: String,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    params: Vec<(String, Option<String>)>,
}

impl Address {
    /// Compare identities while ignoring the display name and transport parameters
    pub fn weak_equal(&self, other: &Address) -> bool {
        self.scheme.eq_ignore_ascii_case(&other.scheme)
            && self.user == other.user
            && self.host.eq_ignore_ascii_case(&other.host)
            && self.port == other.port
    }

    /// Normalized key matching `weak_equal`: two addresses share a key iff they are weakly equal
    pub fn weak_key(&self) -> String {
        let mut key = self.uri_only();
        key.make_ascii_lowercase();
        // User parts are case sensitive, so restore them after lowercasing
        if let Some(user) = &self.user {
            let prefix = self.scheme.len() + 1;
            key.replace_range(prefix..prefix + user.len(), user);
        }
        key
    }

    /// The URI without display name or parameters
    pub fn uri_only(&self) -> String {
        let mut uri = format!("{}:", self.scheme);
        if let Some(user) = &self.user {
            uri.push_str(user);
            uri.push('@');
        }
        uri.push_str(&self.host);
        if let Some(port) = self.port {
            uri.push_str(&format!(":{}", port));
        }
        uri
    }

    /// Display name when present, the user part otherwise, the host as last resort
    pub fn display_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.user.clone())
            .unwrap_or_else(|| self.host.clone())
    }

    pub fn explicit_display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }
}

impl FromStr for Address {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = || TimelineError::InvalidAddress(s.to_string());

        let (display_name, uri) = match NAME_ADDR_RE.captures(trimmed) {
            Some(caps) => {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|name| !name.is_empty());
                (name, caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default())
            }
            None => (None, trimmed),
        };

        let caps = URI_RE.captures(uri).ok_or_else(invalid)?;
        let port = match caps.get(4) {
            Some(m) => Some(m.as_str().parse::<u16>().map_err(|_| invalid())?),
            None => None,
        };
        let params = caps
            .get(5)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split(';')
            .filter(|param| !param.is_empty())
            .map(|param| match param.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (param.to_string(), None),
            })
            .collect();

        Ok(Address {
            display_name,
            scheme: caps[1].to_string(),
            user: caps.get(2).map(|m| m.as_str().to_string()),
            host: caps[3].to_string(),
            port,
            params,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut uri = self.uri_only();
        for (key, value) in &self.params {
            uri.push(';');
            uri.push_str(key);
            if let Some(value) = value {
                uri.push('=');
                uri.push_str(value);
            }
        }
        match &self.display_name {
            Some(name) => write!(f, "\"{}\" <{}>", name, uri),
            None => write!(f, "{}", uri),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = TimelineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Identifier of a chat message, stable across delivery notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MessageId {
    fn from(id: Uuid) -> Self {
        MessageId(id)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(MessageId(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Delivery state of a message, also used per participant for IMDN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    #[default]
    Idle,
    InProgress,
    Delivered,       // Reached the server
    NotDelivered,
    FileTransferInProgress,
    FileTransferError,
    FileTransferDone,
    Displayed,       // Read by the recipient
    DeliveredToUser, // Reached the recipient's device
}

/// State of one recipient of a group message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantImdnState {
    pub address: Address,
    pub state: MessageState,
    pub timestamp: DateTime<Utc>,
}

/// Chat message entity. Identity and sender are fixed; delivery data changes over time.
#[derive(Debug)]
pub struct ChatMessage {
    id: MessageId,
    from: Address,
    direction: Direction,
    text: Option<String>,
    state: MessageState,
    participant_states: Vec<ParticipantImdnState>,
    transfer_progress: Option<(u64, u64)>,
    listener: Option<Subscription>,
}

impl ChatMessage {
    pub fn new(from: Address, direction: Direction) -> Self {
        ChatMessage {
            id: MessageId::new(),
            from,
            direction,
            text: None,
            state: MessageState::Idle,
            participant_states: Vec::new(),
            transfer_progress: None,
            listener: None,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_state(mut self, state: MessageState) -> Self {
        self.state = state;
        self
    }

    pub fn with_participant_state(mut self, address: Address, state: MessageState, timestamp: DateTime<Utc>) -> Self {
        self.update_participant_state(address, state, timestamp);
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn from_address(&self) -> &Address {
        &self.from
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    pub fn set_state(&mut self, state: MessageState) {
        self.state = state;
    }

    pub fn transfer_progress(&self) -> Option<(u64, u64)> {
        self.transfer_progress
    }

    pub fn set_transfer_progress(&mut self, offset: u64, total: u64) {
        self.transfer_progress = Some((offset, total));
    }

    pub fn participant_states(&self) -> &[ParticipantImdnState] {
        &self.participant_states
    }

    /// Record a recipient's new state, keeping the recipient's original position
    pub fn update_participant_state(&mut self, address: Address, state: MessageState, timestamp: DateTime<Utc>) {
        match self
            .participant_states
            .iter_mut()
            .find(|p| p.address.weak_equal(&address))
        {
            Some(existing) => {
                existing.state = state;
                existing.timestamp = timestamp;
            }
            None => self.participant_states.push(ParticipantImdnState { address, state, timestamp }),
        }
    }

    /// Recipients currently in `state`, in recorded order
    pub fn participants_by_imdn_state(&self, state: MessageState) -> Vec<ParticipantImdnState> {
        self.participant_states
            .iter()
            .filter(|p| p.state == state)
            .cloned()
            .collect()
    }

    /// Replace the live subscription. The previous one is released first.
    pub fn set_listener(&mut self, listener: Option<Subscription>) {
        if let Some(previous) = self.listener.take() {
            previous.release();
        }
        self.listener = listener;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }
}

/// Kind of a timeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    ConferenceCreated,
    ConferenceTerminated,
    ParticipantAdded,
    ParticipantRemoved,
    SubjectChanged,
    AdminSet,
    AdminUnset,
    DeviceAdded,
    DeviceRemoved,
    SecurityEvent,
    None,
}

#[derive(Debug)]
enum EventBody {
    Message(ChatMessage),
    Conference {
        participant: Option<Address>,
        subject: Option<String>,
        detail: Option<String>,
    },
}

/// One timeline entry. The kind never changes after construction.
#[derive(Debug)]
pub struct EventLog {
    id: Uuid,
    kind: EventKind,
    timestamp: DateTime<Utc>,
    body: EventBody,
}

impl EventLog {
    pub fn message(message: ChatMessage) -> Self {
        EventLog {
            id: Uuid::new_v4(),
            kind: EventKind::Message,
            timestamp: Utc::now(),
            body: EventBody::Message(message),
        }
    }

    /// Build a conference lifecycle event. Fails for `EventKind::Message`.
    pub fn conference(kind: EventKind, participant: Option<Address>, subject: Option<String>) -> Result<Self> {
        if kind == EventKind::Message {
            return Err(TimelineError::MissingMessage(kind));
        }
        Ok(EventLog {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            body: EventBody::Conference { participant, subject, detail: None },
        })
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach a free-form detail, shown for security events
    pub fn with_detail(mut self, text: impl Into<String>) -> Self {
        if let EventBody::Conference { detail, .. } = &mut self.body {
            *detail = Some(text.into());
        }
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_message(&self) -> bool {
        self.kind == EventKind::Message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn chat_message(&self) -> Option<&ChatMessage> {
        match &self.body {
            EventBody::Message(message) => Some(message),
            EventBody::Conference { .. } => None,
        }
    }

    pub fn chat_message_mut(&mut self) -> Option<&mut ChatMessage> {
        match &mut self.body {
            EventBody::Message(message) => Some(message),
            EventBody::Conference { .. } => None,
        }
    }

    pub fn participant_address(&self) -> Option<&Address> {
        match &self.body {
            EventBody::Conference { participant, .. } => participant.as_ref(),
            EventBody::Message(_) => None,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match &self.body {
            EventBody::Conference { subject, .. } => subject.as_deref(),
            EventBody::Message(_) => None,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match &self.body {
            EventBody::Conference { detail, .. } => detail.as_deref(),
            EventBody::Message(_) => None,
        }
    }
}
