//! Receipt breakdown for one message (who read it, who received it, ...).
//!
//! Nothing is cached: [`bucketize`] queries live state on every call, and is
//! meant to be re-run whenever a participant state notification arrives for
//! the message on display.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::contacts::{display_name_for, AddressResolver};
use crate::models::{Address, ChatMessage, MessageState, ParticipantImdnState};

/// Per-recipient state query, answered by the delivery layer
pub trait ImdnSource {
    /// Recipients of `message` currently in `state`, in delivery-layer order
    fn participants_by_imdn_state(&self, message: &ChatMessage, state: MessageState) -> Vec<ParticipantImdnState>;
}

/// Answers from the states recorded on the message itself
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalImdn;

impl ImdnSource for LocalImdn {
    fn participants_by_imdn_state(&self, message: &ChatMessage, state: MessageState) -> Vec<ParticipantImdnState> {
        message.participants_by_imdn_state(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptBucket {
    Read,
    DeliveredToUser,
    DeliveredToServer,
    NotDelivered,
}

impl ReceiptBucket {
    /// Buckets in display order
    pub const ALL: [ReceiptBucket; 4] = [
        ReceiptBucket::Read,
        ReceiptBucket::DeliveredToUser,
        ReceiptBucket::DeliveredToServer,
        ReceiptBucket::NotDelivered,
    ];

    /// The participant state that lands in this bucket
    pub fn imdn_state(self) -> MessageState {
        match self {
            ReceiptBucket::Read => MessageState::Displayed,
            ReceiptBucket::DeliveredToUser => MessageState::DeliveredToUser,
            ReceiptBucket::DeliveredToServer => MessageState::Delivered,
            ReceiptBucket::NotDelivered => MessageState::NotDelivered,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantReceipt {
    pub address: Address,
    pub display_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Participants grouped by bucket, each list in delivery-layer order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptBreakdown {
    buckets: [Vec<ParticipantReceipt>; 4],
}

impl ReceiptBreakdown {
    pub fn get(&self, bucket: ReceiptBucket) -> &[ParticipantReceipt] {
        &self.buckets[bucket.slot()]
    }

    /// All four buckets in display order, empty ones included
    pub fn iter(&self) -> impl Iterator<Item = (ReceiptBucket, &[ParticipantReceipt])> {
        ReceiptBucket::ALL
            .into_iter()
            .map(move |bucket| (bucket, self.get(bucket)))
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Query the four receipt states of `message` and resolve participant names.
/// A participant reported by more than one query keeps its first bucket.
pub fn bucketize(
    message: &ChatMessage,
    source: &dyn ImdnSource,
    resolver: &dyn AddressResolver,
) -> ReceiptBreakdown {
    let mut breakdown = ReceiptBreakdown::default();
    let mut seen = HashSet::new();

    for bucket in ReceiptBucket::ALL {
        for participant in source.participants_by_imdn_state(message, bucket.imdn_state()) {
            if !seen.insert(participant.address.weak_key()) {
                warn!(
                    "Participant {} reported in several receipt states for message {}, keeping the first",
                    participant.address,
                    message.id()
                );
                continue;
            }
            breakdown.buckets[bucket.slot()].push(ParticipantReceipt {
                display_name: display_name_for(resolver, &participant.address),
                address: participant.address,
                timestamp: participant.timestamp,
            });
        }
    }

    debug!(
        "Receipts for message {}: {} read, {} delivered, {} sent, {} undelivered",
        message.id(),
        breakdown.get(ReceiptBucket::Read).len(),
        breakdown.get(ReceiptBucket::DeliveredToUser).len(),
        breakdown.get(ReceiptBucket::DeliveredToServer).len(),
        breakdown.get(ReceiptBucket::NotDelivered).len(),
    );
    breakdown
}
