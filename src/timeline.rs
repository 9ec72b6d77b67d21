//! Ordered event history of one conversation.
//!
//! Entries are stored newest-first: display index 0 is the most recent event
//! and the chronologically previous event of row `i` is row `i + 1`. Use
//! [`Timeline::chronological_previous`] and [`Timeline::chronological_next`]
//! rather than doing the index arithmetic at call sites.
//!
//! The timeline has a single writer: every mutation takes `&mut self`, so the
//! timeline may move between threads but is never mutated from two at once.
//! Delivery notifications from other threads go through the [`DeliveryHub`]
//! and are applied here with [`Timeline::pump`].
//!
//! A message id is listed at most once; later duplicates are dropped on insertion.

use std::collections::{BTreeSet, HashSet};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::delivery::{DeliveryHub, DeliveryNotification, NotificationPump};
use crate::error::{Result, TimelineError};
use crate::models::{EventLog, MessageId};

/// Row-level delta reported to observers after each mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineChange {
    /// `count` rows inserted starting at `start`
    Inserted { start: usize, count: usize },
    /// The row at `index` was removed; later rows shifted up by one
    Removed { index: usize },
    /// The row at `index` must be rebound (content or neighbors changed)
    Changed { index: usize },
    /// Everything must be rebound
    Invalidated,
}

pub struct Timeline {
    entries: Vec<EventLog>,
    hub: Option<DeliveryHub>,
    observers: Vec<mpsc::UnboundedSender<TimelineChange>>,
}

impl Timeline {
    /// Timeline without live delivery updates
    pub fn new() -> Self {
        Timeline {
            entries: Vec::new(),
            hub: None,
            observers: Vec::new(),
        }
    }

    /// Timeline whose messages subscribe to `hub` while they are listed
    pub fn with_hub(hub: DeliveryHub) -> Self {
        Timeline {
            hub: Some(hub),
            ..Timeline::new()
        }
    }

    /// Build from a history given oldest-first, as returned by the session layer
    pub fn from_history(history: Vec<EventLog>, hub: Option<DeliveryHub>) -> Self {
        let mut timeline = match hub {
            Some(hub) => Timeline::with_hub(hub),
            None => Timeline::new(),
        };
        timeline.refresh(history);
        timeline
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn at(&self, index: usize) -> Result<&EventLog> {
        self.entries.get(index).ok_or(TimelineError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })
    }

    fn at_mut(&mut self, index: usize) -> Result<&mut EventLog> {
        let len = self.entries.len();
        self.entries
            .get_mut(index)
            .ok_or(TimelineError::IndexOutOfRange { index, len })
    }

    /// Entries in display order, newest first
    pub fn iter(&self) -> impl Iterator<Item = &EventLog> {
        self.entries.iter()
    }

    /// Index of the chronologically previous (older) entry
    pub fn chronological_previous(&self, index: usize) -> Option<usize> {
        let previous = index.checked_add(1)?;
        (previous < self.entries.len()).then_some(previous)
    }

    /// Index of the chronologically next (newer) entry
    pub fn chronological_next(&self, index: usize) -> Option<usize> {
        if index >= self.entries.len() {
            return None;
        }
        index.checked_sub(1)
    }

    pub fn position_of(&self, message_id: MessageId) -> Option<usize> {
        self.entries
            .iter()
            .position(|event| event.chat_message().map(|m| m.id()) == Some(message_id))
    }

    /// Stream of row deltas. Dropped streams are pruned on the next mutation.
    pub fn subscribe_changes(&mut self) -> UnboundedReceiverStream<TimelineChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        UnboundedReceiverStream::new(rx)
    }

    /// Insert entries given newest-first in front of the current most recent entry
    pub fn prepend(&mut self, entries: Vec<EventLog>) {
        let entries = self.drop_listed_ids(entries);
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        let had_rows = !self.entries.is_empty();
        self.insert_front(entries);

        self.notify(TimelineChange::Inserted { start: 0, count });
        // The former head now has a newer neighbor
        if had_rows {
            self.notify(TimelineChange::Changed { index: count });
        }
    }

    /// Append a batch of older history at the oldest end. The batch comes
    /// newest-first, matching display order, so its first entry lands right
    /// below the current tail.
    pub fn append_batch(&mut self, entries: Vec<EventLog>) {
        let mut entries = self.drop_listed_ids(entries);
        if entries.is_empty() {
            return;
        }
        for event in &mut entries {
            self.attach(event);
        }
        let start = self.entries.len();
        let count = entries.len();
        self.entries.extend(entries);
        debug!("Appended {} older entries at {}", count, start);

        self.notify(TimelineChange::Inserted { start, count });
        // The former tail now has an older neighbor
        if start > 0 {
            self.notify(TimelineChange::Changed { index: start - 1 });
        }
    }

    /// Append older history given oldest-first, as a history range query returns it
    pub fn append_history(&mut self, mut history: Vec<EventLog>) {
        history.reverse();
        self.append_batch(history);
    }

    /// Remove one entry, releasing its live subscription first
    pub fn remove_at(&mut self, index: usize) -> Result<EventLog> {
        let event = self.at_mut(index)?;
        if let Some(message) = event.chat_message_mut() {
            message.set_listener(None);
        }
        let removed = self.entries.remove(index);

        self.notify(TimelineChange::Removed { index });
        // Rows on both sides of the gap are now neighbors
        if index > 0 {
            self.notify(TimelineChange::Changed { index: index - 1 });
        }
        if index < self.entries.len() {
            self.notify(TimelineChange::Changed { index });
        }
        Ok(removed)
    }

    /// Remove several rows, typically a selection. Nothing is removed if any
    /// index is out of range.
    pub fn remove_many(&mut self, indices: &BTreeSet<usize>) -> Result<Vec<EventLog>> {
        if let Some(&last) = indices.last() {
            // Validate up front so a bad index cannot leave a partial deletion
            self.at(last)?;
        }
        let mut removed = Vec::with_capacity(indices.len());
        for &index in indices.iter().rev() {
            removed.push(self.remove_at(index)?);
        }
        removed.reverse();
        info!("Removed {} entries from timeline", removed.len());
        Ok(removed)
    }

    /// Replace all content with `entries` given newest-first
    pub fn replace_all(&mut self, entries: Vec<EventLog>) {
        self.release_all();
        self.entries.clear();
        let entries = self.drop_listed_ids(entries);
        self.insert_front(entries);
        self.notify(TimelineChange::Invalidated);
    }

    /// Replace all content with a history given oldest-first
    pub fn refresh(&mut self, mut history: Vec<EventLog>) {
        history.reverse();
        self.replace_all(history);
    }

    /// Release every live subscription, then drop all entries
    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.release_all();
        self.entries.clear();
        self.notify(TimelineChange::Invalidated);
    }

    /// Drop the row's subscription and bind a fresh one, for row reuse
    pub fn rebind(&mut self, index: usize) -> Result<()> {
        let hub = self.hub.clone();
        let event = self.at_mut(index)?;
        if let Some(message) = event.chat_message_mut() {
            message.set_listener(None);
            if let Some(hub) = hub {
                message.set_listener(Some(hub.subscribe(message.id())));
            }
        }
        Ok(())
    }

    /// Apply one delivery notification. Returns the updated row, or `None`
    /// when the message is no longer listed.
    pub fn apply_notification(&mut self, notification: DeliveryNotification) -> Option<usize> {
        let message_id = notification.message_id();
        let Some(index) = self.position_of(message_id) else {
            debug!("Ignoring notification for message {} not in timeline", message_id);
            return None;
        };
        let message = self.entries[index].chat_message_mut()?;

        match notification {
            DeliveryNotification::StateChanged { state, .. } => {
                debug!("Message {} state {:?} -> {:?}", message_id, message.state(), state);
                message.set_state(state);
            }
            DeliveryNotification::FileTransferProgress { offset, total, .. } => {
                message.set_transfer_progress(offset, total);
            }
            DeliveryNotification::ParticipantImdnStateChanged {
                participant,
                state,
                timestamp,
                ..
            } => {
                debug!("Message {} participant {} now {:?}", message_id, participant, state);
                message.update_participant_state(participant, state, timestamp);
            }
        }

        self.notify(TimelineChange::Changed { index });
        Some(index)
    }

    /// Apply everything the pump has received so far. Returns how many rows were updated.
    pub fn pump(&mut self, pump: &mut NotificationPump) -> usize {
        pump.drain()
            .into_iter()
            .filter_map(|notification| self.apply_notification(notification))
            .count()
    }

    fn insert_front(&mut self, mut entries: Vec<EventLog>) {
        for event in &mut entries {
            self.attach(event);
        }
        self.entries.splice(0..0, entries);
    }

    fn attach(&self, event: &mut EventLog) {
        if let (Some(hub), Some(message)) = (&self.hub, event.chat_message_mut()) {
            message.set_listener(Some(hub.subscribe(message.id())));
        }
    }

    fn release_all(&mut self) {
        for event in &mut self.entries {
            if let Some(message) = event.chat_message_mut() {
                message.set_listener(None);
            }
        }
    }

    fn notify(&mut self, change: TimelineChange) {
        self.observers.retain(|tx| tx.send(change).is_ok());
    }

    // Two rows sharing a message id would share one hub binding
    fn drop_listed_ids(&self, entries: Vec<EventLog>) -> Vec<EventLog> {
        let mut listed: HashSet<MessageId> = self
            .entries
            .iter()
            .filter_map(|event| event.chat_message().map(|m| m.id()))
            .collect();
        entries
            .into_iter()
            .filter(|event| match event.chat_message() {
                Some(message) if !listed.insert(message.id()) => {
                    warn!("Dropping duplicate message {} from timeline insert", message.id());
                    false
                }
                _ => true,
            })
            .collect()
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
