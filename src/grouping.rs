//! Visual grouping of consecutive same-sender messages.
//!
//! Naming follows display order. `merged_with_previous` looks at the row shown
//! above (display index - 1, chronologically newer), `merged_with_next` at the
//! row shown below (display index + 1, chronologically older). Row 0 therefore
//! never has a previous and the last row never has a next.

use serde::Serialize;

use crate::contacts::{display_name_for, AddressResolver};
use crate::error::Result;
use crate::models::{Address, Direction, EventKind, EventLog};
use crate::timeline::{Timeline, TimelineChange};

/// Bubble background shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BubbleVariant {
    OutgoingFull,
    OutgoingSplitTop,
    OutgoingSplitMiddle,
    OutgoingSplitBottom,
    IncomingFull,
    IncomingSplitTop,
    IncomingSplitMiddle,
    IncomingSplitBottom,
}

impl BubbleVariant {
    pub fn select(direction: Direction, has_previous: bool, has_next: bool) -> Self {
        use BubbleVariant::*;
        match (direction, has_previous, has_next) {
            (Direction::Outgoing, true, true) => OutgoingSplitMiddle,
            (Direction::Outgoing, false, true) => OutgoingSplitTop,
            (Direction::Outgoing, true, false) => OutgoingSplitBottom,
            (Direction::Outgoing, false, false) => OutgoingFull,
            (Direction::Incoming, true, true) => IncomingSplitMiddle,
            (Direction::Incoming, false, true) => IncomingSplitTop,
            (Direction::Incoming, true, false) => IncomingSplitBottom,
            (Direction::Incoming, false, false) => IncomingFull,
        }
    }

    pub fn is_outgoing(self) -> bool {
        matches!(
            self,
            BubbleVariant::OutgoingFull
                | BubbleVariant::OutgoingSplitTop
                | BubbleVariant::OutgoingSplitMiddle
                | BubbleVariant::OutgoingSplitBottom
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupingResult {
    pub merged_with_previous: bool,
    pub merged_with_next: bool,
    pub bubble: BubbleVariant,
    /// False when the row below continues the run
    pub show_timestamp: bool,
    /// Only incoming rows carry an avatar, and only when not merged with the row below
    pub show_avatar: bool,
}

impl GroupingResult {
    fn new(direction: Direction, merged_with_previous: bool, merged_with_next: bool) -> Self {
        GroupingResult {
            merged_with_previous,
            merged_with_next,
            bubble: BubbleVariant::select(direction, merged_with_previous, merged_with_next),
            show_timestamp: !merged_with_next,
            show_avatar: direction == Direction::Incoming && !merged_with_next,
        }
    }
}

/// Grouping of the row at `index`. `Ok(None)` for non-message rows, which
/// always render as full-width event rows.
pub fn compute_grouping(
    timeline: &Timeline,
    index: usize,
    same_sender_spacing_enabled: bool,
) -> Result<Option<GroupingResult>> {
    let Some(message) = timeline.at(index)?.chat_message() else {
        return Ok(None);
    };
    let direction = message.direction();
    if !same_sender_spacing_enabled {
        return Ok(Some(GroupingResult::new(direction, false, false)));
    }

    let sender = message.from_address();
    // Display is newest-first: the row above is chronologically newer
    let above = timeline.chronological_next(index);
    let below = timeline.chronological_previous(index);

    Ok(Some(GroupingResult::new(
        direction,
        same_sender_at(timeline, above, sender),
        same_sender_at(timeline, below, sender),
    )))
}

fn same_sender_at(timeline: &Timeline, neighbor: Option<usize>, sender: &Address) -> bool {
    neighbor
        .and_then(|index| timeline.at(index).ok())
        .and_then(EventLog::chat_message)
        .is_some_and(|message| message.from_address().weak_equal(sender))
}

/// Rows whose grouping may differ after `change`, in ascending order
pub fn affected_rows(change: TimelineChange, len: usize) -> Vec<usize> {
    let (first, last) = match change {
        TimelineChange::Inserted { start, count } => (start.saturating_sub(1), start + count),
        TimelineChange::Removed { index } => (index.saturating_sub(1), index),
        TimelineChange::Changed { index } => (index.saturating_sub(1), index + 1),
        TimelineChange::Invalidated => (0, len.saturating_sub(1)),
    };
    (first..=last).filter(|&index| index < len).collect()
}

/// Bubble row data for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubbleRow {
    pub grouping: GroupingResult,
    /// Resolved sender name, incoming messages only
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowLayout {
    Bubble(BubbleRow),
    /// Centered lifecycle notice
    Event(EventKind),
    Security,
    /// Nothing to show
    Hidden,
}

/// Everything the presentation layer needs to format one row. `subject`
/// holds the variable part of the text (a name or a subject line), never
/// the formatted sentence itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDescription {
    pub layout: RowLayout,
    pub subject: Option<String>,
}

pub fn describe_row(
    timeline: &Timeline,
    index: usize,
    same_sender_spacing_enabled: bool,
    resolver: &dyn AddressResolver,
) -> Result<RowDescription> {
    let event = timeline.at(index)?;
    let participant_name = || event.participant_address().map(|a| display_name_for(resolver, a));

    let description = match event.kind() {
        EventKind::Message => {
            // at() succeeded above, so grouping exists for message rows
            let grouping = compute_grouping(timeline, index, same_sender_spacing_enabled)?;
            match (grouping, event.chat_message()) {
                (Some(grouping), Some(message)) => RowDescription {
                    layout: RowLayout::Bubble(BubbleRow {
                        grouping,
                        sender_name: (!message.is_outgoing())
                            .then(|| display_name_for(resolver, message.from_address())),
                    }),
                    subject: message.text().map(str::to_string),
                },
                _ => RowDescription { layout: RowLayout::Hidden, subject: None },
            }
        }
        EventKind::ConferenceCreated | EventKind::ConferenceTerminated => RowDescription {
            layout: RowLayout::Event(event.kind()),
            subject: None,
        },
        EventKind::ParticipantAdded
        | EventKind::ParticipantRemoved
        | EventKind::AdminSet
        | EventKind::AdminUnset
        | EventKind::DeviceAdded
        | EventKind::DeviceRemoved => RowDescription {
            layout: RowLayout::Event(event.kind()),
            subject: participant_name(),
        },
        EventKind::SubjectChanged => RowDescription {
            layout: RowLayout::Event(EventKind::SubjectChanged),
            subject: event.subject().map(str::to_string),
        },
        EventKind::SecurityEvent => RowDescription {
            layout: RowLayout::Security,
            subject: event.detail().map(str::to_string),
        },
        EventKind::None => RowDescription { layout: RowLayout::Hidden, subject: None },
    };
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_table() {
        use BubbleVariant::*;
        let cases = [
            (Direction::Outgoing, true, true, OutgoingSplitMiddle),
            (Direction::Outgoing, false, true, OutgoingSplitTop),
            (Direction::Outgoing, true, false, OutgoingSplitBottom),
            (Direction::Outgoing, false, false, OutgoingFull),
            (Direction::Incoming, true, true, IncomingSplitMiddle),
            (Direction::Incoming, false, true, IncomingSplitTop),
            (Direction::Incoming, true, false, IncomingSplitBottom),
            (Direction::Incoming, false, false, IncomingFull),
        ];
        for (direction, previous, next, expected) in cases {
            let variant = BubbleVariant::select(direction, previous, next);
            assert_eq!(variant, expected);
            assert_eq!(variant.is_outgoing(), direction == Direction::Outgoing);
        }
    }

    #[test]
    fn test_decorations_hidden_when_merged_below() {
        let incoming = GroupingResult::new(Direction::Incoming, false, true);
        assert!(!incoming.show_timestamp);
        assert!(!incoming.show_avatar);

        let last_of_run = GroupingResult::new(Direction::Incoming, true, false);
        assert!(last_of_run.show_timestamp);
        assert!(last_of_run.show_avatar);

        let outgoing = GroupingResult::new(Direction::Outgoing, false, false);
        assert!(outgoing.show_timestamp);
        assert!(!outgoing.show_avatar);
    }

    #[test]
    fn test_affected_rows() {
        assert_eq!(affected_rows(TimelineChange::Inserted { start: 0, count: 2 }, 5), vec![0, 1, 2]);
        assert_eq!(affected_rows(TimelineChange::Inserted { start: 3, count: 2 }, 5), vec![2, 3, 4]);
        assert_eq!(affected_rows(TimelineChange::Removed { index: 2 }, 4), vec![1, 2]);
        assert_eq!(affected_rows(TimelineChange::Removed { index: 3 }, 3), vec![2]);
        assert_eq!(affected_rows(TimelineChange::Changed { index: 0 }, 3), vec![0, 1]);
        assert_eq!(affected_rows(TimelineChange::Invalidated, 3), vec![0, 1, 2]);
        assert!(affected_rows(TimelineChange::Invalidated, 0).is_empty());
    }
}
