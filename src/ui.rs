use anyhow::Result;
use textwrap::wrap;

use chatline::config::TimelineConfig;
use chatline::grouping::{describe_row, BubbleRow, RowLayout};
use chatline::imdn::{ReceiptBreakdown, ReceiptBucket};
use chatline::{AddressResolver, EventKind, MessageState, Timeline};

use crate::utils::format_timestamp;

// Outgoing bubbles are pushed right by this many columns
const OUTGOING_INDENT: usize = 8;

/// Plain-text rendering of the whole timeline, oldest event at the top
pub fn render_timeline(
    timeline: &Timeline,
    config: &TimelineConfig,
    resolver: &dyn AddressResolver,
    width: usize,
) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for index in (0..timeline.size()).rev() {
        let row = describe_row(timeline, index, config.same_sender_spacing_enabled, resolver)?;
        let event = timeline.at(index)?;
        let time = format_timestamp(event.timestamp(), &config.date_format);

        match row.layout {
            RowLayout::Bubble(bubble) => {
                let state = event.chat_message().map(|m| m.state()).unwrap_or_default();
                render_bubble(&mut lines, &bubble, row.subject.as_deref(), state, &time, width);
            }
            RowLayout::Event(kind) => {
                let text = event_sentence(kind, row.subject.as_deref());
                lines.push(format!("{:^width$}", format!("-- {} --", text), width = width));
            }
            RowLayout::Security => {
                let detail = row.subject.as_deref().unwrap_or("security event");
                lines.push(format!("{:^width$}", format!("[!] {}", detail), width = width));
            }
            RowLayout::Hidden => {}
        }
    }
    Ok(lines)
}

fn render_bubble(
    lines: &mut Vec<String>,
    bubble: &BubbleRow,
    text: Option<&str>,
    state: MessageState,
    time: &str,
    width: usize,
) {
    let grouping = &bubble.grouping;
    let indent = if grouping.bubble.is_outgoing() {
        " ".repeat(OUTGOING_INDENT)
    } else {
        String::new()
    };
    let inner_width = width.saturating_sub(OUTGOING_INDENT + 2).max(10);

    // Header opens a run; rows merged with the older one above continue it
    if grouping.show_timestamp {
        let mut header = format!("{}╭─", indent);
        if let Some(name) = &bubble.sender_name {
            header.push_str(&format!(" {}", name));
        }
        header.push_str(&format!(" · {}", time));
        lines.push(header);
    }
    for line in wrap(text.unwrap_or(""), inner_width) {
        lines.push(format!("{}│ {}", indent, line));
    }
    if !grouping.merged_with_previous {
        let marker = state_marker(state);
        if grouping.bubble.is_outgoing() && !marker.is_empty() {
            lines.push(format!("{}╰─ {}", indent, marker));
        } else {
            lines.push(format!("{}╰─", indent));
        }
    }
}

fn state_marker(state: MessageState) -> &'static str {
    match state {
        MessageState::InProgress | MessageState::FileTransferInProgress => "…",
        MessageState::Delivered => "✓",
        MessageState::DeliveredToUser => "✓✓",
        MessageState::Displayed => "read",
        MessageState::NotDelivered | MessageState::FileTransferError => "not delivered",
        MessageState::Idle | MessageState::FileTransferDone => "",
    }
}

fn event_sentence(kind: EventKind, subject: Option<&str>) -> String {
    let name = subject.unwrap_or("someone");
    match kind {
        EventKind::ConferenceCreated => "Conference created".to_string(),
        EventKind::ConferenceTerminated => "Conference terminated".to_string(),
        EventKind::ParticipantAdded => format!("{} joined", name),
        EventKind::ParticipantRemoved => format!("{} left", name),
        EventKind::SubjectChanged => format!("Subject changed to {}", subject.unwrap_or("(none)")),
        EventKind::AdminSet => format!("{} is now an admin", name),
        EventKind::AdminUnset => format!("{} is no longer an admin", name),
        EventKind::DeviceAdded => format!("New device for {}", name),
        EventKind::DeviceRemoved => format!("Device removed for {}", name),
        EventKind::SecurityEvent | EventKind::Message | EventKind::None => String::new(),
    }
}

fn bucket_title(bucket: ReceiptBucket) -> &'static str {
    match bucket {
        ReceiptBucket::Read => "Read",
        ReceiptBucket::DeliveredToUser => "Delivered",
        ReceiptBucket::DeliveredToServer => "Sent",
        ReceiptBucket::NotDelivered => "Not delivered",
    }
}

/// Receipt view: one section per non-empty bucket
pub fn render_receipts(breakdown: &ReceiptBreakdown, date_format: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for (bucket, receipts) in breakdown.iter() {
        if receipts.is_empty() {
            continue;
        }
        lines.push(format!("{}:", bucket_title(bucket)));
        for receipt in receipts {
            // Undelivered rows have no meaningful time
            if bucket == ReceiptBucket::NotDelivered {
                lines.push(format!("  {}", receipt.display_name));
            } else {
                lines.push(format!(
                    "  {:<24} {}",
                    receipt.display_name,
                    format_timestamp(receipt.timestamp, date_format)
                ));
            }
        }
    }
    if lines.is_empty() {
        lines.push("No receipts yet".to_string());
    }
    lines
}
