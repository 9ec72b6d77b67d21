// Read receipt breakdown tests
// These tests verify bucket assignment, ordering and name resolution

mod common;
use common::{addr, at_minute, group_message, setup_logging};

use chatline::contacts::NoContacts;
use chatline::imdn::{ImdnSource, LocalImdn};
use chatline::{
    bucketize, ChatMessage, ContactBook, DeliveryHub, DeliveryNotification, EventLog, MessageState,
    ParticipantImdnState, ReceiptBucket, Timeline,
};

fn names(breakdown: &chatline::ReceiptBreakdown, bucket: ReceiptBucket) -> Vec<String> {
    breakdown
        .get(bucket)
        .iter()
        .map(|receipt| receipt.display_name.clone())
        .collect()
}

#[test]
fn test_two_read_one_undelivered() {
    setup_logging();
    let message = group_message(&[
        ("alice", MessageState::Displayed),
        ("bob", MessageState::Displayed),
        ("carol", MessageState::NotDelivered),
    ]);

    let breakdown = bucketize(&message, &LocalImdn, &NoContacts);

    assert_eq!(names(&breakdown, ReceiptBucket::Read), vec!["alice", "bob"]);
    assert!(breakdown.get(ReceiptBucket::DeliveredToUser).is_empty());
    assert!(breakdown.get(ReceiptBucket::DeliveredToServer).is_empty());
    assert_eq!(names(&breakdown, ReceiptBucket::NotDelivered), vec!["carol"]);
    assert_eq!(breakdown.total(), 3);
}

#[test]
fn test_every_participant_lands_in_exactly_one_bucket() {
    setup_logging();
    let message = group_message(&[
        ("a", MessageState::Delivered),
        ("b", MessageState::DeliveredToUser),
        ("c", MessageState::Displayed),
        ("d", MessageState::NotDelivered),
        ("e", MessageState::DeliveredToUser),
        ("f", MessageState::Delivered),
    ]);

    let breakdown = bucketize(&message, &LocalImdn, &NoContacts);

    let mut all: Vec<String> = breakdown
        .iter()
        .flat_map(|(_, receipts)| receipts.iter().map(|r| r.display_name.clone()))
        .collect();
    all.sort();
    assert_eq!(all, vec!["a", "b", "c", "d", "e", "f"]);

    // Source order is kept inside each bucket
    assert_eq!(names(&breakdown, ReceiptBucket::DeliveredToUser), vec!["b", "e"]);
    assert_eq!(names(&breakdown, ReceiptBucket::DeliveredToServer), vec!["a", "f"]);

    let order: Vec<ReceiptBucket> = breakdown.iter().map(|(bucket, _)| bucket).collect();
    assert_eq!(order, ReceiptBucket::ALL.to_vec());
}

#[test]
fn test_timestamps_follow_participant() {
    setup_logging();
    let message = group_message(&[("alice", MessageState::Delivered), ("bob", MessageState::Displayed)]);
    let breakdown = bucketize(&message, &LocalImdn, &NoContacts);

    assert_eq!(breakdown.get(ReceiptBucket::DeliveredToServer)[0].timestamp, at_minute(0));
    assert_eq!(breakdown.get(ReceiptBucket::Read)[0].timestamp, at_minute(1));
    assert_eq!(breakdown.get(ReceiptBucket::Read)[0].address, addr("bob"));
}

#[test]
fn test_names_come_from_contacts_with_fallback() {
    setup_logging();
    let mut contacts = ContactBook::new();
    contacts.insert(&addr("alice"), "Alice Liddell");

    let bob_with_name = "\"Robert\" <sip:bob@example.org>".parse().unwrap();
    let message = group_message(&[("alice", MessageState::Displayed)]).with_participant_state(
        bob_with_name,
        MessageState::Displayed,
        at_minute(5),
    );

    let breakdown = bucketize(&message, &LocalImdn, &contacts);
    assert_eq!(names(&breakdown, ReceiptBucket::Read), vec!["Alice Liddell", "Robert"]);
}

#[test]
fn test_message_without_participants_is_empty() {
    setup_logging();
    let message = group_message(&[]);
    let breakdown = bucketize(&message, &LocalImdn, &NoContacts);
    assert!(breakdown.is_empty());
    assert_eq!(breakdown.iter().count(), 4);
}

/// Delivery layer that reports every participant in every state
struct EverywhereImdn;

impl ImdnSource for EverywhereImdn {
    fn participants_by_imdn_state(&self, _message: &ChatMessage, _state: MessageState) -> Vec<ParticipantImdnState> {
        vec![ParticipantImdnState {
            address: addr("dup"),
            state: MessageState::Displayed,
            timestamp: at_minute(0),
        }]
    }
}

#[test]
fn test_inconsistent_source_keeps_first_bucket() {
    setup_logging();
    let message = group_message(&[]);
    let breakdown = bucketize(&message, &EverywhereImdn, &NoContacts);
    assert_eq!(breakdown.total(), 1);
    assert_eq!(names(&breakdown, ReceiptBucket::Read), vec!["dup"]);
}

#[test]
fn test_recompute_after_participant_notification() {
    setup_logging();
    let (hub, mut pump) = DeliveryHub::new();
    let message = group_message(&[("alice", MessageState::Delivered), ("bob", MessageState::Delivered)]);
    let message_id = message.id();
    let mut timeline = Timeline::from_history(vec![EventLog::message(message)], Some(hub.clone()));

    let before = bucketize(timeline.at(0).unwrap().chat_message().unwrap(), &LocalImdn, &NoContacts);
    assert_eq!(names(&before, ReceiptBucket::DeliveredToServer), vec!["alice", "bob"]);

    // Transport params do not make bob a new participant
    assert!(hub.publish(DeliveryNotification::ParticipantImdnStateChanged {
        message_id,
        participant: "sip:bob@example.org;transport=tls".parse().unwrap(),
        state: MessageState::Displayed,
        timestamp: at_minute(9),
    }));
    assert_eq!(timeline.pump(&mut pump), 1);

    let after = bucketize(timeline.at(0).unwrap().chat_message().unwrap(), &LocalImdn, &NoContacts);
    assert_eq!(names(&after, ReceiptBucket::DeliveredToServer), vec!["alice"]);
    assert_eq!(names(&after, ReceiptBucket::Read), vec!["bob"]);
    assert_eq!(after.get(ReceiptBucket::Read)[0].timestamp, at_minute(9));
    assert_eq!(after.total(), 2);
}
