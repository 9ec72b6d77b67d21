// Chat timeline list model: ordered event history, bubble grouping and receipt breakdown
pub mod config;
pub mod contacts;
pub mod delivery;
pub mod error;
pub mod grouping;
pub mod imdn;
pub mod models;
pub mod selection;
pub mod timeline;

// Re-export main types for convenience
pub use contacts::{AddressResolver, ContactBook};
pub use delivery::{DeliveryHub, DeliveryNotification, NotificationPump, Subscription};
pub use error::TimelineError;
pub use grouping::{compute_grouping, BubbleVariant, GroupingResult};
pub use imdn::{bucketize, ReceiptBreakdown, ReceiptBucket};
pub use models::*;
pub use selection::SelectionController;
pub use timeline::{Timeline, TimelineChange};
