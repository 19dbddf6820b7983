pub mod analytics;
pub mod booking;
pub mod confirmation;
pub mod customer;
pub mod notification;
pub mod slot;
pub mod waitlist;

pub use analytics::{AnalyticsPeriod, CustomerReliabilityRow, PeriodKind};
pub use booking::{AttendanceOutcome, Booking, BookingSource, BookingStatus, NewBooking};
pub use confirmation::{ConfirmationRequest, ConfirmationState, ConfirmationTrigger, DeliveryStatus};
pub use customer::ReliabilityHistory;
pub use notification::{
    AttemptResult, Channel, ContactPoint, DeliveryReceipt, NotificationAttempt, NotificationOwner,
    NotificationPriority, NotificationRequest,
};
pub use slot::{SlotClaim, SlotDescriptor, SlotHolder, SlotKey};
pub use waitlist::{NewWaitlistEntry, PreferredWindow, PriorityTier, WaitlistEntry, WaitlistStatus};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },
}
