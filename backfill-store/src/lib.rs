pub mod analytics_repo;
pub mod app_config;
pub mod booking_repo;
pub mod confirmation_repo;
pub mod notification_repo;
pub mod provider;
pub mod slot_repo;
pub mod templates;
pub mod testing;
pub mod waitlist_repo;

pub use analytics_repo::InMemoryAnalyticsRepository;
pub use app_config::Config;
pub use booking_repo::InMemoryBookingRepository;
pub use confirmation_repo::InMemoryConfirmationRepository;
pub use notification_repo::InMemoryNotificationAttemptRepository;
pub use provider::LoggingProvider;
pub use slot_repo::InMemorySlotRepository;
pub use templates::PlainTemplateRenderer;
pub use waitlist_repo::InMemoryWaitlistRepository;
