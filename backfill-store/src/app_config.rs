use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub waitlist: WaitlistConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeadlinePolicyKind {
    /// Fixed cutoff `deadline_hours` before the appointment
    BeforeAppointment,
    /// `deadline_hours` after the request went out, never later than the appointment
    AfterReminder,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfirmationConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_deadline_policy")]
    pub deadline_policy: DeadlinePolicyKind,
    #[serde(default = "default_deadline_hours")]
    pub deadline_hours: i64,
}

fn default_window_hours() -> i64 { 24 }
fn default_deadline_policy() -> DeadlinePolicyKind { DeadlinePolicyKind::BeforeAppointment }
fn default_deadline_hours() -> i64 { 2 }

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            deadline_policy: default_deadline_policy(),
            deadline_hours: default_deadline_hours(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_low_priority_max_attempts")]
    pub low_priority_max_attempts: u32,
    #[serde(default = "default_base_backoff_seconds")]
    pub base_backoff_seconds: i64,
    #[serde(default = "default_max_backoff_seconds")]
    pub max_backoff_seconds: i64,
    #[serde(default = "default_send_timeout_seconds")]
    pub send_timeout_seconds: u64,
    #[serde(default = "default_sms_cost_cents")]
    pub sms_cost_cents: i64,
    #[serde(default = "default_email_cost_cents")]
    pub email_cost_cents: i64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_low_priority_max_attempts() -> u32 { 2 }
fn default_base_backoff_seconds() -> i64 { 60 }
fn default_max_backoff_seconds() -> i64 { 3600 }
fn default_send_timeout_seconds() -> u64 { 10 }
fn default_sms_cost_cents() -> i64 { 5 }
fn default_email_cost_cents() -> i64 { 1 }

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            low_priority_max_attempts: default_low_priority_max_attempts(),
            base_backoff_seconds: default_base_backoff_seconds(),
            max_backoff_seconds: default_max_backoff_seconds(),
            send_timeout_seconds: default_send_timeout_seconds(),
            sms_cost_cents: default_sms_cost_cents(),
            email_cost_cents: default_email_cost_cents(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WaitlistConfig {
    #[serde(default = "default_response_window_minutes")]
    pub response_window_minutes: i64,
    #[serde(default = "default_wait_weight")]
    pub wait_weight: f64,
    #[serde(default = "default_reliability_weight")]
    pub reliability_weight: f64,
    #[serde(default = "default_flexibility_weight")]
    pub flexibility_weight: f64,
    #[serde(default = "default_wait_saturation_hours")]
    pub wait_saturation_hours: f64,
    #[serde(default = "default_flexibility_saturation_hours")]
    pub flexibility_saturation_hours: f64,
}

fn default_response_window_minutes() -> i64 { 120 }
fn default_wait_weight() -> f64 { 40.0 }
fn default_reliability_weight() -> f64 { 40.0 }
fn default_flexibility_weight() -> f64 { 20.0 }
fn default_wait_saturation_hours() -> f64 { 72.0 }
fn default_flexibility_saturation_hours() -> f64 { 48.0 }

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            response_window_minutes: default_response_window_minutes(),
            wait_weight: default_wait_weight(),
            reliability_weight: default_reliability_weight(),
            flexibility_weight: default_flexibility_weight(),
            wait_saturation_hours: default_wait_saturation_hours(),
            flexibility_saturation_hours: default_flexibility_saturation_hours(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_tick_millis() -> u64 { 1000 }
fn default_event_buffer() -> usize { 256 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_reliability_list_size")]
    pub reliability_list_size: usize,
    /// Days covered by the dashboard summary
    #[serde(default = "default_summary_window_days")]
    pub summary_window_days: i64,
}

fn default_reliability_list_size() -> usize { 5 }
fn default_summary_window_days() -> i64 { 30 }

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            reliability_list_size: default_reliability_list_size(),
            summary_window_days: default_summary_window_days(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `BACKFILL_NOTIFICATIONS__MAX_ATTEMPTS=5`
            .add_source(config::Environment::with_prefix("BACKFILL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
