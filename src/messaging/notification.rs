// Notifications - Escalations from the control side to the UI
//
// Only conditions the user can act on are escalated; the rest is logged.

use std::fmt;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    /// A fixed-capacity pool ran dry
    Pool,
    /// Events were lost between the control and render sides
    Channel,
    Performance,
}

/// Condition being escalated
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Escalation {
    /// Materialization hit the event pool limit
    EventsDropped { dropped: usize, capacity: usize },
    /// Notes skipped because every voice was busy
    VoicesBusy { dropped: u32 },
    /// Command channel or render buffer full
    EventsUndelivered { dropped: u64 },
    /// Render cycles are running at or over their budget
    Overloaded { load_percent: f64 },
}

impl Escalation {
    pub fn level(&self) -> NotificationLevel {
        match self {
            Escalation::EventsDropped { .. } | Escalation::EventsUndelivered { .. } => {
                NotificationLevel::Error
            }
            Escalation::VoicesBusy { .. } | Escalation::Overloaded { .. } => {
                NotificationLevel::Warning
            }
        }
    }

    pub fn category(&self) -> NotificationCategory {
        match self {
            Escalation::EventsDropped { .. } | Escalation::VoicesBusy { .. } => {
                NotificationCategory::Pool
            }
            Escalation::EventsUndelivered { .. } => NotificationCategory::Channel,
            Escalation::Overloaded { .. } => NotificationCategory::Performance,
        }
    }
}

impl fmt::Display for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Escalation::EventsDropped { dropped, capacity } => write!(
                f,
                "Event pool full ({} slots), {} event(s) dropped; raise pools.events",
                capacity, dropped
            ),
            Escalation::VoicesBusy { dropped } => {
                write!(f, "{} note(s) skipped, all voices busy", dropped)
            }
            Escalation::EventsUndelivered { dropped } => write!(
                f,
                "{} event(s) never reached the render side; raise channels capacity",
                dropped
            ),
            Escalation::Overloaded { load_percent } => write!(
                f,
                "Render load at {:.0}% of the cycle budget",
                load_percent
            ),
        }
    }
}

/// Escalation stamped with the engine clock
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub message: String,
    /// Engine clock time (seconds) when raised
    pub at: f64,
    pub escalation: Escalation,
}

impl Notification {
    pub fn new(escalation: Escalation, at: f64) -> Self {
        Self {
            level: escalation.level(),
            category: escalation.category(),
            message: escalation.to_string(),
            at,
            escalation,
        }
    }
}
