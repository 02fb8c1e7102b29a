// Messaging module - Lock-free channels between the control and render domains

pub mod batcher;
pub mod channels;
pub mod command;
pub mod notification;

pub use batcher::{BatchSink, BatcherLimits, ParameterBatch, ParameterBatcher, SetOptions};
pub use channels::{
    create_command_channel, create_notification_channel, create_report_channel, CommandConsumer,
    CommandProducer, NotificationConsumer, NotificationProducer, ReportConsumer, ReportProducer,
};
pub use command::{Command, RenderReport};
pub use notification::{Escalation, Notification, NotificationCategory, NotificationLevel};
