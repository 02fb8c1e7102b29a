// Communication channels lock-free

use crate::messaging::batcher::{BatchSink, ParameterBatch};
use crate::messaging::command::{Command, RenderReport};
use crate::messaging::notification::Notification;
use ringbuf::traits::{Observer, Producer, Split};
use ringbuf::HeapRb;

pub type CommandProducer = ringbuf::HeapProd<Command>;
pub type CommandConsumer = ringbuf::HeapCons<Command>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<Command>::new(capacity);
    rb.split()
}

pub type ReportProducer = ringbuf::HeapProd<RenderReport>;
pub type ReportConsumer = ringbuf::HeapCons<RenderReport>;

pub fn create_report_channel(capacity: usize) -> (ReportProducer, ReportConsumer) {
    let rb = HeapRb::<RenderReport>::new(capacity);
    rb.split()
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}

impl BatchSink for CommandProducer {
    fn send_batch(&mut self, batch: ParameterBatch) -> Result<(), ParameterBatch> {
        // Single producer: a slot seen free stays free until we push
        if self.is_full() {
            return Err(batch);
        }
        let _ = self.try_push(Command::Parameters(batch));
        Ok(())
    }
}
