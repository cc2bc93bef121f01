use std::sync::Arc;

use crate::models::{Category, Embed};
use crate::webhook::Notifier;

/// Discord accepts at most ten embeds per webhook message.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Batcher {
    sink: Arc<dyn Notifier>,
    chunk_size: usize,
}

impl Batcher {
    pub fn new(sink: Arc<dyn Notifier>) -> Self {
        Self {
            sink,
            chunk_size: MAX_EMBEDS_PER_MESSAGE,
        }
    }

    pub async fn send(&self, category: Category, payloads: &[Embed]) -> BatchReport {
        let mut report = BatchReport::default();
        if payloads.is_empty() {
            return report;
        }

        for (index, chunk) in payloads.chunks(self.chunk_size).enumerate() {
            match self.sink.send(chunk).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        %category,
                        channel = self.sink.channel_name(),
                        batch = index,
                        size = chunk.len(),
                        error = %err,
                        "Notification delivery failed"
                    );
                }
            }
        }

        tracing::info!(
            %category,
            notifications = payloads.len(),
            delivered = report.delivered,
            failed = report.failed,
            "Notifications dispatched"
        );
        report
    }
}
