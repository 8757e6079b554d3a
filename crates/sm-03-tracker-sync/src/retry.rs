//! # Instruction Retry Manager
//!
//! Re-applies the latest instruction of each topic every `interval` so that
//! a partially fulfilled instruction keeps converging. Every
//! `status_send_counter_limit + 1`-th run (the first one included) is a full
//! run that also reports status.

use parking_lot::Mutex;
use shared_types::{InstructionMessage, StreamPartId, TrackerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::ports::outbound::InstructionHandler;

pub struct InstructionRetryManager<H: InstructionHandler> {
    inner: Arc<RetryInner<H>>,
}

struct RetryInner<H: InstructionHandler> {
    handler: H,
    interval: Duration,
    status_send_counter_limit: u64,
    timers: Mutex<RetryTimers>,
}

#[derive(Default)]
struct RetryTimers {
    by_stream_part: HashMap<StreamPartId, JoinHandle<()>>,
    stopped: bool,
}

impl<H: InstructionHandler> Clone for InstructionRetryManager<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: InstructionHandler> InstructionRetryManager<H> {
    pub fn new(handler: H, interval: Duration, status_send_counter_limit: u64) -> Self {
        Self {
            inner: Arc::new(RetryInner {
                handler,
                interval,
                status_send_counter_limit,
                timers: Mutex::new(RetryTimers::default()),
            }),
        }
    }

    /// (Re)arm the topic's retry timer with `instruction`.
    pub fn add(&self, instruction: InstructionMessage, tracker_id: TrackerId) {
        let stream_part_id = instruction.stream_part_id();
        let mut timers = self.inner.timers.lock();
        if timers.stopped {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            inner.retry_loop(instruction, tracker_id).await;
        });
        if let Some(previous) = timers.by_stream_part.insert(stream_part_id, handle) {
            previous.abort();
        }
    }

    pub fn remove_stream_part(&self, stream_part_id: &StreamPartId) {
        if let Some(handle) = self.inner.timers.lock().by_stream_part.remove(stream_part_id) {
            handle.abort();
        }
    }

    pub fn stop(&self) {
        let mut timers = self.inner.timers.lock();
        timers.stopped = true;
        for (_, handle) in timers.by_stream_part.drain() {
            handle.abort();
        }
    }

    pub fn num_of_armed_timers(&self) -> usize {
        self.inner.timers.lock().by_stream_part.len()
    }
}

impl<H: InstructionHandler> RetryInner<H> {
    async fn retry_loop(&self, instruction: InstructionMessage, tracker_id: TrackerId) {
        let mut counter: u64 = 0;
        loop {
            tokio::time::sleep(self.interval).await;
            let reattempt = counter % (self.status_send_counter_limit + 1) != 0;
            trace!(
                stream_id = %instruction.stream_id,
                partition = instruction.stream_partition,
                reattempt,
                "Retrying tracker instruction"
            );
            if let Err(e) = self
                .handler
                .handle_instruction(instruction.clone(), tracker_id.clone(), reattempt)
                .await
            {
                warn!(
                    stream_id = %instruction.stream_id,
                    partition = instruction.stream_partition,
                    error = %e,
                    "Instruction retry failed"
                );
            }
            counter = counter.wrapping_add(1);
        }
    }
}
