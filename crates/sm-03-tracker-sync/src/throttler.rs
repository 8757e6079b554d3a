//! # Instruction Throttler
//!
//! Serializes instruction handling per topic with a keep-latest queue of
//! depth one. Topics are handled independently of each other.
//!
//! ```text
//! add(1) ──→ running: 1
//! add(2) ──→ queued:  2
//! add(3) ──→ queued:  3   (2 replaced)
//! 1 done ──→ running: 3
//! 3 done ──→ idle
//! ```

use parking_lot::Mutex;
use shared_types::{InstructionMessage, StreamPartId, TrackerId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::domain::QueuedInstruction;
use crate::ports::outbound::InstructionHandler;

pub struct InstructionThrottler<H: InstructionHandler> {
    inner: Arc<ThrottlerInner<H>>,
}

struct ThrottlerInner<H: InstructionHandler> {
    handler: H,
    state: Mutex<ThrottlerState>,
}

#[derive(Default)]
struct ThrottlerState {
    queue: HashMap<StreamPartId, QueuedInstruction>,
    /// Counter of the last instruction handed to the handler, per topic.
    applied: HashMap<StreamPartId, u64>,
    /// Topics with a handler loop in flight, tagged with the loop's epoch.
    running: HashMap<StreamPartId, u64>,
    next_epoch: u64,
    stopped: bool,
}

impl<H: InstructionHandler> Clone for InstructionThrottler<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: InstructionHandler> InstructionThrottler<H> {
    pub fn new(handler: H) -> Self {
        Self {
            inner: Arc::new(ThrottlerInner {
                handler,
                state: Mutex::new(ThrottlerState::default()),
            }),
        }
    }

    /// Queue an instruction, starting the topic's handler if it is idle.
    ///
    /// Instructions with a counter at or below the last applied one are
    /// dropped, as are ones below the currently queued counter.
    pub fn add(&self, instruction: InstructionMessage, tracker_id: TrackerId) {
        let stream_part_id = instruction.stream_part_id();
        let queued = QueuedInstruction {
            instruction,
            tracker_id,
        };

        let mut state = self.inner.state.lock();
        if state.stopped {
            return;
        }
        let counter = queued.instruction.counter;
        if let Some(&last) = state.applied.get(&stream_part_id) {
            if counter <= last {
                trace!(stream_part_id = %stream_part_id, counter, last, "Dropping already applied instruction");
                return;
            }
        }

        if state.running.contains_key(&stream_part_id) {
            if let Some(pending) = state.queue.get(&stream_part_id) {
                if counter < pending.instruction.counter {
                    trace!(
                        stream_part_id = %stream_part_id,
                        counter,
                        queued = pending.instruction.counter,
                        "Dropping instruction older than the queued one"
                    );
                    return;
                }
            }
            state.queue.insert(stream_part_id, queued);
            return;
        }
        state.applied.insert(stream_part_id.clone(), counter);
        let epoch = state.next_epoch;
        state.next_epoch += 1;
        state.running.insert(stream_part_id.clone(), epoch);
        drop(state);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run(stream_part_id, epoch, queued).await;
        });
    }

    /// Forget the topic's queued instruction, counter and in-flight loop.
    pub fn remove_stream_part(&self, stream_part_id: &StreamPartId) {
        let mut state = self.inner.state.lock();
        state.queue.remove(stream_part_id);
        state.applied.remove(stream_part_id);
        state.running.remove(stream_part_id);
    }

    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.stopped = true;
        state.queue.clear();
        state.applied.clear();
        state.running.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().running.is_empty()
    }
}

impl<H: InstructionHandler> ThrottlerInner<H> {
    async fn run(&self, stream_part_id: StreamPartId, epoch: u64, first: QueuedInstruction) {
        let mut next = first;
        loop {
            let counter = next.instruction.counter;
            if let Err(e) = self
                .handler
                .handle_instruction(next.instruction, next.tracker_id, false)
                .await
            {
                warn!(stream_part_id = %stream_part_id, counter, error = %e, "Instruction handling failed");
            }

            let mut state = self.state.lock();
            if state.stopped || state.running.get(&stream_part_id) != Some(&epoch) {
                return;
            }
            match state.queue.remove(&stream_part_id) {
                Some(queued) => {
                    state.applied.insert(stream_part_id.clone(), queued.instruction.counter);
                    next = queued;
                }
                None => {
                    state.running.remove(&stream_part_id);
                    return;
                }
            }
        }
    }
}
