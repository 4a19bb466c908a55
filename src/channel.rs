//! # Channels
//!
//! A channel is a FIFO of message records awaiting receive, owned by one
//! process and identified by a process-local `chid`. Senders enqueue and
//! block; receivers block on the channel's waiter condition and pull
//! records off the head in arrival order. Pulses and messages share the
//! same queue.
//!
//! Destruction flips a `closed` flag under the queue lock, so late
//! enqueues fail with `BadDescriptor` instead of stranding a sender, and
//! then completes every queued record with a receiver-gone status.

use crate::error::{Error, Result};
use crate::message::MsgRecord;
use crate::wait::{Wait, WaitTarget};
use crate::{Chid, Pid, Rcvid};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct ChannelQueue {
    records: VecDeque<Arc<MsgRecord>>,
    closed: bool,
}

/// One receive queue, shared by lookup through the driver registry
#[derive(Debug)]
pub(crate) struct Channel {
    owner: Pid,
    chid: Chid,
    flags: u32,
    queue: Mutex<ChannelQueue>,
    waiters: Condvar,
}

impl Channel {
    pub(crate) fn new(owner: Pid, chid: Chid, flags: u32) -> Arc<Self> {
        Arc::new(Self {
            owner,
            chid,
            flags,
            queue: Mutex::new(ChannelQueue {
                records: VecDeque::new(),
                closed: false,
            }),
            waiters: Condvar::new(),
        })
    }

    pub(crate) fn owner(&self) -> Pid {
        self.owner
    }

    pub(crate) fn chid(&self) -> Chid {
        self.chid
    }

    #[allow(dead_code)]
    pub(crate) fn flags(&self) -> u32 {
        self.flags
    }

    /// Append a record to the tail and wake one waiting receiver.
    ///
    /// The record must be in the WAITING state. Fails with
    /// `BadDescriptor` once destruction has begun.
    pub(crate) fn enqueue(&self, record: Arc<MsgRecord>) -> Result<()> {
        let mut queue = self.queue.lock();
        if queue.closed {
            return Err(Error::BadDescriptor);
        }
        queue.records.push_back(record);
        self.waiters.notify_one();
        Ok(())
    }

    /// Block until a record arrives, then take the head.
    ///
    /// The WAITING → RECEIVING flip happens while the queue lock is
    /// still held, so a sender abort that misses the record here is
    /// guaranteed to observe at least RECEIVING afterwards. Spurious
    /// wakes re-check the queue under the lock; an exhausted deadline
    /// with an empty queue is a timeout.
    pub(crate) fn dequeue(channel: &Arc<Self>, wait: &Wait<'_>) -> Result<Arc<MsgRecord>> {
        let _guard = wait.interrupt().map(|interrupt| {
            let channel_dyn: Arc<dyn WaitTarget> = channel.clone();
            let target: Weak<dyn WaitTarget> = Arc::downgrade(&channel_dyn);
            interrupt.attach(target)
        });
        let deadline = wait.deadline();

        let mut queue = channel.queue.lock();
        loop {
            if let Some(record) = queue.records.pop_front() {
                record.mark_receiving();
                return Ok(record);
            }
            if queue.closed {
                return Err(Error::BadDescriptor);
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::TimedOut);
                }
                if wait.interrupted() {
                    return Err(Error::Interrupted);
                }
                channel.waiters.wait_until(&mut queue, deadline);
            } else {
                if wait.interrupted() {
                    return Err(Error::Interrupted);
                }
                channel.waiters.wait(&mut queue);
            }
        }
    }

    /// Sender-abort path: unlink a still-queued record.
    ///
    /// O(n) scan; queues are short. Returns the record when the abort
    /// won the race against every receiver.
    pub(crate) fn remove(&self, rcvid: Rcvid) -> Option<Arc<MsgRecord>> {
        let mut queue = self.queue.lock();
        let position = queue
            .records
            .iter()
            .position(|record| record.rcvid() == rcvid)?;
        queue.records.remove(position)
    }

    /// Begin destruction: reject future enqueues, wake blocked
    /// receivers, and complete every queued record.
    ///
    /// Senders blocked on drained records wake with the receiver-gone
    /// status; pulse and no-reply records have nobody to wake and are
    /// dropped.
    pub(crate) fn drain_for_close(&self) {
        let drained: Vec<Arc<MsgRecord>> = {
            let mut queue = self.queue.lock();
            queue.closed = true;
            self.waiters.notify_all();
            queue.records.drain(..).collect()
        };

        debug!(
            chid = self.chid,
            owner = self.owner,
            drained = drained.len(),
            "channel drained for close"
        );

        for record in drained {
            if record.awaits_reply() {
                record.finish(Error::BadDescriptor.errno(), Vec::new());
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn queued_for_test(&self) -> usize {
        self.queue.lock().records.len()
    }
}

impl WaitTarget for Channel {
    fn wake(&self) {
        let _queue = self.queue.lock();
        self.waiters.notify_all();
    }
}
