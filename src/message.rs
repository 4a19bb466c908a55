//! # Message Records and the Rendezvous Lifecycle
//!
//! A [`MsgRecord`] tracks one in-flight send from enqueue to completion.
//! Records are shared (`Arc`) between the blocked sender, the channel
//! queue, and the receiver's pending registry; which collection currently
//! holds the record determines who may act on it next.
//!
//! ## Lifecycle
//!
//! ```text
//! (new) ──enqueue──▶ WAITING ──dequeue──▶ RECEIVING ──add_pending──▶ PENDING ──reply/error──▶ FINISHED
//!                       │                     │
//!                       │                     └── pulse / no-reply: dropped by the receiver
//!                       └── sender abort: unlinked from the queue, never observed
//! ```
//!
//! Transitions are monotone; there are no back-edges. The `state`,
//! `status` and `reply` fields live in one mutex-guarded cell paired with
//! a condition variable, so a sender observing `FINISHED` is guaranteed
//! to see the status and reply bytes the replier installed — the cell is
//! the release/acquire handoff point between the two sides.

use crate::wait::{Wait, WaitTarget};
use crate::{Chid, Coid, Pid, Rcvid};
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Flag set in [`MsgInfo::flags`] when the sender does not await a reply
pub const MSG_FLAG_NOREPLY: u32 = 0x1;

/// Bytes a pulse occupies in the receiver's buffer: code, scoid, value
pub const PULSE_WIRE_LEN: usize = 1 + 4 + 4;

/// Small fire-and-forget notification carried instead of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// 8-bit signed code chosen by the sender
    pub code: i8,
    /// Connection id the pulse was sent through, as seen by the sender
    pub scoid: Coid,
    /// 32-bit signed value chosen by the sender
    pub value: i32,
}

impl Pulse {
    /// Write the wire representation into `buf`.
    ///
    /// `buf` must hold at least [`PULSE_WIRE_LEN`] bytes; the layout is
    /// little-endian `code | scoid | value`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0] = self.code as u8;
        buf[1..5].copy_from_slice(&self.scoid.to_le_bytes());
        buf[5..9].copy_from_slice(&self.value.to_le_bytes());
    }

    /// Reconstruct a pulse from its wire representation
    pub fn decode_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < PULSE_WIRE_LEN {
            return None;
        }
        let mut scoid = [0u8; 4];
        let mut value = [0u8; 4];
        scoid.copy_from_slice(&buf[1..5]);
        value.copy_from_slice(&buf[5..9]);
        Some(Self {
            code: buf[0] as i8,
            scoid: Coid::from_le_bytes(scoid),
            value: i32::from_le_bytes(value),
        })
    }
}

/// Reply metadata filled in by a successful receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsgInfo {
    /// Node id; always 0 on a single host
    pub nd: u32,
    /// Sending process
    pub pid: Pid,
    /// Channel the message arrived on
    pub chid: Chid,
    /// Sender-side connection id
    pub scoid: Coid,
    /// Sender-side connection id (same as `scoid` on a single host)
    pub coid: Coid,
    /// Bytes the sender offered
    pub msglen: usize,
    /// Bytes the sender offered (no partial transfers on a single host)
    pub srcmsglen: usize,
    /// Reply capacity the sender is blocked on
    pub dstmsglen: usize,
    /// `MSG_FLAG_*` bits
    pub flags: u32,
}

/// Where a record stands in its life, monotone and never reversed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MsgState {
    /// On a channel queue, not yet seen by any receiver
    Waiting,
    /// On the receiver's stack between dequeue and pending-insert
    Receiving,
    /// Received; awaiting reply or error
    Pending,
    /// Completed; `status` (and possibly `reply`) are valid
    Finished,
}

/// What a record carries: a full request or a pulse
#[derive(Debug)]
pub(crate) enum MsgPayload {
    Message {
        /// Gathered send bytes, immutable for the life of the record
        input: Vec<u8>,
        /// Connection the sender used, reported back through `MsgInfo`
        sender_coid: Coid,
        /// Total capacity of the sender's reply buffers
        reply_capacity: usize,
        /// Sender returned immediately and must never be woken
        noreply: bool,
    },
    Pulse(Pulse),
}

#[derive(Debug)]
struct MsgCell {
    state: MsgState,
    status: Option<i32>,
    reply: Vec<u8>,
}

/// Outcome of the sender's blocking reply wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendWake {
    /// Replier finished the record; status adopted
    Finished(i32),
    /// Deadline elapsed before completion
    TimedOut,
    /// The wait was cancelled through an interrupt token
    Interrupted,
}

/// One in-flight send.
///
/// Immutable identity and payload fields are set before the record is
/// shared; everything mutable lives in the guarded cell.
pub struct MsgRecord {
    rcvid: Rcvid,
    sender_pid: Pid,
    receiver_pid: Pid,
    payload: MsgPayload,
    cell: Mutex<MsgCell>,
    cond: Condvar,
}

impl MsgRecord {
    /// New message record in the WAITING state
    pub(crate) fn message(
        rcvid: Rcvid,
        sender_pid: Pid,
        receiver_pid: Pid,
        sender_coid: Coid,
        input: Vec<u8>,
        reply_capacity: usize,
        noreply: bool,
    ) -> Arc<Self> {
        debug_assert!(rcvid > 0, "message records need a real rcvid");
        Arc::new(Self {
            rcvid,
            sender_pid,
            receiver_pid,
            payload: MsgPayload::Message {
                input,
                sender_coid,
                reply_capacity,
                noreply,
            },
            cell: Mutex::new(MsgCell {
                state: MsgState::Waiting,
                status: None,
                reply: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    /// New pulse record; rcvid 0 marks it as reply-less
    pub(crate) fn pulse(sender_pid: Pid, receiver_pid: Pid, pulse: Pulse) -> Arc<Self> {
        Arc::new(Self {
            rcvid: 0,
            sender_pid,
            receiver_pid,
            payload: MsgPayload::Pulse(pulse),
            cell: Mutex::new(MsgCell {
                state: MsgState::Waiting,
                status: None,
                reply: Vec::new(),
            }),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn rcvid(&self) -> Rcvid {
        self.rcvid
    }

    pub(crate) fn sender_pid(&self) -> Pid {
        self.sender_pid
    }

    pub(crate) fn receiver_pid(&self) -> Pid {
        self.receiver_pid
    }

    pub(crate) fn payload(&self) -> &MsgPayload {
        &self.payload
    }

    /// Gathered input bytes, for receive copy-out and `msg_read`
    pub(crate) fn msg_input(&self) -> Option<&[u8]> {
        match &self.payload {
            MsgPayload::Message { input, .. } => Some(input),
            MsgPayload::Pulse(_) => None,
        }
    }

    /// Reply capacity the sender is blocked on (0 for pulses)
    pub(crate) fn reply_capacity(&self) -> usize {
        match &self.payload {
            MsgPayload::Message { reply_capacity, .. } => *reply_capacity,
            MsgPayload::Pulse(_) => 0,
        }
    }

    /// Whether the sender awaits a reply for this record
    pub(crate) fn awaits_reply(&self) -> bool {
        match &self.payload {
            MsgPayload::Message { noreply, .. } => !noreply,
            MsgPayload::Pulse(_) => false,
        }
    }

    /// WAITING → RECEIVING, performed by the receiver while it still
    /// holds the channel lock
    pub(crate) fn mark_receiving(&self) {
        let mut cell = self.cell.lock();
        debug_assert_eq!(cell.state, MsgState::Waiting);
        cell.state = MsgState::Receiving;
    }

    /// RECEIVING → PENDING, performed under the receiver's pending lock.
    ///
    /// Notifies the condvar: a sender mid-abort may be parked waiting
    /// for the record to leave RECEIVING.
    pub(crate) fn mark_pending(&self) {
        let mut cell = self.cell.lock();
        debug_assert_eq!(cell.state, MsgState::Receiving);
        cell.state = MsgState::Pending;
        self.cond.notify_all();
    }

    /// Terminal transition: install the result and wake the sender.
    ///
    /// Valid from any live state; channel teardown finishes records that
    /// are still WAITING.
    pub(crate) fn finish(&self, status: i32, reply: Vec<u8>) {
        let mut cell = self.cell.lock();
        debug_assert_ne!(cell.state, MsgState::Finished);
        cell.state = MsgState::Finished;
        cell.status = Some(status);
        cell.reply = reply;
        self.cond.notify_all();
    }

    /// Status and reply bytes of a FINISHED record, consumed by the sender
    pub(crate) fn take_finished(&self) -> (i32, Vec<u8>) {
        let mut cell = self.cell.lock();
        debug_assert_eq!(cell.state, MsgState::Finished);
        (cell.status.unwrap_or(0), std::mem::take(&mut cell.reply))
    }

    /// Block the sender until `record` is FINISHED, the deadline
    /// passes, or the wait is interrupted.
    ///
    /// Wake causes are resolved in the order timeout, interrupt, normal
    /// completion — except that an already-FINISHED record always wins,
    /// since its reply has been fully installed. Takes the `Arc` so the
    /// wait can register as an interrupt target.
    pub(crate) fn wait_reply(record: &Arc<Self>, wait: &Wait<'_>) -> SendWake {
        let _guard = wait.interrupt().map(|interrupt| {
            let record_dyn: Arc<dyn WaitTarget> = record.clone();
            let target: Weak<dyn WaitTarget> = Arc::downgrade(&record_dyn);
            interrupt.attach(target)
        });
        let deadline = wait.deadline();

        let mut cell = record.cell.lock();
        loop {
            if cell.state == MsgState::Finished {
                return SendWake::Finished(cell.status.unwrap_or(0));
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return SendWake::TimedOut;
                }
                if wait.interrupted() {
                    return SendWake::Interrupted;
                }
                record.cond.wait_until(&mut cell, deadline);
            } else {
                if wait.interrupted() {
                    return SendWake::Interrupted;
                }
                record.cond.wait(&mut cell);
            }
        }
    }

    /// Abort-path wait: park until the receiver is no longer holding the
    /// record on its stack.
    ///
    /// Returns the final status when the record reached FINISHED in the
    /// meantime, or `None` when it sits in the pending registry. A
    /// record still WAITING here belongs to a channel drain that is
    /// about to finish it, so that state is waited out as well.
    pub(crate) fn wait_received(&self) -> Option<i32> {
        let mut cell = self.cell.lock();
        loop {
            match cell.state {
                MsgState::Waiting | MsgState::Receiving => self.cond.wait(&mut cell),
                MsgState::Pending => return None,
                MsgState::Finished => return Some(cell.status.unwrap_or(0)),
            }
        }
    }

    /// Block until the replier (or teardown) finishes the record
    pub(crate) fn await_finished(&self) -> i32 {
        let mut cell = self.cell.lock();
        while cell.state != MsgState::Finished {
            self.cond.wait(&mut cell);
        }
        cell.status.unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn state_for_test(&self) -> MsgState {
        self.cell.lock().state
    }
}

impl WaitTarget for MsgRecord {
    fn wake(&self) {
        let _cell = self.cell.lock();
        self.cond.notify_all();
    }
}

impl std::fmt::Debug for MsgRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = self.cell.lock();
        f.debug_struct("MsgRecord")
            .field("rcvid", &self.rcvid)
            .field("sender_pid", &self.sender_pid)
            .field("receiver_pid", &self.receiver_pid)
            .field("state", &cell.state)
            .field("status", &cell.status)
            .finish()
    }
}
