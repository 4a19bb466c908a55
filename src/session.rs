//! # Sessions and Operation Handlers
//!
//! A [`Session`] is one process's opening of the rendezvous facility —
//! the Rust face of the character-device file handle. Every operation of
//! the QNX surface (`ChannelCreate` … `MsgRead`) is a method here,
//! running in the caller's thread; blocking operations take a
//! [`Wait`](crate::Wait) policy.
//!
//! ## Send/receive/reply flow
//!
//! `msg_send` resolves its connection, enqueues a message record on the
//! target channel, and blocks on the record until a replier finishes it.
//! `msg_receive` dequeues a record, copies the payload out, and parks
//! the record in the caller's pending registry under its rcvid.
//! `msg_reply`/`msg_error` release the pending record, install the
//! result, and wake the sender.
//!
//! ## The abort interlock
//!
//! When a blocked sender wakes for a timeout or an interrupt it must
//! revoke its record without yanking it out from under a receiver:
//!
//! 1. unlink from the channel queue — if that succeeds nobody ever saw
//!    the message and the abort cause is the result;
//! 2. otherwise wait until the record leaves RECEIVING (the receiver is
//!    holding it between dequeue and pending-insert);
//! 3. then race the replier for the pending entry: winning the
//!    `release_pending` means no reply was installed and the abort cause
//!    stands; losing means a completion is en route, so adopt its
//!    status.
//!
//! If the receiving process disappears instead, its teardown finishes
//! the record with a receiver-gone status; the sender adopts that.
//!
//! ## Identity guard
//!
//! The session captures the opening OS process id. After a fork the
//! child inherits the handle but was never registered; every operation
//! it attempts fails with `NoSpace`.

use crate::driver::DriverState;
use crate::error::{Error, Result};
use crate::iovec;
use crate::message::{MsgInfo, MsgPayload, MsgRecord, Pulse, SendWake, MSG_FLAG_NOREPLY};
use crate::process::ProcessEntry;
use crate::wait::Wait;
use crate::{Chid, Coid, Pid, Rcvid};
use std::sync::Arc;
use tracing::debug;

/// One process's live opening of the rendezvous driver.
///
/// Dropping the session is device-close: the process entry is
/// unregistered, owned channels are drained, and every pending sender
/// is completed with a receiver-gone status.
#[derive(Debug)]
pub struct Session {
    state: Arc<DriverState>,
    entry: Arc<ProcessEntry>,
    host_pid: u32,
}

impl Session {
    pub(crate) fn new(state: Arc<DriverState>, entry: Arc<ProcessEntry>) -> Self {
        Self {
            state,
            entry,
            host_pid: std::process::id(),
        }
    }

    /// Pid this session was opened for
    pub fn pid(&self) -> Pid {
        self.entry.pid()
    }

    /// Reject callers that inherited the handle across a fork
    fn check_identity(&self) -> Result<()> {
        if std::process::id() != self.host_pid {
            return Err(Error::NoSpace);
        }
        Ok(())
    }

    /// Create a channel and return its chid.
    ///
    /// Flags are accepted for surface compatibility and stored with the
    /// channel; none change behavior on a single host.
    pub fn channel_create(&self, flags: u32) -> Result<Chid> {
        self.check_identity()?;
        Ok(self.entry.add_channel(flags))
    }

    /// Destroy a channel, completing every queued sender with
    /// `BadDescriptor`
    pub fn channel_destroy(&self, chid: Chid) -> Result<()> {
        self.check_identity()?;
        self.entry.remove_channel(chid)
    }

    /// Attach a connection to `(pid, chid)` and return its coid.
    ///
    /// The target channel does not have to exist yet; a dangling
    /// connection fails at send time instead.
    pub fn connect_attach(&self, pid: Pid, chid: Chid) -> Result<Coid> {
        self.check_identity()?;
        Ok(self.entry.add_connection(pid, chid))
    }

    /// Detach a connection
    pub fn connect_detach(&self, coid: Coid) -> Result<()> {
        self.check_identity()?;
        self.entry.remove_connection(coid)
    }

    /// Send `msg` and block until the reply lands in `reply`.
    ///
    /// On success the replier-installed status (≥ 0) is returned and
    /// `min(reply_len, reply.len())` bytes are copied into `reply`.
    /// Negative statuses installed through `msg_error` surface as typed
    /// errors, as do timeout, interruption, and a vanished receiver.
    pub fn msg_send(
        &self,
        coid: Coid,
        msg: &[u8],
        reply: &mut [u8],
        wait: Wait<'_>,
    ) -> Result<i32> {
        self.check_identity()?;
        let (status, bytes) = self.send_message(coid, msg.to_vec(), reply.len(), &wait)?;
        let take = bytes.len().min(reply.len());
        reply[..take].copy_from_slice(&bytes[..take]);
        Ok(status)
    }

    /// Scatter/gather variant of [`Session::msg_send`]
    pub fn msg_sendv(
        &self,
        coid: Coid,
        msg: &[&[u8]],
        reply: &mut [&mut [u8]],
        wait: Wait<'_>,
    ) -> Result<i32> {
        self.check_identity()?;
        let input = iovec::gather(msg);
        let capacity = iovec::total_capacity(reply);
        let (status, bytes) = self.send_message(coid, input, capacity, &wait)?;
        iovec::scatter(&bytes, reply);
        Ok(status)
    }

    /// Send without awaiting a reply.
    ///
    /// The receiver observes a real rcvid with the NOREPLY flag set, but
    /// the record never enters its pending registry: a later
    /// `msg_reply`/`msg_error` on that rcvid fails with `NotFound`.
    /// Returns as soon as the message is queued.
    pub fn msg_send_noreply(&self, coid: Coid, msg: &[u8]) -> Result<()> {
        self.check_identity()?;
        let (target_pid, channel) = self.resolve(coid)?;
        let record = MsgRecord::message(
            self.state.next_rcvid(),
            self.entry.pid(),
            target_pid,
            coid,
            msg.to_vec(),
            0,
            true,
        );
        debug!(coid, rcvid = record.rcvid(), "msg_send_noreply");
        channel.enqueue(record)
    }

    /// Fire a pulse through `coid`; never blocks
    pub fn msg_send_pulse(&self, coid: Coid, code: i8, value: i32) -> Result<()> {
        self.check_identity()?;
        let (target_pid, channel) = self.resolve(coid)?;
        let pulse = Pulse {
            code,
            scoid: coid,
            value,
        };
        debug!(coid, code, value, "msg_send_pulse");
        channel.enqueue(MsgRecord::pulse(self.entry.pid(), target_pid, pulse))
    }

    /// Block until a message or pulse arrives on `chid`.
    ///
    /// For a message, up to `buf.len()` payload bytes are copied out,
    /// the record moves to the pending registry, and the returned rcvid
    /// names it for `msg_reply`/`msg_error`/`msg_read`. For a pulse the
    /// returned rcvid is 0 and `buf` holds the encoded pulse, which
    /// needs at least [`PULSE_WIRE_LEN`](crate::PULSE_WIRE_LEN) bytes of
    /// room. [`MsgInfo`] describes the sender either way.
    pub fn msg_receive(
        &self,
        chid: Chid,
        buf: &mut [u8],
        wait: Wait<'_>,
    ) -> Result<(Rcvid, MsgInfo)> {
        self.check_identity()?;
        let channel = self.entry.find_channel(chid).ok_or(Error::BadDescriptor)?;
        let record = crate::channel::Channel::dequeue(&channel, &wait)?;

        let mut info = MsgInfo {
            pid: record.sender_pid(),
            chid,
            ..MsgInfo::default()
        };

        let rcvid = record.rcvid();
        let noreply = match record.payload() {
            MsgPayload::Pulse(pulse) => {
                info.scoid = pulse.scoid;
                info.coid = pulse.scoid;
                info.msglen = crate::PULSE_WIRE_LEN;
                info.srcmsglen = crate::PULSE_WIRE_LEN;
                if buf.len() < crate::PULSE_WIRE_LEN {
                    return Err(Error::Fault);
                }
                pulse.encode_into(buf);
                debug!(chid, "pulse received");
                return Ok((0, info));
            }
            MsgPayload::Message {
                input,
                sender_coid,
                reply_capacity,
                noreply,
            } => {
                info.scoid = *sender_coid;
                info.coid = *sender_coid;
                info.msglen = input.len();
                info.srcmsglen = input.len();
                info.dstmsglen = *reply_capacity;

                let take = input.len().min(buf.len());
                buf[..take].copy_from_slice(&input[..take]);
                *noreply
            }
        };

        if noreply {
            info.flags |= MSG_FLAG_NOREPLY;
            debug!(chid, rcvid, "no-reply message received");
        } else {
            self.entry.add_pending(record);
            debug!(chid, rcvid, "message received, pending reply");
        }
        Ok((rcvid, info))
    }

    /// Reply to a pending message and wake its sender.
    ///
    /// When the sender offered reply room and `reply` carries bytes, the
    /// installed status is `min(status, reply.len())`; otherwise the
    /// status passes through untouched. The sender-side copy clamps to
    /// its own capacity.
    pub fn msg_reply(&self, rcvid: Rcvid, status: i32, reply: &[u8]) -> Result<()> {
        self.check_identity()?;
        let record = self.entry.release_pending(rcvid).ok_or(Error::NotFound)?;
        let (status, bytes) = if record.reply_capacity() > 0 && !reply.is_empty() {
            (status.min(reply.len() as i32), reply.to_vec())
        } else {
            (status, Vec::new())
        };
        debug!(rcvid, status, "msg_reply");
        record.finish(status, bytes);
        Ok(())
    }

    /// Fail a pending message: the sender observes `-|error|`
    pub fn msg_error(&self, rcvid: Rcvid, error: i32) -> Result<()> {
        self.check_identity()?;
        let record = self.entry.release_pending(rcvid).ok_or(Error::NotFound)?;
        let status = if error < 0 { error } else { -error };
        debug!(rcvid, status, "msg_error");
        record.finish(status, Vec::new());
        Ok(())
    }

    /// Copy part of a pending message's payload, starting at `offset`.
    ///
    /// Lets a receiver with a small receive buffer pull the rest of a
    /// large message before replying. Returns the bytes copied.
    pub fn msg_read(&self, rcvid: Rcvid, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.check_identity()?;
        self.entry.read_pending(rcvid, offset, buf)
    }

    /// Resolve a coid to its target channel, taking a channel reference
    fn resolve(&self, coid: Coid) -> Result<(Pid, Arc<crate::channel::Channel>)> {
        let conn = self.entry.find_connection(coid).ok_or(Error::BadDescriptor)?;
        let channel = self
            .state
            .find_channel(conn.pid, conn.chid)
            .ok_or(Error::BadDescriptor)?;
        Ok((conn.pid, channel))
    }

    /// Enqueue-and-block core shared by `msg_send` and `msg_sendv`;
    /// returns the final status and the reply bytes to scatter
    fn send_message(
        &self,
        coid: Coid,
        input: Vec<u8>,
        reply_capacity: usize,
        wait: &Wait<'_>,
    ) -> Result<(i32, Vec<u8>)> {
        let (target_pid, channel) = self.resolve(coid)?;
        let record = MsgRecord::message(
            self.state.next_rcvid(),
            self.entry.pid(),
            target_pid,
            coid,
            input,
            reply_capacity,
            false,
        );
        channel.enqueue(Arc::clone(&record))?;
        debug!(coid, rcvid = record.rcvid(), "msg_send queued, blocking");

        match MsgRecord::wait_reply(&record, wait) {
            SendWake::Finished(_) => Self::completed(&record),
            SendWake::TimedOut => self.abort_send(&channel, &record, Error::TimedOut),
            SendWake::Interrupted => self.abort_send(&channel, &record, Error::Interrupted),
        }
    }

    /// Revoke a record after a timeout or interrupt without racing the
    /// receiver's ownership; see the module docs for the interlock.
    fn abort_send(
        &self,
        channel: &crate::channel::Channel,
        record: &Arc<MsgRecord>,
        cause: Error,
    ) -> Result<(i32, Vec<u8>)> {
        if channel.remove(record.rcvid()).is_some() {
            // never observed by any receiver
            debug!(rcvid = record.rcvid(), ?cause, "send aborted while queued");
            return Err(cause);
        }

        match record.wait_received() {
            Some(_) => Self::completed(record),
            None => {
                if let Some(receiver) = self.state.find_process(record.receiver_pid()) {
                    if let Some(revoked) = receiver.release_pending(record.rcvid()) {
                        // the abort won: no reply was installed before the
                        // record left the pending registry
                        debug_assert!(Arc::ptr_eq(&revoked, record));
                        revoked.finish(cause.errno(), Vec::new());
                        debug!(rcvid = record.rcvid(), ?cause, "send aborted while pending");
                        return Err(cause);
                    }
                }
                // a reply, error, or teardown owns the record; its
                // completion is imminent
                record.await_finished();
                Self::completed(record)
            }
        }
    }

    fn completed(record: &Arc<MsgRecord>) -> Result<(i32, Vec<u8>)> {
        let (status, reply) = record.take_finished();
        if status < 0 {
            Err(Error::from_status(status))
        } else {
            Ok((status, reply))
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // a forked child holds a memory copy of the handle but was never
        // registered; only the opening process runs the teardown
        if std::process::id() != self.host_pid {
            return;
        }
        self.state.unregister(self.entry.pid());
        self.entry.teardown();
    }
}
