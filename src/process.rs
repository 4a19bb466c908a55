//! # Process Entries
//!
//! One [`ProcessEntry`] exists per opening of the facility and holds
//! everything the process owns: its channels, its connections, and the
//! *pending* registry of message records that have been received but not
//! yet replied to. Entries are shared by lookup (`Arc`), so a peer
//! mid-operation keeps an entry alive even while its process is tearing
//! down; teardown unregisters the entry first, then force-completes
//! whatever is left so no sender stays blocked.

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::message::MsgRecord;
use crate::{Chid, Coid, Pid, Rcvid};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Sender-side handle resolving a local coid to a `(pid, chid)` target.
///
/// A connection may outlive the channel it points at; the dangling case
/// surfaces as `BadDescriptor` at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Connection {
    pub pid: Pid,
    pub chid: Chid,
}

/// Per-process state: channels, connections, pending records
#[derive(Debug)]
pub(crate) struct ProcessEntry {
    pid: Pid,
    next_chid: AtomicI32,
    next_coid: AtomicI32,
    channels: Mutex<HashMap<Chid, Arc<Channel>>>,
    connections: Mutex<HashMap<Coid, Connection>>,
    pending: Mutex<HashMap<Rcvid, Arc<MsgRecord>>>,
}

impl ProcessEntry {
    pub(crate) fn new(pid: Pid) -> Arc<Self> {
        Arc::new(Self {
            pid,
            next_chid: AtomicI32::new(1),
            next_coid: AtomicI32::new(1),
            channels: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }

    /// Install a fresh channel and hand back its chid
    pub(crate) fn add_channel(&self, flags: u32) -> Chid {
        let chid = self.next_chid.fetch_add(1, Ordering::Relaxed);
        let channel = Channel::new(self.pid, chid, flags);
        self.channels.lock().insert(chid, channel);
        debug!(pid = self.pid, chid, "channel created");
        chid
    }

    /// Unlink a channel and complete everything still queued on it
    pub(crate) fn remove_channel(&self, chid: Chid) -> Result<()> {
        let channel = self
            .channels
            .lock()
            .remove(&chid)
            .ok_or(Error::NotFound)?;
        channel.drain_for_close();
        debug!(pid = self.pid, chid, "channel destroyed");
        Ok(())
    }

    /// Install a connection to `(pid, chid)`; the target channel does
    /// not have to exist yet
    pub(crate) fn add_connection(&self, pid: Pid, chid: Chid) -> Coid {
        let coid = self.next_coid.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().insert(coid, Connection { pid, chid });
        debug!(pid = self.pid, coid, target_pid = pid, target_chid = chid, "connection attached");
        coid
    }

    /// Unlink a connection
    pub(crate) fn remove_connection(&self, coid: Coid) -> Result<()> {
        self.connections
            .lock()
            .remove(&coid)
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    /// Reference-counted channel lookup
    pub(crate) fn find_channel(&self, chid: Chid) -> Option<Arc<Channel>> {
        self.channels.lock().get(&chid).cloned()
    }

    /// Connection lookup; connections are small value types and copied out
    pub(crate) fn find_connection(&self, coid: Coid) -> Option<Connection> {
        self.connections.lock().get(&coid).copied()
    }

    /// Park a received record until its reply.
    ///
    /// The record enters in RECEIVING and leaves the call in PENDING;
    /// the transition happens under the pending lock so the sender-abort
    /// path can never observe the record in neither place.
    pub(crate) fn add_pending(&self, record: Arc<MsgRecord>) {
        let mut pending = self.pending.lock();
        record.mark_pending();
        pending.insert(record.rcvid(), record);
    }

    /// Remove and return the pending record for `rcvid`.
    ///
    /// Used by reply, error, and the sender-abort race; whoever gets the
    /// record out of the map owns its completion.
    pub(crate) fn release_pending(&self, rcvid: Rcvid) -> Option<Arc<MsgRecord>> {
        self.pending.lock().remove(&rcvid)
    }

    /// Copy out part of a pending record's input without consuming it.
    ///
    /// `offset` may equal the input length (zero bytes); anything past
    /// that is `Invalid`. An unknown rcvid is `NotFound`.
    pub(crate) fn read_pending(&self, rcvid: Rcvid, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let pending = self.pending.lock();
        let record = pending.get(&rcvid).ok_or(Error::NotFound)?;
        let input = record.msg_input().ok_or(Error::NotFound)?;
        if offset > input.len() {
            return Err(Error::Invalid);
        }
        let take = (input.len() - offset).min(buf.len());
        buf[..take].copy_from_slice(&input[offset..offset + take]);
        Ok(take)
    }

    /// Device-close teardown, after the entry is unregistered:
    /// drain-close every channel, force-finish every pending record,
    /// drop the connections.
    pub(crate) fn teardown(&self) {
        let channels: Vec<Arc<Channel>> = {
            let mut map = self.channels.lock();
            map.drain().map(|(_, channel)| channel).collect()
        };
        for channel in channels {
            channel.drain_for_close();
        }

        let orphaned: Vec<Arc<MsgRecord>> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, record)| record).collect()
        };
        for record in orphaned {
            record.finish(Error::BadDescriptor.errno(), Vec::new());
        }

        self.connections.lock().clear();
        info!(pid = self.pid, "process entry torn down");
    }

    #[cfg(test)]
    pub(crate) fn pending_len_for_test(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SendWake;
    use crate::wait::Wait;

    fn received_record(rcvid: Rcvid, payload: &[u8]) -> Arc<MsgRecord> {
        let record = MsgRecord::message(rcvid, 10, 20, 1, payload.to_vec(), 32, false);
        record.mark_receiving();
        record
    }

    /// Test chid and coid allocation is monotone from 1
    #[test]
    fn test_id_allocation() {
        let entry = ProcessEntry::new(20);
        assert_eq!(entry.add_channel(0), 1);
        assert_eq!(entry.add_channel(0), 2);
        assert_eq!(entry.add_connection(20, 1), 1);
        assert_eq!(entry.add_connection(20, 2), 2);
    }

    /// Test channel removal is observable and idempotent in failure
    #[test]
    fn test_remove_channel() {
        let entry = ProcessEntry::new(20);
        let chid = entry.add_channel(0);
        assert!(entry.find_channel(chid).is_some());
        entry.remove_channel(chid).unwrap();
        assert!(entry.find_channel(chid).is_none());
        assert_eq!(entry.remove_channel(chid).unwrap_err(), Error::NotFound);
    }

    /// Test connections resolve until detached
    #[test]
    fn test_connection_lifecycle() {
        let entry = ProcessEntry::new(10);
        let coid = entry.add_connection(20, 3);
        assert_eq!(
            entry.find_connection(coid),
            Some(Connection { pid: 20, chid: 3 })
        );
        entry.remove_connection(coid).unwrap();
        assert!(entry.find_connection(coid).is_none());
        assert_eq!(entry.remove_connection(coid).unwrap_err(), Error::NotFound);
    }

    /// Test pending insert/release pairs up by rcvid
    #[test]
    fn test_pending_registry() {
        let entry = ProcessEntry::new(20);
        let record = received_record(5, b"payload");
        entry.add_pending(Arc::clone(&record));

        assert!(entry.release_pending(99).is_none());
        let released = entry.release_pending(5).unwrap();
        assert!(Arc::ptr_eq(&released, &record));
        assert!(entry.release_pending(5).is_none());
    }

    /// Test partial reads out of a pending record
    #[test]
    fn test_read_pending_ranges() {
        let entry = ProcessEntry::new(20);
        entry.add_pending(received_record(7, b"abcdefgh"));

        let mut buf = [0u8; 4];
        assert_eq!(entry.read_pending(7, 2, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"cdef");

        assert_eq!(entry.read_pending(7, 6, &mut buf).unwrap(), 2);
        assert_eq!(entry.read_pending(7, 8, &mut buf).unwrap(), 0);
        assert_eq!(entry.read_pending(7, 9, &mut buf).unwrap_err(), Error::Invalid);
        assert_eq!(entry.read_pending(8, 0, &mut buf).unwrap_err(), Error::NotFound);
    }

    /// Test teardown completes pending senders with receiver-gone
    #[test]
    fn test_teardown_finishes_pending() {
        let entry = ProcessEntry::new(20);
        let record = received_record(9, b"stuck");
        entry.add_pending(Arc::clone(&record));
        entry.add_channel(0);

        entry.teardown();

        assert_eq!(entry.pending_len_for_test(), 0);
        assert_eq!(
            MsgRecord::wait_reply(&record, &Wait::immediate()),
            SendWake::Finished(-libc::EBADF)
        );
    }
}
