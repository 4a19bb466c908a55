//! # Driver Registry
//!
//! The process-wide table mapping `pid → ProcessEntry`, the root through
//! which every cross-process lookup happens. The registry also owns the
//! global rcvid counter: receive ids are 64-bit and monotone for the
//! life of the driver, so a completed id is never handed out again.
//!
//! [`Driver::open`] is the device-open analog: it registers the calling
//! process and returns the [`Session`] all operations run through.
//! At most one entry may exist per pid; a second concurrent open fails
//! with `NoSpace`.

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::process::ProcessEntry;
use crate::session::Session;
use crate::{Chid, Pid, Rcvid};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub(crate) struct DriverState {
    processes: Mutex<HashMap<Pid, Arc<ProcessEntry>>>,
    next_rcvid: AtomicU64,
}

impl DriverState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            processes: Mutex::new(HashMap::new()),
            next_rcvid: AtomicU64::new(1),
        })
    }

    /// Globally unique receive id; never reused
    pub(crate) fn next_rcvid(&self) -> Rcvid {
        self.next_rcvid.fetch_add(1, Ordering::Relaxed)
    }

    /// Reference-counted entry lookup by pid
    pub(crate) fn find_process(&self, pid: Pid) -> Option<Arc<ProcessEntry>> {
        self.processes.lock().get(&pid).cloned()
    }

    /// Resolve a channel across processes through its owner's entry
    pub(crate) fn find_channel(&self, pid: Pid, chid: Chid) -> Option<Arc<Channel>> {
        let entry = self.find_process(pid)?;
        entry.find_channel(chid)
    }

    pub(crate) fn register(&self, pid: Pid) -> Result<Arc<ProcessEntry>> {
        let mut processes = self.processes.lock();
        if processes.contains_key(&pid) {
            return Err(Error::NoSpace);
        }
        let entry = ProcessEntry::new(pid);
        processes.insert(pid, Arc::clone(&entry));
        Ok(entry)
    }

    /// Unlink an entry so no new lookup can reach it; the caller runs
    /// the teardown on whatever it still holds
    pub(crate) fn unregister(&self, pid: Pid) -> Option<Arc<ProcessEntry>> {
        self.processes.lock().remove(&pid)
    }
}

/// The rendezvous facility itself.
///
/// Cloneable handle over shared driver state; typically one per host,
/// embedded in whatever transport exposes the facility to processes.
#[derive(Clone)]
pub struct Driver {
    state: Arc<DriverState>,
}

impl Driver {
    /// Create an empty driver with no registered processes
    pub fn new() -> Self {
        Self {
            state: DriverState::new(),
        }
    }

    /// Register `pid` and return its operating session.
    ///
    /// Device-open semantics: fails with `NoSpace` when the pid already
    /// has a live session. Dropping the session is device-close and
    /// tears the process entry down.
    pub fn open(&self, pid: Pid) -> Result<Session> {
        let entry = self.state.register(pid)?;
        info!(pid, "process opened rendezvous driver");
        Ok(Session::new(Arc::clone(&self.state), entry))
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}
