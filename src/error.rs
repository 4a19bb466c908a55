//! # Error Taxonomy
//!
//! Typed failures for every rendezvous operation, together with the
//! negative-errno convention spoken at the transport seam. The library
//! surface returns `Result<_, Error>`; a character-device style binding
//! flattens that back into a signed integer with [`Error::errno`], and a
//! replier-installed status travels the other way through
//! [`Error::from_status`].

use thiserror::Error;

/// Result alias used throughout the rendezvous core
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by channel, connection and message operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Unknown coid/chid, channel closed or destroyed, or peer process gone
    #[error("bad descriptor")]
    BadDescriptor,

    /// No in-flight message with the given rcvid
    #[error("no such message")]
    NotFound,

    /// Send or receive deadline elapsed
    #[error("operation timed out")]
    TimedOut,

    /// The blocking wait was cancelled through an interrupt token
    #[error("interrupted")]
    Interrupted,

    /// Payload could not be delivered into the caller's buffer
    #[error("bad address")]
    Fault,

    /// Resource accounting failure
    #[error("out of memory")]
    NoMemory,

    /// Offset out of range or nil argument
    #[error("invalid argument")]
    Invalid,

    /// Second open by the same pid, or an operation after fork
    #[error("no space for process entry")]
    NoSpace,

    /// Negative status installed by the replier via MsgReply or MsgError
    #[error("peer replied with status {0}")]
    Status(i32),
}

impl Error {
    /// Negative errno-style code for the transport binding.
    ///
    /// Matches the codes the original character-device surface returned
    /// for the same conditions.
    pub fn errno(&self) -> i32 {
        match self {
            Error::BadDescriptor => -libc::EBADF,
            Error::NotFound => -libc::ESRCH,
            Error::TimedOut => -libc::ETIMEDOUT,
            Error::Interrupted => -libc::EINTR,
            Error::Fault => -libc::EFAULT,
            Error::NoMemory => -libc::ENOMEM,
            Error::Invalid => -libc::EINVAL,
            Error::NoSpace => -libc::ENOSPC,
            Error::Status(n) => *n,
        }
    }

    /// Map a negative status observed by a sender back into the taxonomy.
    ///
    /// Statuses installed by `msg_error` carry whatever errno the replier
    /// chose; the well-known codes fold back into their own variants so a
    /// receiver-gone completion reads as `BadDescriptor` on both sides.
    pub fn from_status(status: i32) -> Self {
        debug_assert!(status < 0, "only negative statuses are errors");
        match -status {
            libc::EBADF => Error::BadDescriptor,
            libc::ESRCH => Error::NotFound,
            libc::ETIMEDOUT => Error::TimedOut,
            libc::EINTR => Error::Interrupted,
            libc::EFAULT => Error::Fault,
            libc::ENOMEM => Error::NoMemory,
            libc::ENOSPC => Error::NoSpace,
            _ => Error::Status(status),
        }
    }
}
