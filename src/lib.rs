//! # Rendezvous IPC
//!
//! QNX-style synchronous message passing implemented in Rust. This library
//! provides channels, connections, blocking send/receive/reply rendezvous,
//! and fire-and-forget pulses between cooperating processes.
//!
//! ## Core Model
//!
//! A sender attaches a connection to a `(pid, chid)` pair and blocks in
//! [`Session::msg_send`] until the channel owner receives the message and
//! replies (or errors, times out, or goes away). A receiver blocks in
//! [`Session::msg_receive`] until a message or pulse arrives. Between
//! receive and reply the message is *pending* and can be inspected with
//! [`Session::msg_read`].
//!
//! ```
//! use ipc_rendezvous::{Driver, Wait};
//!
//! # fn main() -> Result<(), ipc_rendezvous::Error> {
//! let driver = Driver::new();
//! let session = driver.open(100)?;
//!
//! let chid = session.channel_create(0)?;
//! let coid = session.connect_attach(100, chid)?;
//!
//! session.msg_send_pulse(coid, 7, 42)?;
//!
//! let mut buf = [0u8; 16];
//! let (rcvid, info) = session.msg_receive(chid, &mut buf, Wait::forever())?;
//! assert_eq!(rcvid, 0); // pulse
//! assert_eq!(info.pid, 100);
//! # Ok(())
//! # }
//! ```

pub mod bench;
pub mod channel;
pub mod cli;
pub mod driver;
pub mod error;
pub mod iovec;
pub mod message;
pub mod metrics;
pub mod process;
pub mod session;
pub mod wait;

pub use cli::Args;
pub use driver::Driver;
pub use error::Error;
pub use message::{MsgInfo, Pulse, MSG_FLAG_NOREPLY, PULSE_WIRE_LEN};
pub use session::Session;
pub use wait::{Interrupt, Wait};

/// The current version of the rendezvous IPC crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process identifier as presented by the transport binding
pub type Pid = u32;

/// Channel identifier, unique within a process
pub type Chid = i32;

/// Connection identifier, unique within a process
pub type Coid = i32;

/// Receive identifier, unique across the life of the driver; 0 denotes a pulse
pub type Rcvid = u64;

/// Default configuration values
pub mod defaults {
    /// Inline scatter/gather parts before spilling to the heap
    pub const MAX_IOVEC_LEN: usize = 8;

    /// Default benchmark message size in bytes
    pub const MESSAGE_SIZE: usize = 1024;

    /// Default benchmark message count
    pub const MSG_COUNT: usize = 10000;

    /// Default benchmark warmup iterations
    pub const WARMUP_ITERATIONS: usize = 1000;

    /// Default benchmark output file name
    pub const OUTPUT_FILE: &str = "rendezvous_results.json";
}
