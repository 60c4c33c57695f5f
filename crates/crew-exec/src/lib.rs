//! `crew-exec`: submit shell commands to remote targets and poll them.
//!
//! ```text
//! Dispatcher ──send──▶ ExecChannel ◀──get_invocation── Poller
//!                          │
//!                   ProcessChannel  (sh -s locally, or over ssh)
//!                          │
//!                  InvocationRegistry
//! ```
//!
//! Channel errors become user-facing messages in exactly one place,
//! [`classify()`].

pub mod channel;
pub mod classify;
pub mod dispatcher;
pub mod error;
pub mod poller;
pub mod process;
pub mod registry;
pub mod types;

pub use channel::ExecChannel;
pub use classify::{classify, classify_message, UpstreamFailure, UpstreamKind};
pub use dispatcher::{Dispatcher, SubmitOptions};
pub use error::ExecError;
pub use poller::{FastPoll, Poller};
pub use process::{Launcher, ProcessChannel};
pub use types::{Invocation, InvocationStatus, PollResult, SendRequest};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ExecError>;
