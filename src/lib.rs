//! Thread-safe boolean flags with blocking, cancel-aware waits.
//!
//! This crate provides one building-block primitive in two variants: a
//! boolean that many threads may set and read atomically, and that any
//! number of threads may block on until it becomes `true`.
//!
//! - [`Flag`]: level-triggered, condition-variable based. Any waiter,
//!   already parked or newly arriving, unblocks while the value is `true`.
//!   This is the recommended default.
//! - [`PulseFlag`]: edge-triggered, built on a closable broadcast channel
//!   that is replaced on each false→true transition. `set(false)` re-arms
//!   the flag for the next cycle.
//!
//! Both variants accept an optional [`CancelToken`] so a blocked wait can
//! be abandoned by an explicit trigger or a deadline.
//!
//! # Example
//!
//! ```
//! use std::thread;
//! use waitflag::Flag;
//!
//! let ready = Flag::new();
//! let handle = {
//!     let ready = ready.clone();
//!     thread::spawn(move || ready.wait())
//! };
//! ready.set(true);
//! assert!(handle.join().unwrap());
//! ```
//!
//! # Cancellation
//!
//! ```
//! use std::time::Duration;
//! use waitflag::{CancelToken, Flag};
//!
//! let flag = Flag::new();
//! let token = CancelToken::with_timeout(Duration::from_millis(50));
//! // Nobody sets the flag; the wait returns `false` at the deadline.
//! assert!(!flag.wait_with(&token));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod flag;
pub mod pulse;

pub use cancel::CancelToken;
pub use flag::Flag;
pub use pulse::PulseFlag;
