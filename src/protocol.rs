//! Wire protocol primitives for the simulator link.
//!
//! The simulator speaks an ad-hoc mix of text lines and fixed binary
//! fields over one TCP connection:
//!
//! ```text
//! ┌─────────────────┐            TCP             ┌─────────────────────┐
//! │   Rust client   │ ◄─────────────────────────►│      simulator      │
//! │   (Channel)     │   lines + big-endian i32/  │   (motion queue,    │
//! └─────────────────┘   f64 fields, one request  │    item tree)       │
//!                       in flight at a time      └─────────────────────┘
//! ```
//!
//! Requests carry no identifiers; correlation is purely positional, so a
//! request's full result-and-status sequence must be consumed before the
//! next verb is sent. [`channel::Channel`] provides the framing
//! primitives, [`status::check_status`] the trailing outcome decode that
//! terminates every exchange.

pub mod channel;
pub mod status;

pub use channel::{Channel, MAX_ARRAY_VALUES};
