//! Request Versioning
//!
//! Race protection for async operations that write reactive state. Each
//! attempt gets a [`Ticket`] with a monotonically increasing id and an
//! [`AbortToken`]; only the newest ticket may commit into a
//! [`RequestSlot`], so a slow early response can never overwrite a fast
//! later one.

mod slot;
mod token;

pub use slot::{Commit, Completion, RequestSlot, RequestStatus};
pub use token::{AbortToken, Ticket};
