//! Session state: the prefetch queue and the session controller on top of it.

mod prefetch;
mod session;

#[cfg(test)]
mod tests;

pub use prefetch::{InitOutcome, PrefetchQueue, PrefetchStatus, QueueEntry};
pub use session::Session;
