//! Dispatcher (§4.5): for each stream, a long-running consumer that
//! blocking-reads a batch, parses the job id, applies the idempotency gate,
//! enqueues the matching background task, persists `backgroundTaskId`, and
//! acknowledges — never acking before persistence commits, so a crash
//! between steps causes redelivery instead of lost work.
//!
//! One generic `StreamDispatcher<H>` implements the consume-gate-enqueue-
//! commit-ack loop; the three concrete streams plug in only what differs
//! (stream/group name, which queue a message dispatches into, how to build
//! the task's args) via the `DispatchHandler` trait — "shared behavior is a
//! helper, not a superclass" (§9) applied one level up from stages.

mod handler;
mod jobs;
mod sync;
mod uploads;

pub use handler::{DispatchHandler, StreamDispatcher};
pub use jobs::JobsDispatchHandler;
pub use sync::SyncDispatchHandler;
pub use uploads::UploadsDispatchHandler;
