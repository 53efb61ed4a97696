//! Background Task Runtime (§4.6): named queues, attempt limits, per-attempt
//! backoff, cancellation tokens, and the state-election hook that marks a
//! Job `FAILED` when its task exhausts retries.

pub mod runtime;
pub mod task;

pub use runtime::{NoopFailureHook, TaskFailureHook, TaskRuntime};
pub use task::{default_retry_delays, Task, TaskDescriptor, TaskState};
