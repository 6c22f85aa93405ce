//! # Herald Engine
//! The execution core: one queue delivery in, one step executed, the next
//! step queued.
//!
//! ```text
//! queue → JobRunner.run(job_id)
//!   → cancellation / unsnooze checks
//!   → MessageDispatcher.dispatch(ctx)
//!     → bridge + gating (conditions ∥ preferences)
//!     → ChannelSender.send(ctx)
//!   → interpret {success | failed | skipped}
//!   → halt / backoff / queue next job
//! ```

pub mod dispatcher;
pub mod runner;
pub mod worker;

pub use dispatcher::MessageDispatcher;
pub use runner::JobRunner;
pub use worker::Worker;
