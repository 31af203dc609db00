//! Integration tests for the plugin loader and job pipeline.
//!
//! Tests cover:
//! - Depsolve ordering, conflicts and priorities
//! - Job dispatch, masking and the not-supported contract
//! - File and URL resolution post-processing
//! - Pending-install queue persistence and network-driven flush
//! - Cancellation propagation and state recovery

#[path = "orchestrator/common.rs"]
mod common;

#[path = "orchestrator/cancellation.rs"]
mod cancellation;
#[path = "orchestrator/dispatch.rs"]
mod dispatch;
#[path = "orchestrator/ordering.rs"]
mod ordering;
#[path = "orchestrator/pending_queue.rs"]
mod pending_queue;
