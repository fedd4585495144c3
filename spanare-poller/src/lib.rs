//! ## spanare-poller
//! **Per-endpoint polling workers**
//!
//! One OS thread per configured endpoint. Each worker fetches its endpoint
//! through a [`RecordSource`], decodes the body into observation records,
//! pushes them into the shared ring and keeps its own backoff state.
//!
//! ### Key Submodules:
//! - `decode`: JSON body to `ObservationRecord` conversion
//! - `source`: the `RecordSource` seam and the HTTPS implementation
//! - `backoff`: thresholds and the doubling delay
//! - `worker`: the poll loop, its shared context and liveness guard

pub mod backoff;
pub mod decode;
pub mod source;
pub mod worker;

pub use backoff::{Backoff, BackoffPolicy};
pub use decode::{decode_body, decode_record, DecodeError};
pub use source::{FetchError, HttpSource, HttpSourceFactory, RecordSource, SourceFactory};
pub use worker::{PollWorker, WorkerContext, WorkerState, PUSH_TIMEOUT};
