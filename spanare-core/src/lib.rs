//! # spanare-core
//!
//! Foundation layer for the ingestion pipeline: the observation record model,
//! the bounded blocking ring buffer, shared status counters and the
//! cooperative cancellation token used by every long-lived thread.
//!
//! ### Key Submodules:
//! - `mac`: 48-bit MAC addresses split into high/low words
//! - `record`: `ObservationRecord`, the unit moved through the ring
//! - `ring`: fixed-capacity ring buffer with timeout-bounded push/pop
//! - `status`: RwLock-guarded counters and their snapshot copy
//! - `cancel`: shared stop flag with slice-based interruptible sleep

pub mod cancel;
pub mod mac;
pub mod record;
pub mod ring;
pub mod status;

pub mod prelude {
    pub use crate::cancel::*;
    pub use crate::mac::*;
    pub use crate::record::*;
    pub use crate::ring::*;
    pub use crate::status::*;
}
