//! Job creation, queueing, and status/result projections.

pub mod cancel;
pub mod lifecycle;

pub use cancel::CancelRegistry;
pub use lifecycle::{JobStatusView, UploadedFile};
