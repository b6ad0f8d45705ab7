//! Upload module: task registry and orchestration
//!
//! - `types`: Upload task state
//! - `registry`: Task store publishing immutable snapshots
//! - `orchestrator`: Validation, bounded concurrency, transport calls and list refresh

mod orchestrator;
mod registry;
mod types;

pub use orchestrator::{UploadHandle, UploadOrchestrator, UploadPolicy};
pub use registry::{TaskSnapshot, UploadTaskRegistry};
pub use types::{UploadStatus, UploadTask};
