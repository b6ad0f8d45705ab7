//! DropLite console client
//!
//! - `api`: HTTP transport, credentials and wire types
//! - `store`: File list with single-flight refresh
//! - `upload`: Upload task registry and orchestrator
//! - `deletion`: Deleting set and per-row controls
//! - `download`: Status-gated downloads to disk
//! - `console`: Everything above wired from a [`ClientConfig`]
//! - `cli`: The `droplite` command line

pub mod api;
pub mod cli;
pub mod config;
pub mod console;
pub mod deletion;
pub mod download;
pub mod error;
pub mod format;
pub mod logging;
pub mod store;
pub mod upload;

pub use api::{FileRecord, FileStatus, HttpTransport, ListQuery, LocalFile, Transport};
pub use config::{ClientConfig, CredentialConfig};
pub use console::{FileConsole, FileRow};
pub use deletion::{Confirm, DeleteOutcome, DeletionRegistry, FileControls};
pub use download::{DownloadAccess, DownloadReport};
pub use error::{ClientError, ClientResult};
pub use store::{FileListSnapshot, FileListStore, ListState};
pub use upload::{UploadHandle, UploadOrchestrator, UploadPolicy, UploadStatus, UploadTask, UploadTaskRegistry};
