//! Business logic services.

pub mod archive;
pub mod completion;
pub mod content_hash;
pub mod decryption;
pub mod dispatcher;
pub mod manifest;
pub mod notifier;
pub mod pipeline;
pub mod status;
pub mod storage;

pub use notifier::{CompletionNotifier, WebhookNotifier};
pub use pipeline::{IngestFailure, IngestOutcome, IngestPipeline};
pub use storage::{ObjectStore, Storage};
