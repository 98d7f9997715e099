//! Archivist: a scheduled backup task engine.
//!
//! Users register file or directory paths with a repeat interval in hours.
//! A background scheduler periodically zips each due path, splits the
//! archive into size-bounded parts, and hands the parts to a delivery sink
//! for every configured recipient.
//!
//! # Architecture
//!
//! - **Store** ([`store`]): durable JSON task map with serialized mutation
//! - **Archive** ([`archive`]): zip compression and part splitting
//! - **Delivery** ([`delivery`]): transport traits plus a local outbox sink
//! - **Scheduler** ([`scheduler`]): tick loop that fires and re-arms tasks
//! - **Service** ([`service`]): registration, listing, and removal of tasks

pub mod archive;
pub mod archivist_dirs;
pub mod config;
pub mod delivery;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod store;

#[doc(hidden)]
pub mod test_utils;

pub use archive::{ArchivePart, Compressor};
pub use config::ArchivistConfig;
pub use delivery::{DeliverySink, MessageRef, Notifier, OutboxSink, RecipientId};
pub use error::{BackupError, Result};
pub use scheduler::{Scheduler, TickReport};
pub use service::BackupService;
pub use store::{Task, TaskId, TaskStore};
