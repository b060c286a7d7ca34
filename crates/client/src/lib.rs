//! Client code for midrash-web's offline layer.
//!
//! This crate provides the network seam and reqwest client, the offline cache
//! manager, and the content store and upload helpers used by the server.

pub mod content;
pub mod fetch;
pub mod upload;
pub mod worker;

pub use content::{BearerToken, ContentClient, ContentDocument, ContentEndpoint, ContentSource};

pub use fetch::{Destination, FetchClient, FetchConfig, FetchRequest, FetchResponse, Network};

pub use upload::{ImageVariants, UploadTarget, prepare_upload, sanitize_filename};

pub use worker::{
    CacheManager, CacheManagerConfig, ClientMessage, Clients, FetchOutcome, Notification, Notifier, PageRegistry,
    ResponseSource, WindowAction, WorkerMessage, WorkerState,
};
