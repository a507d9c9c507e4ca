pub mod api;
pub mod catalog;
pub mod config;
pub mod debounce;
pub mod errors;
pub mod filter;
pub mod flex_id;
pub mod ingest;
pub mod parser;
pub mod preprocessing;
pub mod proxy;
pub mod proxy_url;
pub mod session;
pub mod worker;

pub use catalog::{Category, Channel, Credentials, PlaylistSource, SourceKind};
pub use errors::{ApiCall, CatalogError, CatalogResult};
pub use filter::{filter_channels, FilterQuery, View};
pub use worker::{WorkerHandle, WorkerHost, WorkerRequest, WorkerResponse};
