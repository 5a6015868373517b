//! Linz WebGIS traffic sensor retrieval: token acquisition, dataset fetch,
//! per-day partitioning and JSON output.

pub mod apicall;
pub mod auth;
pub mod headers;
pub mod partition;
pub mod pipeline;
pub mod writer;

pub use apicall::{DatasetFetcher, FetchError};
pub use auth::{
    select_provider, AuthError, AuthMode, BearerToken, FallbackTokenProvider, OAuthTokenProvider,
    PromptTokenProvider, StaticTokenProvider, TokenProvider,
};
pub use partition::{Partition, Partitioner};
pub use pipeline::{build_client, DatasetReport, Pipeline, RunReport};
pub use writer::{JsonWriter, OutputKind, WriteError};
