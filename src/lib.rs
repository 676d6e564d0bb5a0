//! Hemmer provider for Dynatrace
//!
//! This crate implements a Hemmer provider exposing Dynatrace monitoring
//! configuration as declarative resources:
//!
//! - **`dynatrace_management_zones`** (resource): full create/read/update/delete
//!   plus import-by-identifier
//! - **`dynatrace_alerting_profiles`** (resource): full create/read/update/delete
//! - **`dynatrace_alerting_profiles`** (data source): read-only lookup by
//!   identifier
//!
//! The provider is a thin shell around the Dynatrace configuration API v1:
//! declarative schemas mirroring the vendor's JSON structures, a bidirectional
//! flatten/expand mapping between the host's generic attribute trees and the
//! typed API structs, and pass-through CRUD calls over HTTPS.
//!
//! # Configuration
//!
//! ```text
//! provider "dynatrace" {
//!   dt_env_url   = "https://<environment-id>.live.dynatrace.com"
//!   dt_api_token = "dt0c01.…"
//! }
//! ```
//!
//! Both settings fall back to environment variables, provider-specific name
//! first: `DYNATRACE_ENV_URL` then `DT_ENV_URL`, and `DYNATRACE_API_TOKEN`
//! then `DT_API_TOKEN`.
//!
//! # Handshake Protocol
//!
//! The provider runs as a child process of the Hemmer host. On start it
//! outputs a handshake string to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`. The host then
//! connects over gRPC; all logging goes to stderr so stdout stays clean.
//!
//! # Provider Protocol
//!
//! The served protocol follows the shape established by Terraform's plugin
//! protocol:
//!
//! - **GetMetadata / GetSchema**: provider capabilities, resource and data
//!   source schemas
//! - **ValidateProviderConfig / ValidateResourceConfig /
//!   ValidateDataSourceConfig**: schema-driven validation with attribute-path
//!   diagnostics
//! - **Configure**: resolves credentials and builds the shared API client
//! - **Plan**: attribute-level diff (the host owns graph planning)
//! - **Create / Read / Update / Delete**: pass-through CRUD against the
//!   configuration API
//! - **ImportResourceState**: adopt existing management zones by identifier
//! - **ReadDataSource**: alerting profile lookup
//! - **Stop**: graceful shutdown

#![warn(missing_docs)]
#![warn(clippy::all)]

mod alerting_profiles;
pub mod client;
pub mod error;
pub mod logging;
mod management_zones;
pub mod models;
pub mod provider;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use client::{ConfigApi, ConfigClient};
pub use error::{ApiError, ProviderError};
pub use logging::{init_logging, try_init_logging};
pub use provider::DynatraceProvider;
pub use schema::ProviderSchema;
pub use server::{serve, serve_with_options, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tonic;
pub use tracing;
