//! Bulk import services
//!
//! Leaves first: owner resolution, remote listing, checkout, throughput,
//! status registry, chunk scheduling, project materialization, and the
//! orchestrator tying them together.

pub mod bulk_import;
pub mod checkout;
pub mod checkout_worker;
pub mod github_client;
pub mod owner_resolver;
pub mod project_materializer;
pub mod scheduler;
pub mod status_registry;
pub mod throughput;

pub use bulk_import::{BulkImportRequest, BulkImportService, GitHubApiProvider, RemoteApiProvider};
pub use checkout::{Checkout, CloneError, CloneOptions, GitCheckout};
pub use checkout_worker::{CheckoutWorker, TaskContext, TaskOutcome};
pub use github_client::{GitHubClient, GitHubError, OwnerKind, RemoteApi, RemoteRepo};
pub use owner_resolver::resolve_owners;
pub use scheduler::{ChunkScheduler, ImportLedger};
pub use status_registry::{JobPatch, JobPoll, StatusRegistry};
pub use throughput::ThroughputMeter;
