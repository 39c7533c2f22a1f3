//! `trestle`: an incremental build engine.
//!
//! Construct-file code builds a dependency graph of [`node::FileNode`],
//! [`node::DirNode`], and [`node::FileSetNode`] values against an
//! [`Execution`], registers [`builder::Builder`]s to produce the derived
//! ones, then calls [`Execution::build_targets`] to bring a set of targets up
//! to date. Concrete builders (compilers, installers, archivers, ...), the
//! construct-file loader, and the CLI front-end are external collaborators;
//! this crate is the engine they sit on top of.

pub mod builder;
pub mod db;
pub mod environment;
pub mod error;
pub mod execution;
pub mod filesystem;
pub mod graph;
pub mod node;
pub mod progress;
pub mod scheduler;
pub mod staleness;

pub use builder::{BuildContext, Builder, BuilderError, BuilderId, BuilderInputs};
pub use db::MetadataStore;
pub use db::in_memory::InMemoryStore;
pub use environment::{DirSource, Environment, FileSource};
pub use error::EngineError;
pub use execution::{Execution, ExecutionGuard, TargetArg, get_current_execution};
pub use filesystem::{Filesystem, LocalFilesystem, LOCAL_FILESYSTEM};
pub use graph::DependencyGraph;
pub use node::{DirNode, FileNode, FileSetNode, NodeId, ObservedMeta, Signature};
pub use progress::{NOOP_PROGRESS, NoopProgress, Progress, ProgressConfig, ProgressStatus};
pub use scheduler::{ExecConfig, Parallelism};
pub use staleness::PreparedBuild;

#[cfg(feature = "db-dumb")]
pub use db::dumb::DumbFileStore;

#[cfg(feature = "progress-dumb")]
pub use progress::DumbConsoleProgress;

#[cfg(feature = "progress-fancy")]
pub use progress::FancyConsoleProgress;
