//! Shared CLI implementation. A `main.rs` (here, or in a `demos/` binary
//! that links its own `construct` function in at compile time) calls
//! [`run`] with a closure that builds the dependency graph against the
//! [`trestle::Execution`] it's handed.

pub mod cli;
pub mod tree;

use std::io::IsTerminal;
use std::sync::Arc;

pub use cli::Args;

pub fn run(
    args: Args,
    construct: impl FnOnce(&trestle::Execution) -> Result<(), trestle::EngineError>,
) -> anyhow::Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };

    let store: Arc<dyn trestle::MetadataStore> =
        Arc::new(trestle_redb::RedbStore::open(root.join(".trestle.redb"))?);
    let filesystem: Arc<dyn trestle::Filesystem> = Arc::new(trestle::LocalFilesystem);
    let execution = trestle::Execution::new(root, store, filesystem);

    {
        let _guard = trestle::ExecutionGuard::set(execution.clone());
        construct(&execution)?;
    }

    if args.targets.is_empty() {
        anyhow::bail!("at least one target is required");
    }

    let mut prepared = execution.prepare_build(args.targets.clone())?;
    if args.always_make {
        prepared.to_build = prepared.ordered_nodes.iter().copied().collect();
    }

    if args.tree {
        tree::print_tree(&execution, &prepared);
        return Ok(());
    }

    let progress: Box<dyn trestle::Progress> = if std::io::stdout().is_terminal() {
        Box::new(trestle::FancyConsoleProgress::new())
    } else {
        Box::new(trestle::DumbConsoleProgress)
    };

    let cfg = trestle::ExecConfig {
        parallelism: match args.jobs {
            Some(n) => trestle::Parallelism::Fixed(n),
            None => trestle::Parallelism::Auto,
        },
        dry_run: args.dry_run,
    };

    trestle::scheduler::build_targets(execution.inner(), &prepared, progress.as_ref(), &cfg)?;
    Ok(())
}
