//! Runs a [`PreparedBuild`]'s `to_build` set through a worker pool.
//!
//! This is the module most directly lifted from the teacher crate: the
//! `Executor` state machine (`BuildStatusKind`, `pending`/`running`/
//! `finished`/`failed` counters, a `rayon::Scope` plus `mpsc` completion
//! channel) is the same shape as `src/exec.rs`'s `Executor`, generalized from
//! "one output per tracked unit" to "N outputs per builder." A builder is
//! invoked at most once per `build_targets` call even though it may own
//! several output nodes, since the unit of scheduling here is the builder,
//! not the node.

use std::collections::{HashMap, HashSet};
use std::sync::{mpsc, Arc, Mutex};

use indexmap::IndexSet;
use petgraph::prelude::DiGraphMap;
use petgraph::visit::{Dfs, Reversed};
use rayon::Scope;
use tracing::{debug, info, warn};

use crate::builder::{BuildContext, Builder, BuilderId};
use crate::error::EngineError;
use crate::execution::ExecutionInner;
use crate::node::NodeId;
use crate::progress::{Progress, ProgressConfig, ProgressStatus};
use crate::staleness::PreparedBuild;

/// How many builders may run concurrently.
#[derive(Debug, Clone, Copy)]
pub enum Parallelism {
    /// Run one builder at a time.
    Sequential,
    /// Use `std::thread::available_parallelism()`.
    Auto,
    /// Use exactly this many worker threads.
    Fixed(usize),
}

impl Parallelism {
    fn resolve(self) -> usize {
        match self {
            Parallelism::Sequential => 1,
            Parallelism::Fixed(n) => n.max(1),
            Parallelism::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug)]
pub struct ExecConfig {
    pub parallelism: Parallelism,
    /// Report, but do not run, every builder in `to_build`.
    pub dry_run: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            parallelism: Parallelism::Auto,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildStatusKind {
    Fresh,
    Started,
    UpToDate,
    Failed,
    Succeeded,
    Skipped,
}

impl BuildStatusKind {
    fn is_finished(self) -> bool {
        matches!(
            self,
            BuildStatusKind::UpToDate
                | BuildStatusKind::Failed
                | BuildStatusKind::Succeeded
                | BuildStatusKind::Skipped
        )
    }

    fn is_successful(self) -> bool {
        matches!(self, BuildStatusKind::UpToDate | BuildStatusKind::Succeeded)
    }
}

#[derive(Debug, Clone)]
struct BuildStatus {
    kind: BuildStatusKind,
    pending_inputs: usize,
}

struct SharedState<'a> {
    execution: Arc<ExecutionInner>,
    prepared: &'a PreparedBuild,
    /// Builder dependency graph, restricted to builders that are actually in
    /// `to_build`. Edge `a -> b` means builder `a` depends on builder `b`.
    graph: DiGraphMap<BuilderId, ()>,
    pool: rayon::ThreadPool,
    progress: &'a dyn Progress,
    dry_run: bool,
    /// Real errors from failed builders, keyed by nothing in particular —
    /// `run_inner` surfaces the first one once the whole build has stopped.
    errors: Mutex<Vec<EngineError>>,
}

/// Drives `prepared.to_build` to completion, same state machine the teacher
/// crate's `Executor` uses, at builder rather than node granularity.
struct Executor<'a> {
    state: Arc<SharedState<'a>>,
    pending: IndexSet<BuilderId>,
    builds: HashMap<BuilderId, BuildStatus>,
    running: usize,
    finished: usize,
    failed: usize,
}

pub fn build_targets(
    execution: &Arc<ExecutionInner>,
    prepared: &PreparedBuild,
    progress: &dyn Progress,
    cfg: &ExecConfig,
) -> Result<(), EngineError> {
    if prepared.to_build.is_empty() {
        info!("all files up to date");
        return Ok(());
    }

    let builder_ids = to_build_builders(execution, prepared);
    let graph = builder_dependency_graph(execution, prepared, &builder_ids);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.parallelism.resolve())
        .build()
        .map_err(|e| EngineError::InternalInconsistency(e.to_string()))?;

    let state = Arc::new(SharedState {
        execution: execution.clone(),
        prepared,
        graph,
        pool,
        progress,
        dry_run: cfg.dry_run,
        errors: Mutex::new(Vec::new()),
    });

    let mut executor = Executor::new(state, &builder_ids);
    executor.run()
}

fn to_build_builders(execution: &ExecutionInner, prepared: &PreparedBuild) -> HashSet<BuilderId> {
    prepared
        .to_build
        .iter()
        .filter_map(|&node| execution.builder_of(node))
        .collect()
}

fn builder_dependency_graph(
    execution: &ExecutionInner,
    prepared: &PreparedBuild,
    builder_ids: &HashSet<BuilderId>,
) -> DiGraphMap<BuilderId, ()> {
    let mut graph = DiGraphMap::new();
    for &id in builder_ids {
        graph.add_node(id);
    }

    // Map each builder to the nodes it owns, so we can walk each owned
    // node's dependencies without re-deriving ownership repeatedly.
    let mut owned_nodes: HashMap<BuilderId, Vec<NodeId>> = HashMap::new();
    for &node in &prepared.to_build {
        if let Some(owner) = execution.builder_of(node) {
            owned_nodes.entry(owner).or_default().push(node);
        }
    }

    for (&builder_id, nodes) in &owned_nodes {
        for &node in nodes {
            for dep in prepared.graph.dependencies(node) {
                if let Some(dep_builder) = execution.builder_of(dep) {
                    if dep_builder != builder_id && builder_ids.contains(&dep_builder) {
                        graph.add_edge(builder_id, dep_builder, ());
                    }
                }
            }
        }
    }

    graph
}

impl<'a> Executor<'a> {
    fn new(state: Arc<SharedState<'a>>, builder_ids: &HashSet<BuilderId>) -> Self {
        let mut builds = HashMap::new();
        let mut pending = IndexSet::new();

        for &id in builder_ids {
            let pending_inputs = state
                .graph
                .neighbors_directed(id, petgraph::Direction::Outgoing)
                .count();
            if pending_inputs == 0 {
                pending.insert(id);
            }
            builds.insert(
                id,
                BuildStatus {
                    kind: BuildStatusKind::Fresh,
                    pending_inputs,
                },
            );
        }

        Self {
            state,
            pending,
            builds,
            running: 0,
            finished: 0,
            failed: 0,
        }
    }

    fn run(&mut self) -> Result<(), EngineError> {
        self.state.progress.prepare(&ProgressConfig {
            max_threads: Some(self.state.pool.current_num_threads()),
        });

        let state = self.state.clone();
        let (tx, mut rx) = mpsc::channel::<BuilderResult>();
        let result = state
            .pool
            .in_place_scope(|pool| self.run_inner(pool, tx, &mut rx));
        drop(rx);

        self.state.progress.finish();
        result
    }

    fn run_inner<'scope>(
        &mut self,
        pool: &Scope<'scope>,
        tx: mpsc::Sender<BuilderResult>,
        rx: &mut mpsc::Receiver<BuilderResult>,
    ) -> Result<(), EngineError>
    where
        'a: 'scope,
    {
        loop {
            debug!(
                running = self.running,
                pending = self.pending.len(),
                finished = self.finished,
                total = self.builds.len(),
                failed = self.failed,
                "scheduler loop iteration"
            );

            while let Some(id) = self.pending.pop() {
                self.start_builder(pool, tx.clone(), id);
            }

            if self.finished == self.builds.len() {
                info!("build finished");
                break;
            }

            if self.running == 0 {
                return Err(EngineError::InternalInconsistency(
                    "no builders running but not all builders finished".to_string(),
                ));
            }

            let msg = rx
                .recv()
                .expect("a sender is always held while builders are running");
            self.builder_finished(msg)?;
        }

        if self.failed > 0 {
            let mut errors = self.state.errors.lock().unwrap();
            return Err(std::mem::take(&mut *errors).into_iter().next().unwrap_or_else(|| {
                EngineError::InternalInconsistency(format!("{} builder(s) failed", self.failed))
            }));
        }
        Ok(())
    }

    fn start_builder<'scope>(
        &mut self,
        pool: &Scope<'scope>,
        tx: mpsc::Sender<BuilderResult>,
        id: BuilderId,
    ) where
        'a: 'scope,
    {
        let status = self.progress_status();
        let name = self.state.execution.builder(id).display();
        self.state.progress.build_started(id, &name, &status);

        self.builds.get_mut(&id).unwrap().kind = BuildStatusKind::Started;
        self.running += 1;

        let state = self.state.clone();
        pool.spawn(move |_| run_builder(state, id, tx));
    }

    fn builder_finished(&mut self, msg: BuilderResult) -> Result<(), EngineError> {
        let BuilderResult { id, kind } = msg;

        self.running -= 1;
        self.finished += 1;

        let build = self.builds.get_mut(&id).expect("builder is tracked");
        build.kind = kind;

        match kind {
            BuildStatusKind::Succeeded | BuildStatusKind::UpToDate => {
                for dependent in self
                    .state
                    .graph
                    .neighbors_directed(id, petgraph::Direction::Incoming)
                {
                    let Some(dep) = self.builds.get_mut(&dependent) else {
                        continue;
                    };
                    if dep.kind.is_finished() {
                        continue;
                    }
                    dep.pending_inputs -= 1;
                    if dep.pending_inputs == 0 {
                        self.pending.insert(dependent);
                    }
                }
            }
            BuildStatusKind::Failed | BuildStatusKind::Skipped => {
                self.failed += 1;
                warn!(?id, "builder failed, skipping dependents");
                let reversed = Reversed(&self.state.graph);
                let mut dfs = Dfs::new(reversed, id);
                let mut dependents = Vec::new();
                while let Some(n) = dfs.next(reversed) {
                    if n != id {
                        dependents.push(n);
                    }
                }
                for dependent in dependents {
                    let Some(dep) = self.builds.get_mut(&dependent) else {
                        continue;
                    };
                    if dep.kind.is_finished() {
                        continue;
                    }
                    dep.kind = BuildStatusKind::Skipped;
                    self.finished += 1;
                    self.failed += 1;
                }
            }
            BuildStatusKind::Fresh | BuildStatusKind::Started => {
                return Err(EngineError::InternalInconsistency(format!(
                    "builder {id:?} reported non-terminal status {kind:?}"
                )));
            }
        }

        let status = self.progress_status();
        self.state
            .progress
            .build_finished(id, kind.is_successful(), &status);

        Ok(())
    }

    fn progress_status(&self) -> ProgressStatus {
        ProgressStatus {
            total: self.builds.len(),
            started: self.running + self.finished,
            done: self.finished,
            failed: self.failed,
        }
    }
}

struct BuilderResult {
    id: BuilderId,
    kind: BuildStatusKind,
}

fn run_builder(state: Arc<SharedState<'_>>, id: BuilderId, report: mpsc::Sender<BuilderResult>) {
    let span = tracing::info_span!("run_builder", ?id);
    let _guard = span.enter();

    let kind = run_builder_inner(&state, id);

    report
        .send(BuilderResult { id, kind })
        .expect("the receiver outlives every sender");
}

/// Never returns `Err`: a builder failure is recorded in `state.errors` and
/// reported as `BuildStatusKind::Failed`, so `builder_finished`'s
/// skip-propagation over dependents actually runs instead of the whole build
/// unwinding through a single `?`.
fn run_builder_inner(state: &SharedState<'_>, id: BuilderId) -> BuildStatusKind {
    let builder = state.execution.builder(id);
    info!(name = %builder.display(), "building");

    if state.dry_run {
        return BuildStatusKind::Succeeded;
    }

    match build_and_commit(state, &builder) {
        Ok(()) => BuildStatusKind::Succeeded,
        Err(e) => {
            warn!(name = %builder.display(), error = %e, "builder failed");
            for &node in builder.builds() {
                if let Some(path) = state.execution.path_of(node) {
                    state.execution.store().invalidate(&path);
                }
            }
            state.errors.lock().unwrap().push(e);
            BuildStatusKind::Failed
        }
    }
}

fn build_and_commit(state: &SharedState<'_>, builder: &Arc<dyn Builder>) -> Result<(), EngineError> {
    for &node in builder.builds() {
        if let Some(path) = state.execution.path_of(node) {
            state
                .execution
                .filesystem()
                .remove_file(&path)
                .or_else(|_| state.execution.filesystem().remove_dir_all(&path))
                .ok();
            if let Some(parent) = path.parent() {
                state.execution.filesystem().create_dir_all(parent)?;
            }
        }
    }

    let ctx = BuildContext::new(&state.execution, state.dry_run);
    if let Err(source) = builder.build(&ctx) {
        return Err(EngineError::BuilderFailure {
            builder: builder.display(),
            source,
        });
    }

    for &node in builder.builds() {
        if let Some(path) = state.execution.path_of(node) {
            if !state.execution.filesystem().exists(&path) {
                return Err(EngineError::MissingOutput {
                    builder: builder.display(),
                    path,
                });
            }
        }
    }

    commit_metadata(state, builder)
}

fn commit_metadata(state: &SharedState<'_>, builder: &Arc<dyn Builder>) -> Result<(), EngineError> {
    let mut cache: HashMap<NodeId, crate::node::ObservedMeta> = HashMap::new();
    for &node in builder.builds() {
        if !state.execution.is_entry(node) {
            continue;
        }
        let Some(path) = state.execution.path_of(node) else {
            continue;
        };
        let deps = state
            .prepared
            .entry_dependencies
            .get(&node)
            .cloned()
            .unwrap_or_default();
        for &dep in &deps {
            cache
                .entry(dep)
                .or_insert_with(|| state.execution.observed_metadata(dep));
        }
        let signature = crate::staleness::signature_of(state.execution, &deps, &cache);
        state.execution.store().set(&path, signature);
    }
    Ok(())
}
