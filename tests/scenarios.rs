//! End-to-end tests driving `Execution` through a mock filesystem: staleness
//! detection, rebuild propagation, `FileSet` growth, and cycle detection.
//!
//! Most of these tests are written by an LLM. They are very small tests, so
//! it's acceptable.

mod mock;

use std::sync::{Arc, Mutex};

use test_log::test;
use trestle::{
    BuildContext, Builder, BuilderError, BuilderInputs, EngineError, Execution, ExecConfig,
    FileNode, InMemoryStore, NodeId, NOOP_PROGRESS,
};

use mock::MockFilesystem;

/// A builder that copies its single input's bytes into its single output,
/// recording its name into a shared log each time `build` runs. Holds its
/// own handle to the mock filesystem rather than going through
/// `ctx.filesystem()`, since `Filesystem` itself offers no write operation
/// (real builders write with `std::fs` directly; this test double needs the
/// equivalent on its mock).
struct Copy {
    inputs: BuilderInputs,
    input: FileNode,
    output: FileNode,
    fs: Arc<MockFilesystem>,
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    fail: Arc<Mutex<bool>>,
}

impl Builder for Copy {
    fn depends(&self) -> &[NodeId] {
        self.inputs.depends()
    }

    fn builds(&self) -> &[NodeId] {
        self.inputs.builds()
    }

    fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError> {
        self.log.lock().unwrap().push(self.name.clone());
        if *self.fail.lock().unwrap() {
            return Err(format!("{} was told to fail", self.name).into());
        }
        let contents = self.fs.read(ctx.path_of(self.input)).unwrap_or_default();
        self.fs.write(ctx.path_of(self.output), contents);
        Ok(())
    }

    fn display(&self) -> String {
        self.name.clone()
    }
}

/// Test harness: a mock filesystem plus an `Execution` wired up against it,
/// with a helper to register a [`Copy`] builder between two paths.
struct Harness {
    fs: Arc<MockFilesystem>,
    execution: Execution,
    log: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    fn new() -> Self {
        let fs = Arc::new(MockFilesystem::new());
        let store = Arc::new(InMemoryStore::new());
        let execution = Execution::new("/root", store, fs.clone() as Arc<dyn trestle::Filesystem>);
        Self {
            fs,
            execution,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn copy(&self, name: &str, from: &str, to: &str) -> FileNode {
        self.copy_that_may_fail(name, from, to, Arc::new(Mutex::new(false)))
    }

    fn copy_that_may_fail(
        &self,
        name: &str,
        from: &str,
        to: &str,
        fail: Arc<Mutex<bool>>,
    ) -> FileNode {
        let env = self.execution.default_environment();
        let mut inputs = BuilderInputs::new(env);
        let input = inputs.depends_file(from).unwrap();
        let output = inputs.register_file_target(to).unwrap();
        self.execution
            .register_builder(Arc::new(Copy {
                inputs,
                input,
                output,
                fs: self.fs.clone(),
                name: name.to_string(),
                log: self.log.clone(),
                fail,
            }))
            .unwrap();
        output
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut self.log.lock().unwrap())
    }
}

#[test]
fn nothing_to_build_is_a_no_op() {
    let h = Harness::new();
    h.fs.write("/root/in.txt", b"hi");
    let source = h.execution.default_environment().file("in.txt").unwrap();
    let prepared = h
        .execution
        .build_targets([source], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();
    assert!(prepared.to_build.is_empty());
}

#[test]
fn single_builder_runs_and_commits_output() {
    let h = Harness::new();
    h.fs.write("/root/in.txt", b"hello");
    let out = h.copy("copy-a", "in.txt", "out.txt");

    h.execution
        .build_targets([out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();

    assert_eq!(h.take_log(), vec!["copy-a"]);
    assert_eq!(h.fs.read("/root/out.txt"), Some(b"hello".to_vec()));
}

#[test]
fn up_to_date_second_run_does_not_rebuild() {
    let h = Harness::new();
    h.fs.write("/root/in.txt", b"hello");
    let out = h.copy("copy-a", "in.txt", "out.txt");

    h.execution
        .build_targets([out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();
    h.take_log();

    h.execution
        .build_targets([out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();
    assert!(h.take_log().is_empty());
}

#[test]
fn touching_input_triggers_rebuild() {
    let h = Harness::new();
    h.fs.write("/root/in.txt", b"hello");
    let out = h.copy("copy-a", "in.txt", "out.txt");

    h.execution
        .build_targets([out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();
    h.take_log();

    h.fs.write("/root/in.txt", b"updated");
    h.execution
        .build_targets([out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();
    assert_eq!(h.take_log(), vec!["copy-a"]);
    assert_eq!(h.fs.read("/root/out.txt"), Some(b"updated".to_vec()));
}

#[test]
fn linear_dependency_builds_in_order() {
    let h = Harness::new();
    h.fs.write("/root/a.in", b"a");
    let _a_out = h.copy("build-a", "a.in", "a.out");
    let b_out = h.copy("build-b", "a.out", "b.out");

    h.execution
        .build_targets([b_out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();

    let log = h.take_log();
    assert_eq!(log.len(), 2);
    assert!(
        log.iter().position(|n| n == "build-a").unwrap()
            < log.iter().position(|n| n == "build-b").unwrap()
    );
}

#[test]
fn failure_skips_dependents() {
    let h = Harness::new();
    h.fs.write("/root/a.in", b"a");
    let fail = Arc::new(Mutex::new(true));
    let _a_out = h.copy_that_may_fail("build-a", "a.in", "a.out", fail);
    let b_out = h.copy("build-b", "a.out", "b.out");

    let err = h
        .execution
        .build_targets([b_out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::BuilderFailure { .. }));

    let log = h.take_log();
    assert_eq!(log, vec!["build-a"]);
    assert_eq!(h.fs.read("/root/a.out"), None);
}

#[test]
fn failure_skips_transitive_dependents() {
    let h = Harness::new();
    h.fs.write("/root/a.in", b"a");
    let fail = Arc::new(Mutex::new(true));
    let _a_out = h.copy_that_may_fail("build-a", "a.in", "a.out", fail);
    let _b_out = h.copy("build-b", "a.out", "b.out");
    let c_out = h.copy("build-c", "b.out", "c.out");

    let err = h
        .execution
        .build_targets([c_out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::BuilderFailure { .. }));

    // build-b and build-c never run: both are skipped transitively via the
    // reversed-DFS walk from the failed build-a, not merely left unscheduled.
    let log = h.take_log();
    assert_eq!(log, vec!["build-a"]);
    assert_eq!(h.fs.read("/root/b.out"), None);
    assert_eq!(h.fs.read("/root/c.out"), None);
}

#[test]
fn missing_required_input_errors_without_building() {
    let h = Harness::new();
    let out = h.copy("copy-a", "missing.in", "out.txt");

    let err = h
        .execution
        .build_targets([out], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingInput { .. }));
    assert!(h.take_log().is_empty());
}

#[test]
fn dependency_cycle_is_rejected() {
    let h = Harness::new();
    h.fs.write("/root/a.txt", b"a");
    h.fs.write("/root/b.txt", b"b");
    let env = h.execution.default_environment();
    let a = env.file("a.txt").unwrap();
    let b = env.file("b.txt").unwrap();
    h.execution.inner().add_depend(a.node_id(), b.node_id());
    h.execution.inner().add_depend(b.node_id(), a.node_id());

    let err = h.execution.prepare_build([a]).unwrap_err();
    assert!(matches!(err, EngineError::Cycle { .. }));
}

#[test]
fn fileset_target_grows_during_build() {
    struct Collector {
        inputs: BuilderInputs,
        sources: Vec<FileNode>,
        set: trestle::node::FileSetNode,
    }

    impl Builder for Collector {
        fn depends(&self) -> &[NodeId] {
            self.inputs.depends()
        }
        fn builds(&self) -> &[NodeId] {
            self.inputs.builds()
        }
        fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError> {
            for &src in &self.sources {
                ctx.add_to_fileset(self.set, src);
            }
            Ok(())
        }
        fn display(&self) -> String {
            "collector".to_string()
        }
    }

    let h = Harness::new();
    h.fs.write("/root/one.txt", b"1");
    h.fs.write("/root/two.txt", b"2");
    let env = h.execution.default_environment();
    let one = env.file("one.txt").unwrap();
    let two = env.file("two.txt").unwrap();

    let mut inputs = BuilderInputs::new(env.clone());
    inputs.depends_file(one).unwrap();
    inputs.depends_file(two).unwrap();
    let set = inputs.register_fileset_target();
    h.execution
        .register_builder(Arc::new(Collector {
            inputs,
            sources: vec![one, two],
            set,
        }))
        .unwrap();

    h.execution
        .build_targets([set], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();

    let deps = h.execution.inner().depends_of(set.node_id());
    assert!(deps.contains(&one.node_id()));
    assert!(deps.contains(&two.node_id()));
}

#[test]
fn multi_output_builder_runs_exactly_once() {
    struct WriteTwo {
        inputs: BuilderInputs,
        fs: Arc<MockFilesystem>,
        foo: FileNode,
        bar: FileNode,
        runs: Arc<Mutex<u32>>,
    }

    impl Builder for WriteTwo {
        fn depends(&self) -> &[NodeId] {
            self.inputs.depends()
        }
        fn builds(&self) -> &[NodeId] {
            self.inputs.builds()
        }
        fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError> {
            *self.runs.lock().unwrap() += 1;
            self.fs.write(ctx.path_of(self.foo), "File 0");
            self.fs.write(ctx.path_of(self.bar), "File 1");
            Ok(())
        }
        fn display(&self) -> String {
            "write-two".to_string()
        }
    }

    let h = Harness::new();
    let env = h.execution.default_environment();
    let mut inputs = BuilderInputs::new(env);
    let foo = inputs.register_file_target("foo.txt").unwrap();
    let bar = inputs.register_file_target("bar.txt").unwrap();
    let runs = Arc::new(Mutex::new(0));
    h.execution
        .register_builder(Arc::new(WriteTwo {
            inputs,
            fs: h.fs.clone(),
            foo,
            bar,
            runs: runs.clone(),
        }))
        .unwrap();

    h.execution
        .build_targets([foo, bar], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();

    assert_eq!(*runs.lock().unwrap(), 1);
    assert_eq!(h.fs.read("/root/foo.txt"), Some(b"File 0".to_vec()));
    assert_eq!(h.fs.read("/root/bar.txt"), Some(b"File 1".to_vec()));
}

#[test]
fn directory_builder_output_is_iterable() {
    struct WriteDir {
        inputs: BuilderInputs,
        fs: Arc<MockFilesystem>,
        dir: trestle::DirNode,
    }

    impl Builder for WriteDir {
        fn depends(&self) -> &[NodeId] {
            self.inputs.depends()
        }
        fn builds(&self) -> &[NodeId] {
            self.inputs.builds()
        }
        fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError> {
            let base = ctx.path_of(self.dir);
            self.fs.write(base.join("foo.txt"), "foo");
            self.fs.write(base.join("bar.txt"), "bar");
            Ok(())
        }
        fn display(&self) -> String {
            "write-dir".to_string()
        }
    }

    let h = Harness::new();
    let env = h.execution.default_environment();
    let mut inputs = BuilderInputs::new(env);
    let dir = inputs.register_dir_target("foo").unwrap();
    h.execution
        .register_builder(Arc::new(WriteDir {
            inputs,
            fs: h.fs.clone(),
            dir,
        }))
        .unwrap();

    h.execution
        .build_targets([dir], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();

    let mut entries = h.fs.list_dir(std::path::Path::new("/root/foo"), &|_| true).unwrap();
    entries.sort();
    assert_eq!(
        entries,
        vec![std::path::PathBuf::from("bar.txt"), std::path::PathBuf::from("foo.txt")]
    );
}

#[test]
fn interning_the_same_path_returns_the_same_node() {
    let h = Harness::new();
    h.fs.write("/root/a.txt", b"a");
    let env = h.execution.default_environment();
    let first = env.file("a.txt").unwrap();
    let second = env.file("a.txt").unwrap();
    assert_eq!(first, second);
}

#[test]
fn dry_run_leaves_filesystem_and_metadata_untouched() {
    let h = Harness::new();
    h.fs.write("/root/in.txt", b"hello");
    let out = h.copy("copy-a", "in.txt", "out.txt");

    let cfg = ExecConfig {
        dry_run: true,
        ..ExecConfig::default()
    };
    h.execution.build_targets([out], &NOOP_PROGRESS, &cfg).unwrap();

    assert!(h.fs.read("/root/out.txt").is_none());
    // The builder itself still runs under dry-run (it decides whether to
    // honor it), but a second dry-run reports the same `to_build` set since
    // nothing was actually committed.
    let prepared = h
        .execution
        .build_targets([out], &NOOP_PROGRESS, &cfg)
        .unwrap();
    assert!(!prepared.to_build.is_empty());
}
