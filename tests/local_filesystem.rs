//! Exercises the engine against the real disk via `LocalFilesystem`, in a
//! `tempfile` sandbox, rather than the in-memory mock the other test file
//! uses — catches anything the mock's simplified semantics might hide (e.g.
//! `create_dir_all` actually creating parent directories).

use std::{fs, sync::Arc};

use test_log::test;
use trestle::{
    BuildContext, Builder, BuilderError, BuilderInputs, Execution, ExecConfig, FileNode,
    InMemoryStore, LocalFilesystem, NodeId, NOOP_PROGRESS,
};

struct WriteGreeting {
    inputs: BuilderInputs,
    output: FileNode,
}

impl Builder for WriteGreeting {
    fn depends(&self) -> &[NodeId] {
        self.inputs.depends()
    }

    fn builds(&self) -> &[NodeId] {
        self.inputs.builds()
    }

    fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError> {
        fs::write(ctx.path_of(self.output), "Hello, world!")?;
        Ok(())
    }

    fn display(&self) -> String {
        "write-greeting".to_string()
    }
}

#[test]
fn builder_writes_through_to_real_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let execution = Execution::new(dir.path(), store, Arc::new(LocalFilesystem));
    let env = execution.default_environment();

    let mut inputs = BuilderInputs::new(env);
    let output = inputs.register_file_target(dir.path().join("build/foo.txt")).unwrap();
    execution
        .register_builder(Arc::new(WriteGreeting { inputs, output }))
        .unwrap();

    execution
        .build_targets([output], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("build/foo.txt")).unwrap(),
        "Hello, world!"
    );

    let prepared = execution
        .build_targets([output], &NOOP_PROGRESS, &ExecConfig::default())
        .unwrap();
    assert!(prepared.to_build.is_empty());
}
