//! Demonstrates `trestle` used the way `cc` is used from a `build.rs`: two
//! builders (emit a generated C source, compile it into a static library)
//! wired up against an `Execution` and built twice to show the second run
//! skip everything via the metadata store.

use std::{env, fs, path::PathBuf, sync::Arc};

use trestle::{
    BuildContext, Builder, BuilderError, BuilderInputs, Environment, Execution, ExecConfig,
    FileNode, InMemoryStore, LocalFilesystem, NodeId, NOOP_PROGRESS,
};

const DEMO_SOURCE: &str = r#"
#include <stdint.h>

int add_numbers(int a, int b) {
    return a + b;
}
"#;

struct GenerateSource {
    inputs: BuilderInputs,
    output: FileNode,
}

impl Builder for GenerateSource {
    fn depends(&self) -> &[NodeId] {
        self.inputs.depends()
    }

    fn builds(&self) -> &[NodeId] {
        self.inputs.builds()
    }

    fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError> {
        let path = ctx.path_of(self.output);
        fs::write(&path, DEMO_SOURCE.as_bytes())?;
        println!("cargo:warning=wrote {}", path.display());
        Ok(())
    }

    fn display(&self) -> String {
        "generate-demo-c".to_string()
    }
}

struct CompileLibrary {
    inputs: BuilderInputs,
    source: FileNode,
    lib_name: String,
    out_dir: PathBuf,
}

impl Builder for CompileLibrary {
    fn depends(&self) -> &[NodeId] {
        self.inputs.depends()
    }

    fn builds(&self) -> &[NodeId] {
        self.inputs.builds()
    }

    fn build(&self, ctx: &BuildContext) -> Result<(), BuilderError> {
        let source = ctx.path_of(self.source);
        println!("cargo:warning=invoking cc to produce lib{}.a", self.lib_name);
        cc::Build::new()
            .file(&source)
            .out_dir(&self.out_dir)
            .try_compile(&self.lib_name)?;
        Ok(())
    }

    fn display(&self) -> String {
        "compile-demo-lib".to_string()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR set by cargo"));
    let lib_name = env::var("CARGO_PKG_NAME").unwrap_or_else(|_| "build_rs_demo".into());

    let store = Arc::new(InMemoryStore::new());
    let execution = Execution::new(out_dir.clone(), store, Arc::new(LocalFilesystem));
    let env: Environment = execution.default_environment();

    fs::create_dir_all(&out_dir)?;

    let mut gen_inputs = BuilderInputs::new(env.clone());
    let generated_c = gen_inputs.register_file_target(out_dir.join("trestle_demo.c"))?;
    execution.register_builder(Arc::new(GenerateSource {
        inputs: gen_inputs,
        output: generated_c,
    }))?;

    let mut compile_inputs = BuilderInputs::new(env.clone());
    compile_inputs.depends_file(generated_c)?;
    let static_lib = compile_inputs.register_file_target(out_dir.join(format!("lib{lib_name}.a")))?;
    execution.register_builder(Arc::new(CompileLibrary {
        inputs: compile_inputs,
        source: generated_c,
        lib_name: lib_name.clone(),
        out_dir: out_dir.clone(),
    }))?;

    println!("cargo:warning=running trestle demo graph to populate cache");
    execution.build_targets([static_lib], &NOOP_PROGRESS, &ExecConfig::default())?;

    println!("cargo:warning=running trestle demo graph again to show cache hit");
    execution.build_targets([static_lib], &NOOP_PROGRESS, &ExecConfig::default())?;

    println!("cargo:rustc-link-search=native={}", out_dir.display());
    println!("cargo:rustc-link-lib=static={lib_name}");

    Ok(())
}
