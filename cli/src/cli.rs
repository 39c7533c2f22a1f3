use std::path::PathBuf;

/// `trestle [--construct PATH] [--dry-run] [-B|--always-make] [--tree] [-jN] TARGET...`
#[derive(Debug, clap::Parser)]
#[clap(name = "trestle", version, author)]
pub struct Args {
    /// The targets (paths or aliases) to build. Defaults to the construct
    /// file's default alias if empty.
    pub targets: Vec<String>,

    /// Path to the compiled construct file to evaluate. Unlike a scripting
    /// engine's construct file, this must already be a loadable `cdylib`; the
    /// demo binaries under `demos/` link their construct function in at
    /// compile time instead and don't take this flag.
    #[clap(long, name = "PATH")]
    pub construct: Option<PathBuf>,

    /// Compute and report what's outdated, but run no builders.
    #[clap(long)]
    pub dry_run: bool,

    /// Treat every entry as outdated, regardless of its metadata signature.
    #[clap(short = 'B', long)]
    pub always_make: bool,

    /// Print the dependency tree for the requested targets instead of
    /// building them.
    #[clap(long)]
    pub tree: bool,

    /// Run N builders in parallel (default: number of CPU cores).
    #[clap(short, long, name = "N")]
    pub jobs: Option<usize>,

    /// Root directory for the build. Defaults to the current directory.
    #[clap(short = 'C', long, name = "DIR")]
    pub root: Option<PathBuf>,
}
