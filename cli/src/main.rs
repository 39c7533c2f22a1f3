use clap::Parser;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = trestle_cli::Args::parse();

    let Some(construct_path) = &args.construct else {
        anyhow::bail!(
            "--construct PATH is required; this binary does not dynamically load a compiled \
             construct file (that loader is an external collaborator, not part of this crate). \
             Link your construct function in at compile time instead, the way demos/build_rs does."
        );
    };

    anyhow::bail!(
        "dynamic loading of {} is not implemented; see demos/build_rs for the compile-time pattern",
        construct_path.display()
    );
}
