use anyhow::Result;

mod cli;

fn main() -> Result<()> {
    // Log to stderr to keep stdout clean for piped search results
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    cli::run()
}
