use clap::Parser;
use efivar_cli::Args;
use efivar_store::{Efivars, VarFs};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for --json output.
    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let vars = Efivars::new(VarFs::new(&args.mount));
    let stdout = std::io::stdout();
    if let Err(e) = efivar_cli::run(&args, &vars, &mut stdout.lock()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
