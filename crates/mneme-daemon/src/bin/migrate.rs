//! Standalone migration runner: opens the database (applying any pending
//! forward migrations as a side effect of `Storage::new`) and reports the
//! resulting schema version.

use clap::Parser;
use mneme_core::Storage;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mneme-migrate", about = "Apply pending schema migrations to a mneme database")]
struct Args {
    /// Database path; defaults to the platform data directory's project database
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    let storage = match Storage::new(args.db_path.clone()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to open database: {e}");
            std::process::exit(1);
        }
    };

    match storage.schema_version() {
        Ok(version) => println!("schema at version {version} ({})", storage.path().display()),
        Err(e) => {
            eprintln!("error: failed to read schema version: {e}");
            std::process::exit(1);
        }
    }
}
