//! Restores a `<db>.backup-YYYY-MM-DD[-HHMMSS].db` snapshot over a live
//! database path, after taking one last backup of whatever is currently
//! there so a bad restore is itself recoverable.

use clap::Parser;
use mneme_core::Storage;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mneme-restore", about = "Restore a mneme database from a backup snapshot")]
struct Args {
    /// Path to the `.backup-*.db` snapshot to restore
    backup_path: PathBuf,

    /// Destination database path; defaults to the platform data directory's project database
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();

    if !args.backup_path.is_file() {
        eprintln!("error: backup file not found: {}", args.backup_path.display());
        std::process::exit(1);
    }

    let db_path = match args.db_path.clone() {
        Some(p) => p,
        None => match Storage::default_path() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("error: could not resolve default database path: {e}");
                std::process::exit(1);
            }
        },
    };

    if db_path.exists() {
        match Storage::new(Some(db_path.clone())) {
            Ok(existing) => match existing.backup(usize::MAX) {
                Ok(safety) => println!("backed up current database to {}", safety.display()),
                Err(e) => {
                    eprintln!("error: failed to back up current database before restore: {e}");
                    std::process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("error: could not open current database for a pre-restore backup: {e}");
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = std::fs::copy(&args.backup_path, &db_path) {
        eprintln!("error: failed to copy backup into place: {e}");
        std::process::exit(1);
    }

    match Storage::new(Some(db_path.clone())) {
        Ok(restored) => match restored.schema_version() {
            Ok(version) => println!("restored {} (schema version {version})", db_path.display()),
            Err(e) => eprintln!("warning: restored database opened but version check failed: {e}"),
        },
        Err(e) => {
            eprintln!("error: restored database failed to open: {e}");
            std::process::exit(1);
        }
    }
}
