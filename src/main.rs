// src/main.rs

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use probepal::{
    IngestOptions, MediaFetcher, MediaSource, PalletIngestionPipeline, PalletStore,
    ProberRegistry, SystemRunner, CDROM_MOUNTPOINT, DEFAULT_PALLET_DIR,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Default location of the installed-pallet database
const DEFAULT_DB_PATH: &str = "/var/lib/probepal/pallets.db";

#[derive(Parser)]
#[command(name = "probepal")]
#[command(author, version, about = "Pallet identification and ingestion for cluster provisioning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify pallet media without ingesting it
    Probe {
        /// Media roots (mounted ISOs or expanded trees) to fingerprint
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Copy pallet media into the pallet directory and register it
    Add {
        /// Pallet sources: local or remote ISOs, or expanded directories.
        /// With no sources, a pallet mounted on /mnt/cdrom is added.
        pallets: Vec<String>,

        /// Remove existing files of the same pallet before copying
        #[arg(long)]
        clean: bool,

        /// Base directory to copy pallets to
        #[arg(long, default_value = DEFAULT_PALLET_DIR)]
        dir: PathBuf,

        /// Identify and report only; copy nothing, write nothing
        #[arg(long)]
        dryrun: bool,

        /// Do not record the pallets in the database
        #[arg(long = "no-db")]
        no_db: bool,

        /// Pallet database path
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db_path: PathBuf,

        /// Username, if the download server requires authentication
        #[arg(long)]
        username: Option<String>,

        /// Password, if the download server requires authentication
        #[arg(long)]
        password: Option<String>,
    },
    /// List registered pallets
    List {
        /// Pallet database path
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db_path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match Cli::parse().command {
        Commands::Probe { paths } => probe(&paths),
        Commands::Add {
            pallets,
            clean,
            dir,
            dryrun,
            no_db,
            db_path,
            username,
            password,
        } => add(
            &pallets,
            IngestOptions {
                pallet_dir: dir,
                clean,
                updatedb: !no_db,
                dryrun,
                username,
                password,
            },
            &db_path,
        ),
        Commands::List { db_path } => list(&db_path),
    }
}

fn probe(paths: &[String]) -> Result<()> {
    let registry = ProberRegistry::with_default_probes();
    let mut failures = 0;

    for path in paths {
        println!("====== probing {path} ======");
        match registry.identify(Path::new(path)) {
            Ok(info) => println!("{info}"),
            Err(e) => {
                println!("{e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} media roots unidentified", paths.len());
    }
    Ok(())
}

fn add(args: &[String], options: IngestOptions, db_path: &Path) -> Result<()> {
    // both or neither
    if options.username.is_some() != options.password.is_some() {
        bail!("must supply a password along with the username");
    }

    let runner = SystemRunner::new();

    let store = if options.updatedb && !options.dryrun {
        Some(PalletStore::open(db_path)?)
    } else {
        None
    };
    let pipeline = PalletIngestionPipeline::new(&runner, store.as_ref(), options.clone());

    let mut sources = Vec::new();
    for arg in expand_globs(args) {
        sources.push(MediaSource::classify(&arg)?);
    }

    // no sources named: fall back to whatever is mounted on /mnt/cdrom
    if sources.is_empty() {
        if !MediaFetcher::new(&runner).cdrom_mounted()? {
            bail!("no pallets provided and {CDROM_MOUNTPOINT} is unmounted");
        }
        let report = pipeline.ingest_root(Path::new(CDROM_MOUNTPOINT), CDROM_MOUNTPOINT)?;
        print_report(&report);
        return Ok(());
    }

    // a failing source never aborts siblings; committed sources are reported
    // either way
    let mut failures = 0;
    for source in &sources {
        match pipeline.ingest(source) {
            Ok(report) => print_report(&report),
            Err(e) => {
                eprintln!("error adding {}: {e}", source.location);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} pallet source(s) failed", sources.len());
    }
    Ok(())
}

/// Expand shell-style wildcards in local source arguments.
fn expand_globs(args: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for arg in args {
        let is_pattern = !arg.starts_with("http")
            && !arg.starts_with("ftp")
            && arg.contains(['*', '?', '[']);
        if !is_pattern {
            expanded.push(arg.clone());
            continue;
        }

        let mut matched = false;
        if let Ok(paths) = glob::glob(arg) {
            for path in paths.flatten() {
                expanded.push(path.to_string_lossy().into_owned());
                matched = true;
            }
        }
        // let classification report the miss
        if !matched {
            expanded.push(arg.clone());
        }
    }
    expanded
}

fn print_report(report: &probepal::IngestReport) {
    for pallet in &report.pallets {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            pallet.info.name(),
            pallet.info.version(),
            pallet.info.release(),
            pallet.info.arch(),
            pallet.info.distro_family(),
            report.source
        );
    }
}

fn list(db_path: &Path) -> Result<()> {
    let store = PalletStore::open(db_path)?;
    println!("NAME\tVERSION\tRELEASE\tARCH\tOS\tURL");
    for record in store.list()? {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            record.name, record.version, record.release, record.arch, record.os, record.url
        );
    }
    Ok(())
}
