use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use repo_seeder::config::Config;
use repo_seeder::logging::init_tracing;
use repo_seeder::seeder::{server, walker};

#[derive(Parser)]
#[command(name = "repo-seeder")]
#[command(version, about = "Seed new GitHub repositories from a local staging tree")]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory pushed into each new repository (overrides STAGING_DIR)
        #[arg(long)]
        staging_dir: Option<PathBuf>,

        /// Archive served by /api/download-package (overrides PACKAGE_PATH)
        #[arg(long)]
        package_path: Option<PathBuf>,
    },
    /// List the files a setup job would upload from a directory
    Preview {
        /// Directory to walk
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    config.json_logs |= cli.json_logs;

    match cli.command {
        Commands::Serve {
            port,
            staging_dir,
            package_path,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = staging_dir {
                config.staging_dir = dir;
            }
            if let Some(path) = package_path {
                config.package_path = path;
            }
            let _guard = init_tracing(config.json_logs, config.log_dir.as_deref());
            server::start_server(config).await
        }
        Commands::Preview { dir } => preview(&dir),
    }
}

fn preview(dir: &std::path::Path) -> Result<()> {
    std::fs::read_dir(dir).with_context(|| format!("Cannot read directory {}", dir.display()))?;

    let mut count = 0usize;
    let mut unreadable = 0usize;
    for entry in walker::walk(dir) {
        match entry {
            Ok(file) => {
                println!("{}  ({} bytes)", file.relative_path, file.content.len());
                count += 1;
            }
            Err(err) => {
                eprintln!("unreadable: {} ({})", err.path.display(), err.source);
                unreadable += 1;
            }
        }
    }
    println!("{} file(s) would be uploaded", count);
    if unreadable > 0 {
        anyhow::bail!("{} file(s) could not be read", unreadable);
    }
    Ok(())
}
