use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use facewatch_core::Embedding;

mod config;
mod replay;
mod run;
mod store;

use config::Config;
use store::GalleryStore;

#[derive(Parser)]
#[command(name = "facewatch", about = "Frame-by-frame identity and liveness verification")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll precomputed embeddings under a label.
    Enroll {
        /// Person label the embeddings belong to.
        #[arg(long)]
        label: String,
        /// JSON file: one embedding (array of floats) or an array of them.
        #[arg(long)]
        input: PathBuf,
    },
    /// List enrolled gallery entries.
    List,
    /// Remove a gallery entry by id.
    Remove {
        #[arg(long)]
        id: String,
    },
    /// Run the verification loop over a recorded observation stream
    /// (JSON lines; stdin when no file is given).
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

/// Enrollment file shape: a bare embedding or a batch of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum EnrollInput {
    One(Vec<f32>),
    Many(Vec<Vec<f32>>),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Enroll { label, input } => enroll(&config, &label, &input),
        Command::List => list(&config),
        Command::Remove { id } => remove(&config, &id),
        Command::Run { input } => run::run(&config, input),
    }
}

fn enroll(config: &Config, label: &str, input: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let parsed: EnrollInput =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", input.display()))?;
    let embeddings = match parsed {
        EnrollInput::One(values) => vec![values],
        EnrollInput::Many(batch) => batch,
    };
    if embeddings.is_empty() {
        bail!("no embeddings in {}", input.display());
    }

    let store = GalleryStore::open(&config.db_path)?;
    for values in &embeddings {
        let id = store.insert(label, &Embedding::new(values.clone()))?;
        tracing::info!(label, id = %id, "embedding enrolled");
    }
    println!("enrolled {} embedding(s) for '{label}'", embeddings.len());
    Ok(())
}

fn list(config: &Config) -> Result<()> {
    let store = GalleryStore::open(&config.db_path)?;
    let entries = store.list()?;
    if entries.is_empty() {
        println!("gallery is empty");
        return Ok(());
    }
    for entry in entries {
        println!("{}  {}  {}", entry.id, entry.label, entry.created_at);
    }
    Ok(())
}

fn remove(config: &Config, id: &str) -> Result<()> {
    let store = GalleryStore::open(&config.db_path)?;
    if store.remove(id)? {
        println!("removed {id}");
    } else {
        bail!("no gallery entry with id {id}");
    }
    Ok(())
}
