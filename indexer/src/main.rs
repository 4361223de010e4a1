use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sitesearch_core::persist::{load_or_default, save_store, StorePaths};
use sitesearch_core::{search_for, Indexer, Locale, PageInput, SearchOptions, Store};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query sitesearch store snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index JSONL page records from a file or a directory of .jsonl files
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Store snapshot directory
        #[arg(long, default_value = "./store")]
        store: String,
    },
    /// Remove every entry indexed under a URL
    Remove {
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "./store")]
        store: String,
    },
    /// Run a query against a snapshot and print the ranked rows
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "./store")]
        store: String,
        /// Match any plain keyword instead of all of them
        #[arg(long, default_value_t = false)]
        or: bool,
        /// Turn plain keywords into substring wildcards
        #[arg(long, default_value_t = false)]
        fuzzy: bool,
        /// Maximum number of rows (0 = unlimited)
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Locale used to segment the query
        #[arg(long, default_value = "en")]
        locale: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, store } => build(&input, &store),
        Commands::Remove { url, store } => remove(&url, &store),
        Commands::Search {
            query,
            store,
            or,
            fuzzy,
            limit,
            locale,
        } => search(&query, &store, or, fuzzy, limit, &locale),
    }
}

fn build(input: &str, store_dir: &str) -> Result<()> {
    let paths = StorePaths::new(store_dir);
    let store = Arc::new(load_or_default(&paths)?);
    let indexer = Indexer::new(store.clone());

    let mut files: Vec<PathBuf> = Vec::new();
    let input_path = Path::new(input);
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                files.push(p.to_path_buf());
            }
        }
    } else {
        files.push(input_path.to_path_buf());
    }

    let mut created = 0usize;
    let mut seen = 0usize;
    for file in files {
        let reader = BufReader::new(
            File::open(&file).with_context(|| format!("open {}", file.display()))?,
        );
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let page: PageInput = serde_json::from_str(&line)
                .with_context(|| format!("parse page record in {}", file.display()))?;
            seen += 1;
            if indexer.index_page(page)? {
                created += 1;
            }
        }
    }

    save_store(&paths, &store)?;
    tracing::info!(seen, created, store = store_dir, "index build complete");
    Ok(())
}

fn remove(url: &str, store_dir: &str) -> Result<()> {
    let paths = StorePaths::new(store_dir);
    let store = Arc::new(load_or_default(&paths)?);
    let indexer = Indexer::new(store.clone());
    indexer.remove_entry(url)?;
    save_store(&paths, &store)?;
    Ok(())
}

fn search(
    query: &str,
    store_dir: &str,
    or: bool,
    fuzzy: bool,
    limit: usize,
    locale: &str,
) -> Result<()> {
    let paths = StorePaths::new(store_dir);
    let store: Store = load_or_default(&paths)?;

    let options = SearchOptions {
        or_search: or,
        fuzzy,
        limit,
        locale: Locale::parse(locale)?,
        ..Default::default()
    };
    let results = search_for(&store, query, &options)?;

    eprintln!("total={}", results.total);
    for hit in results.hits {
        println!("{}", serde_json::to_string(&hit)?);
    }
    Ok(())
}
