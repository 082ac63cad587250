//! Demo CLI: drives a JSON-persisted engine instance from the shell.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ltm_engine::config::EngineConfig;
use ltm_engine::model::{MemoryKind, NewMemory, RetrievalQuery};
use ltm_engine::{observability, SystemFacade};

#[derive(Parser)]
#[command(name = "ltm-cli", about = "Long-term memory engine command-line demo")]
struct Cli {
    /// Directory holding `memories.json`; created if missing.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a new memory.
    Store {
        id: String,
        #[arg(value_enum)]
        kind: CliMemoryKind,
        content: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Retrieve memories matching free text.
    Retrieve {
        text: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        include_related: bool,
    },
    /// Print aggregate system statistics.
    Stats,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliMemoryKind {
    ShortTerm,
    LongTerm,
    Working,
    Episodic,
    Semantic,
    Procedural,
    Consolidated,
}

impl From<CliMemoryKind> for MemoryKind {
    fn from(value: CliMemoryKind) -> Self {
        match value {
            CliMemoryKind::ShortTerm => MemoryKind::ShortTerm,
            CliMemoryKind::LongTerm => MemoryKind::LongTerm,
            CliMemoryKind::Working => MemoryKind::Working,
            CliMemoryKind::Episodic => MemoryKind::Episodic,
            CliMemoryKind::Semantic => MemoryKind::Semantic,
            CliMemoryKind::Procedural => MemoryKind::Procedural,
            CliMemoryKind::Consolidated => MemoryKind::Consolidated,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init_logging_with_level(cli.verbose, false)?;

    let mut config = EngineConfig::default();
    config.memory.persistence.enabled = true;
    config.memory.persistence.dir = cli.data_dir;

    let mut facade = SystemFacade::new(config);
    facade.initialize().await?;

    match cli.command {
        Command::Store { id, kind, content, tags } => {
            let new = NewMemory::new(id.clone(), kind.into(), content).with_tags(tags);
            let stored = facade.store_memory(new)?;
            if stored {
                println!("stored {id}");
            } else {
                println!("{id} already exists");
            }
        }
        Command::Retrieve { text, limit, include_related } => {
            let mut query = RetrievalQuery::new();
            query.text = Some(text);
            query.limit = limit;
            query.include_related = include_related;
            let result = facade.retrieve_memories(&query)?;
            println!(
                "{} result(s), confidence {:.2}",
                result.total_results, result.confidence
            );
            for memory in &result.memories {
                println!("  [{}] {} — {}", memory.id, memory.kind.as_str(), memory.content);
            }
        }
        Command::Stats => {
            let stats = facade.get_system_stats();
            println!("memories: {}", stats.memory_count);
            println!("graph nodes: {}", stats.node_count);
            println!("graph edges: {}", stats.edge_count);
            println!("rules: {}", stats.rule_count);
            println!("queries: {}", stats.total_queries);
        }
    }

    facade.flush_pending_persistence().await?;
    facade.destroy().await?;
    Ok(())
}
