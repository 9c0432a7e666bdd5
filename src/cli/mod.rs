//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kbflow",
    version,
    about = "Workflow-aware hybrid retrieval over an engineering knowledge base",
    long_about = "kbflow runs root-cause, trade-study, exploratory and planning searches over a \
                  knowledge corpus, and tracks project lifecycle and decision provenance across \
                  sessions."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/kbflow/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a workflow search against a corpus file
    Search {
        /// JSON corpus: an array of {chunk_id, content, metadata}
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Record the query against this project
        #[arg(short, long, value_name = "PROJECT_ID")]
        project: Option<String>,

        /// Number of results (defaults per workflow)
        #[arg(short = 'n', long)]
        n_results: Option<usize>,

        /// Disable dense+keyword fusion for this search
        #[arg(long)]
        no_fusion: bool,

        #[command(subcommand)]
        workflow: SearchWorkflow,
    },

    /// Manage projects and their decisions
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SearchWorkflow {
    /// Root-cause and corrective-action analysis
    Rcca {
        query: String,

        /// Restrict to these document types (repeatable)
        #[arg(long = "document-type")]
        document_types: Vec<String>,
    },

    /// Compare alternatives against criteria
    Trade {
        query: String,

        /// Alternative to compare (repeatable)
        #[arg(short, long = "alternative", required = true)]
        alternatives: Vec<String>,

        /// Criterion to compare on (repeatable)
        #[arg(short = 'k', long = "criterion", required = true)]
        criteria: Vec<String>,
    },

    /// Explore a topic across facets
    Explore {
        query: String,

        /// Facet to cover (repeatable)
        ///
        /// Defaults to definitions, examples, standards and best_practices.
        #[arg(short, long = "facet")]
        facets: Vec<String>,
    },

    /// Gather planning material
    Plan {
        query: String,

        /// Scope to templates, risks, lessons_learned or precedents
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// Start a new project in PLANNING
    Start {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List projects
    List {
        /// Include completed and abandoned projects
        #[arg(short, long)]
        all: bool,
    },

    /// Show a project with its history and decisions
    Show { project_id: String },

    /// Move a project to ACTIVE, COMPLETED or ABANDONED
    Transition { project_id: String, status: String },

    /// Delete a project with all of its history and decisions
    Delete {
        project_id: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Record a decision with supporting chunks
    Decide {
        project_id: String,

        /// The decision taken
        #[arg(short, long)]
        decision: String,

        #[arg(short, long, default_value = "")]
        rationale: String,

        /// Alternative that was considered (repeatable)
        #[arg(short, long = "alternative")]
        alternatives: Vec<String>,

        /// Supporting chunk as CHUNK_ID:RELEVANCE (repeatable)
        #[arg(short, long = "source", value_parser = parse_source)]
        sources: Vec<(String, f64)>,
    },

    /// Show the queries recorded for a project
    History { project_id: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

/// Parse `CHUNK_ID:RELEVANCE`; the chunk id may itself contain colons
pub fn parse_source(raw: &str) -> Result<(String, f64), String> {
    let (chunk_id, relevance) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected CHUNK_ID:RELEVANCE, got '{}'", raw))?;
    if chunk_id.is_empty() {
        return Err(format!("missing chunk id in '{}'", raw));
    }
    let relevance: f64 = relevance
        .parse()
        .map_err(|_| format!("invalid relevance '{}'", relevance))?;
    if !(0.0..=1.0).contains(&relevance) {
        return Err(format!("relevance must be within [0, 1], got {}", relevance));
    }
    Ok((chunk_id.to_string(), relevance))
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
