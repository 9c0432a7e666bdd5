use anyhow::{bail, Context};
use kbflow::cli::{Cli, Commands, ConfigAction, ProjectAction, SearchWorkflow};
use kbflow::config::Config;
use kbflow::project::{NewDecision, ProjectStatus};
use kbflow::retrieval::{HybridSearcher, InMemorySearcher, SemanticSearcher};
use kbflow::storage::{open_repository, ProjectRepository};
use kbflow::tools::{
    error_response, ExploreRequest, KnowledgeTools, PlanRequest, RccaRequest, ToolResult,
    TradeRequest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            corpus,
            project,
            n_results,
            no_fusion,
            workflow,
        } => cmd_search(cli.config, &corpus, project, n_results, no_fusion, workflow).await,
        Commands::Project { action } => cmd_project(cli.config, action).await,
        Commands::Config { action } => cmd_config(cli.config, action),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "kbflow=debug" } else { "kbflow=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_search(
    config_path: Option<PathBuf>,
    corpus: &Path,
    project: Option<String>,
    n_results: Option<usize>,
    no_fusion: bool,
    workflow: SearchWorkflow,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let memory = Arc::new(InMemorySearcher::from_json_file(corpus)?);
    let searcher: Arc<dyn SemanticSearcher> = if config.fusion.enabled && !no_fusion {
        Arc::new(HybridSearcher::from_settings(memory, &config.fusion)?)
    } else {
        memory
    };

    let mut tools = KnowledgeTools::new(searcher, config.search.clone());
    if project.is_some() {
        tools = tools.with_repository(open_repository(&config.storage)?);
    }

    let result = match workflow {
        SearchWorkflow::Rcca {
            query,
            document_types,
        } => {
            tools
                .rcca(RccaRequest {
                    query,
                    document_types: (!document_types.is_empty()).then_some(document_types),
                    project_id: project,
                    n_results,
                })
                .await
        }
        SearchWorkflow::Trade {
            query,
            alternatives,
            criteria,
        } => {
            tools
                .trade(TradeRequest {
                    query,
                    alternatives,
                    criteria,
                    project_id: project,
                    n_results,
                })
                .await
        }
        SearchWorkflow::Explore { query, facets } => {
            tools
                .explore(ExploreRequest {
                    query,
                    facets: (!facets.is_empty()).then_some(facets),
                    project_id: project,
                    n_results,
                })
                .await
        }
        SearchWorkflow::Plan { query, category } => {
            tools
                .plan(PlanRequest {
                    query,
                    category,
                    project_id: project,
                    n_results,
                })
                .await
        }
    };

    print_result(result)
}

async fn cmd_project(config_path: Option<PathBuf>, action: ProjectAction) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let repository = open_repository(&config.storage)?;

    match action {
        ProjectAction::Start { name, description } => {
            let project = repository.create(&name, description.as_deref())?;
            println!("✓ Started project {}", project.name);
            println!("  ID: {}", project.id);
            println!("  Status: {}", project.status);
        }
        ProjectAction::List { all } => {
            let projects = if all {
                repository.list_all()?
            } else {
                repository.list_active()?
            };

            if projects.is_empty() {
                println!("No projects");
                return Ok(());
            }
            for project in projects {
                println!(
                    "  {}  {:<10} {} ({})",
                    project.id,
                    project.status.as_str(),
                    project.name,
                    project.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ProjectAction::Show { project_id } => {
            let tools = project_tools(repository);
            print_result(tools.project_summary(&project_id).await)?;
        }
        ProjectAction::Transition { project_id, status } => {
            let target: ProjectStatus = status.parse()?;
            let project = repository.transition_state(&parse_id(&project_id)?, target)?;
            println!("✓ {} is now {}", project.name, project.status);
        }
        ProjectAction::Delete { project_id, force } => {
            let id = parse_id(&project_id)?;
            let project = repository
                .get_by_id(&id)?
                .with_context(|| format!("Project not found: {}", project_id))?;

            if !force {
                println!(
                    "This deletes '{}' with {} queries and {} decisions. Re-run with --force.",
                    project.name,
                    repository.query_history(&id)?.len(),
                    repository.decision_count(&id)?
                );
                return Ok(());
            }

            repository.delete(&id)?;
            println!("✓ Deleted project {}", project.name);
        }
        ProjectAction::Decide {
            project_id,
            decision,
            rationale,
            alternatives,
            sources,
        } => {
            let mut new_decision =
                NewDecision::new(decision, rationale).with_alternatives(alternatives);
            for (chunk_id, relevance) in sources {
                new_decision = new_decision.with_source(chunk_id, relevance);
            }

            let recorded = repository.capture_decision(&parse_id(&project_id)?, &new_decision)?;
            println!(
                "✓ Recorded decision {} with {} sources",
                recorded.decision.id,
                recorded.sources.len()
            );
        }
        ProjectAction::History { project_id } => {
            let history = repository.query_history(&parse_id(&project_id)?)?;
            if history.is_empty() {
                println!("No queries recorded");
            }
            for entry in history {
                println!(
                    "  {}  {:>3} results  {}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.result_count,
                    entry.query
                );
            }
        }
    }

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'kbflow config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Tool surface for project commands, which never search
fn project_tools(repository: ProjectRepository) -> KnowledgeTools {
    let empty: Arc<dyn SemanticSearcher> = Arc::new(InMemorySearcher::new(Vec::new()));
    KnowledgeTools::new(empty, Default::default()).with_repository(repository)
}

fn parse_id(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid project id: {}", raw))
}

fn print_result(result: ToolResult) -> anyhow::Result<()> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(error) => {
            println!("{}", serde_json::to_string_pretty(&error_response(&error))?);
            bail!("{}", error)
        }
    }
}
