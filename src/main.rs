use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use jira_hierarchy::config::{self, AppConfigOverrides};
use jira_hierarchy::jira::JiraClient;
use jira_hierarchy::logging;
use jira_hierarchy::metrics::Metrics;
use jira_hierarchy::report::{initiative_summary_rows, plan_ticket_rows, LinkTarget};
use jira_hierarchy::repository::IssueRepository;
use jira_hierarchy::runner::QueryRunner;

/// Loads the Initiative → Plan → Ticket hierarchy from Jira.
#[derive(Parser, Debug)]
#[command(name = "jira-hierarchy", version, about, long_about = None)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/jira-hierarchy/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Also include initiatives closed within this many months
    #[arg(long)]
    closed_initiative_months: Option<u32>,

    /// Also include plans closed within this many months
    #[arg(long)]
    closed_plan_months: Option<u32>,

    /// Report which initiative and plan own this ticket
    #[arg(long, value_name = "KEY")]
    find: Option<String>,

    /// Show the active sprint of this agile board
    #[arg(long, value_name = "BOARD_ID")]
    board: Option<u64>,

    /// Show a single agile sprint by id
    #[arg(long, value_name = "SPRINT_ID")]
    sprint: Option<u64>,

    /// Print the initiative summary and plan ticket rows as JSON
    #[arg(long)]
    rows: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load()?,
    };
    let overrides = AppConfigOverrides {
        months_of_closed_initiatives: cli.closed_initiative_months,
        months_of_closed_plans: cli.closed_plan_months,
        logging_debug: cli.debug.then_some(true),
        ..AppConfigOverrides::from_env()
    };
    cfg.apply_overrides(&overrides)?;

    logging::init(cfg.logging.debug);

    let metrics = Arc::new(Metrics::new());
    let jira = JiraClient::new(
        cfg.jira.base_url.clone(),
        cfg.jira.email.clone(),
        cfg.jira.api_token.clone(),
    )?
    .with_page_size(cfg.jira.page_size);
    info!(base_url = %jira.base_url, page_size = cfg.jira.page_size, "starting jira-hierarchy");

    match jira.get_myself() {
        Ok(me) => info!(
            display_name = ?me.display_name,
            account_id = ?me.account_id,
            "jira identity"
        ),
        Err(err) => warn!(error = %err, "failed jira identity probe"),
    }

    let links = LinkTarget {
        base_url: jira.base_url.clone(),
        idea_view_id: cfg.report.idea_view_id.clone(),
    };
    let runner = QueryRunner::new(jira, cfg.queries.clone(), Arc::clone(&metrics));
    let mut repository = IssueRepository::new(runner);

    let (initiatives, plans) = repository.open_plans()?;
    let linked_plans: usize = initiatives.iter().map(|i| i.plans().count()).sum();
    info!(
        initiatives = initiatives.len(),
        plans = plans.len(),
        linked_plans,
        "hierarchy loaded"
    );

    if cli.rows {
        let output = serde_json::json!({
            "initiatives": initiative_summary_rows(initiatives, &links),
            "tickets": plan_ticket_rows(plans, &links),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    if let Some(key) = &cli.find {
        match repository.find_ticket_by_key(key) {
            Some((initiative, ticket)) => {
                let plan = repository.leaf_ticket_to_plan_map().get(key);
                println!(
                    "{} [{}] {} -> initiative {} plan {}",
                    ticket.key,
                    ticket.status,
                    ticket.summary,
                    initiative,
                    plan.map(String::as_str).unwrap_or("-")
                );
            }
            None => println!("{key} is not under any linked plan"),
        }
    }

    if let Some(board_id) = cli.board {
        match repository.runner().current_sprint(board_id)? {
            Some(sprint) => println!(
                "board {board_id}: {} ({}) {}",
                sprint.name,
                sprint.state,
                sprint
                    .end_date
                    .map(|end| format!("ends {}", end.format("%Y-%m-%d")))
                    .unwrap_or_default()
            ),
            None => println!("board {board_id}: no active sprint"),
        }
    }

    if let Some(sprint_id) = cli.sprint {
        match repository.runner().sprint_by_id(sprint_id)? {
            Some(sprint) => println!(
                "sprint {sprint_id}: {} ({}) board {}",
                sprint.name, sprint.state, sprint.board_id
            ),
            None => println!("sprint {sprint_id}: not found"),
        }
    }

    metrics.log_summary();
    Ok(())
}
