use tracing_subscriber::EnvFilter;

use crate::config::is_truthy;

pub const DEBUG_ENV: &str = "JIRA_HIERARCHY_DEBUG";

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug,reqwest=info,hyper_util=info"
    } else {
        "info"
    }
}

fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

pub fn init(debug: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(default_directive(debug || debug_from_env()))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
