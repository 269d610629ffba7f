//! `jira-hierarchy` loads Jira product initiatives, their plans and the
//! tickets under those plans into a cached three-level hierarchy.
//! Issues are mapped into dynamic records or typed entities and flattened
//! into plain report rows.

/// One-way latch collections backing the repository.
pub mod cache;
/// Runtime configuration loading and validation.
pub mod config;
/// Static registry of Jira fields and per-query alias lookup.
pub mod fields;
/// Jira API client, endpoint trait and error taxonomy.
pub mod jira;
/// Tracing subscriber setup.
pub mod logging;
/// Raw issue JSON to records and typed entities.
pub mod mapper;
/// Runtime metrics counters.
pub mod metrics;
/// Initiative, plan, ticket and sprint entities.
pub mod model;
/// Dynamic record values.
pub mod record;
/// Typed report rows and hyperlink formulas.
pub mod report;
/// Cached initiative → plan → ticket hierarchy.
pub mod repository;
/// Paginated JQL execution and the hierarchy queries.
pub mod runner;

#[cfg(test)]
mod testing;
