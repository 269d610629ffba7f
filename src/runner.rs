use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::fields::{self, requested_field_names, FieldAliasIndex, FieldMapping};
use crate::jira::{JiraEndpoint, JiraError};
use crate::mapper::{
    initiative_from_json, map_issue, plan_from_json, sprint_from_json, ticket_from_json,
    LinkDirection,
};
use crate::metrics::Metrics;
use crate::model::{dedupe_by_key, AgileSprint, Initiative, Plan, TicketWithParent};
use crate::record::Record;

pub const SPRINT_PAGE_SIZE: usize = 50;

const WEEKS_PLACEHOLDER: &str = "{weeks}";

const INITIATIVE_FIELDS: [FieldMapping; 5] = [
    fields::SUMMARY.mapping,
    fields::STATUS.mapping,
    fields::REQUIRED_FOR_GO_LIVE.mapping,
    fields::ISSUE_LINKS.mapping,
    fields::CUSTOMERS.mapping,
];

const PLAN_FIELDS: [FieldMapping; 4] = [
    fields::SUMMARY.mapping,
    fields::STATUS.mapping,
    fields::REQUIRED_FOR_GO_LIVE.mapping,
    fields::ISSUE_LINKS.mapping,
];

const EPIC_CHILD_FIELDS: [FieldMapping; 4] = [
    fields::ISSUE_TYPE.mapping,
    fields::SUMMARY.mapping,
    fields::PARENT_KEY.mapping,
    fields::STATUS.mapping,
];

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HierarchyQueries {
    #[serde(default = "default_initiatives_jql")]
    pub initiatives_jql: String,
    #[serde(default = "default_closed_initiatives_jql")]
    pub closed_initiatives_jql: String,
    #[serde(default = "default_plans_jql")]
    pub plans_jql: String,
    #[serde(default = "default_closed_plans_jql")]
    pub closed_plans_jql: String,
    #[serde(default)]
    pub months_of_closed_initiatives: u32,
    #[serde(default)]
    pub months_of_closed_plans: u32,
    #[serde(default = "default_epic_batch_size")]
    pub epic_batch_size: usize,
}

impl Default for HierarchyQueries {
    fn default() -> Self {
        Self {
            initiatives_jql: default_initiatives_jql(),
            closed_initiatives_jql: default_closed_initiatives_jql(),
            plans_jql: default_plans_jql(),
            closed_plans_jql: default_closed_plans_jql(),
            months_of_closed_initiatives: 0,
            months_of_closed_plans: 0,
            epic_batch_size: default_epic_batch_size(),
        }
    }
}

fn default_initiatives_jql() -> String {
    r#"type = "Product Initiative" AND status NOT IN (Cancelled, "Feature Delivered") ORDER BY key"#
        .to_string()
}

fn default_closed_initiatives_jql() -> String {
    r#"type = "Product Initiative" AND status IN (Cancelled, "Feature Delivered") AND status CHANGED TO (Cancelled, "Feature Delivered") AFTER -{weeks}w ORDER BY key"#
        .to_string()
}

fn default_plans_jql() -> String {
    r#"project = "PMPLAN" AND type = idea AND status NOT IN ("Feature delivered", Cancelled) ORDER BY key"#
        .to_string()
}

fn default_closed_plans_jql() -> String {
    r#"project = "PMPLAN" AND type = idea AND status IN ("Feature delivered", Cancelled) AND status CHANGED TO (Cancelled, "Feature Delivered") AFTER -{weeks}w ORDER BY key"#
        .to_string()
}

const fn default_epic_batch_size() -> usize {
    50
}

fn closed_jql(template: &str, months: u32) -> String {
    template.replace(WEEKS_PLACEHOLDER, &months.saturating_mul(4).to_string())
}

#[derive(Debug)]
pub struct QueryRunner<E> {
    endpoint: E,
    queries: HierarchyQueries,
    metrics: Arc<Metrics>,
}

impl<E: JiraEndpoint> QueryRunner<E> {
    pub fn new(endpoint: E, queries: HierarchyQueries, metrics: Arc<Metrics>) -> Self {
        Self {
            endpoint,
            queries,
            metrics,
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn queries(&self) -> &HierarchyQueries {
        &self.queries
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    // Stops only once a page is flagged last and carries no continuation token.
    pub fn for_each_issue<F>(
        &self,
        jql: &str,
        fields: &[FieldMapping],
        mut each: F,
    ) -> Result<(), JiraError>
    where
        F: FnMut(&Value) -> Result<(), JiraError>,
    {
        let field_names = requested_field_names(fields);
        let mut next_page_token: Option<String> = None;
        let mut page_number = 0usize;

        loop {
            self.metrics.inc_search_request();
            let page = self
                .endpoint
                .search_jql(jql, &field_names, next_page_token.as_deref())?;
            page_number += 1;
            self.metrics.add_issues_seen(page.issues.len());
            debug!(
                jql,
                page_number,
                page_count = page.issues.len(),
                is_last = page.is_last,
                "search page received"
            );

            for issue in &page.issues {
                each(issue)?;
            }

            if page.is_last && page.next_page_token.is_none() {
                return Ok(());
            }
            if page.next_page_token.is_none() {
                return Err(JiraError::Malformed(format!(
                    "page {page_number} of '{jql}' is not last but has no continuation token"
                )));
            }
            next_page_token = page.next_page_token;
        }
    }

    pub fn search(&self, jql: &str, fields: &[FieldMapping]) -> Result<Vec<Record>, JiraError> {
        let index = FieldAliasIndex::build(fields);
        let mut records = Vec::new();
        self.for_each_issue(jql, fields, |issue| {
            records.push(map_issue(issue, &index)?);
            Ok(())
        })?;
        Ok(records)
    }

    pub fn initiatives(&self, months_of_closed: u32) -> Result<Vec<Initiative>, JiraError> {
        let mut initiatives = Vec::new();
        let mut collect = |jql: &str| {
            self.for_each_issue(jql, &INITIATIVE_FIELDS, |issue| {
                initiatives.push(initiative_from_json(issue, LinkDirection::Outward, |_| true)?);
                Ok(())
            })
        };

        collect(&self.queries.initiatives_jql)?;
        if months_of_closed > 0 {
            collect(&closed_jql(
                &self.queries.closed_initiatives_jql,
                months_of_closed,
            ))?;
        }

        Ok(dedupe_by_key(initiatives))
    }

    pub fn plans(&self, months_of_closed: u32) -> Result<Vec<Plan>, JiraError> {
        let mut plans = Vec::new();
        let mut collect = |jql: &str| {
            self.for_each_issue(jql, &PLAN_FIELDS, |issue| {
                plans.push(plan_from_json(issue)?);
                Ok(())
            })
        };

        collect(&self.queries.plans_jql)?;
        if months_of_closed > 0 {
            collect(&closed_jql(&self.queries.closed_plans_jql, months_of_closed))?;
        }

        Ok(dedupe_by_key(plans))
    }

    pub fn epic_children(&self, epic_keys: &[String]) -> Result<Vec<TicketWithParent>, JiraError> {
        if epic_keys.is_empty() {
            return Ok(Vec::new());
        }

        let jql = format!("parent IN ({}) ORDER BY key", epic_keys.join(","));
        let mut children = Vec::new();
        self.for_each_issue(&jql, &EPIC_CHILD_FIELDS, |issue| {
            children.push(ticket_from_json(issue)?);
            Ok(())
        })?;
        Ok(children)
    }

    pub fn current_sprint(&self, board_id: u64) -> Result<Option<AgileSprint>, JiraError> {
        self.metrics.inc_agile_request();
        let Some(json) = self
            .endpoint
            .board_sprints(board_id, Some("active"), None, None)?
        else {
            return Ok(None);
        };

        let first = json
            .get("values")
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .ok_or_else(|| {
                JiraError::NoData(format!("no active sprint values returned for board {board_id}"))
            })?;
        sprint_from_json(first).map(Some)
    }

    pub fn sprint_by_id(&self, sprint_id: u64) -> Result<Option<AgileSprint>, JiraError> {
        self.metrics.inc_agile_request();
        match self.endpoint.sprint(sprint_id)? {
            Some(json) => sprint_from_json(&json).map(Some),
            None => Ok(None),
        }
    }

    pub fn all_sprints(&self, board_id: u64) -> Result<Vec<AgileSprint>, JiraError> {
        let mut values: Vec<Value> = Vec::new();
        let mut start_at = 0usize;

        loop {
            self.metrics.inc_agile_request();
            let Some(json) = self.endpoint.board_sprints(
                board_id,
                None,
                Some(start_at),
                Some(SPRINT_PAGE_SIZE),
            )?
            else {
                break;
            };
            let Some(page) = json.get("values").and_then(Value::as_array) else {
                break;
            };

            values.extend(page.iter().filter(|value| !value.is_null()).cloned());

            let is_last = json.get("isLast").and_then(Value::as_bool).unwrap_or(false);
            if is_last || page.len() < SPRINT_PAGE_SIZE {
                break;
            }
            start_at += SPRINT_PAGE_SIZE;
        }

        let mut sprints = values
            .iter()
            .map(sprint_from_json)
            .collect::<Result<Vec<_>, _>>()?;
        sprints.sort_by(|a, b| sort_start(b).cmp(&sort_start(a)));
        info!(board_id, count = sprints.len(), "retrieved sprints");
        Ok(sprints)
    }

    pub fn sprint_by_name(&self, board_id: u64, name: &str) -> Result<AgileSprint, JiraError> {
        self.all_sprints(board_id)?
            .into_iter()
            .find(|sprint| sprint.name == name)
            .ok_or_else(|| JiraError::NotFound(format!("sprint '{name}' on board {board_id}")))
    }
}

fn sort_start(sprint: &AgileSprint) -> DateTime<Utc> {
    sprint.start_date.unwrap_or(DateTime::<Utc>::MAX_UTC)
}
