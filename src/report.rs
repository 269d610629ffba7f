use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::fields::FieldMapping;
use crate::model::{Initiative, Plan};
use crate::record::{FieldValue, Record};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Date(DateTime<Local>),
    Empty,
}

pub type Row = Vec<CellValue>;

impl From<&FieldValue> for CellValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => CellValue::Empty,
            FieldValue::Bool(value) => CellValue::Bool(*value),
            FieldValue::Integer(value) => CellValue::Integer(*value),
            FieldValue::Float(value) => CellValue::Number(*value),
            FieldValue::Decimal(_) => value
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(value.to_string())),
            FieldValue::Text(value) => CellValue::Text(value.clone()),
            FieldValue::DateTime(value) => CellValue::Date(*value),
            FieldValue::Record(_) => CellValue::Text(value.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        i64::try_from(value)
            .map(CellValue::Integer)
            .unwrap_or(CellValue::Number(value as f64))
    }
}

fn trim_base_url(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

pub fn hyperlink_ticket(base_url: &str, key: &str) -> String {
    format!(
        "=HYPERLINK(\"{}/browse/{key}\", \"{key}\")",
        trim_base_url(base_url)
    )
}

pub fn hyperlink_idea(base_url: &str, view_id: &str, key: &str) -> String {
    format!(
        "=HYPERLINK(\"{}/jira/polaris/projects/PMPLAN/ideas/view/{view_id}?selectedIssue={key}&issueViewSection=deliver\", \"{key}\")",
        trim_base_url(base_url)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub base_url: String,
    pub idea_view_id: String,
}

impl LinkTarget {
    pub fn ticket(&self, key: &str) -> CellValue {
        hyperlink_ticket(&self.base_url, key).into()
    }

    pub fn idea(&self, key: &str) -> CellValue {
        hyperlink_idea(&self.base_url, &self.idea_view_id, key).into()
    }
}

pub fn record_row(record: &Record, columns: &[FieldMapping]) -> Row {
    columns
        .iter()
        .map(|column| {
            record
                .get(column.output_name())
                .map(CellValue::from)
                .unwrap_or(CellValue::Empty)
        })
        .collect()
}

fn plan_summary_row(plan: &Plan, links: &LinkTarget) -> Row {
    vec![
        plan.summary.as_str().into(),
        links.idea(&plan.key),
        plan.status.as_str().into(),
        plan.required_for_go_live.into(),
        plan.customers.join(", ").into(),
        plan.tickets().count().into(),
    ]
}

pub fn initiative_summary_rows(initiatives: &[Initiative], links: &LinkTarget) -> Vec<Row> {
    let mut rows = Vec::new();
    for initiative in initiatives {
        rows.push(vec![
            initiative.summary.as_str().into(),
            links.idea(&initiative.key),
            initiative.status.as_str().into(),
            initiative.required_for_go_live.into(),
            initiative.customers.join(", ").into(),
            initiative.plans().count().into(),
        ]);
        rows.extend(initiative.plans().map(|plan| plan_summary_row(plan, links)));
        rows.push(Vec::new());
    }
    rows
}

pub fn plan_ticket_rows(plans: &[Arc<Plan>], links: &LinkTarget) -> Vec<Row> {
    plans
        .iter()
        .flat_map(|plan| {
            plan.tickets().map(move |ticket| {
                vec![
                    links.idea(&plan.key),
                    links.ticket(&ticket.key),
                    ticket.summary.as_str().into(),
                    ticket.issue_type.as_str().into(),
                    ticket.status.as_str().into(),
                    ticket.project().into(),
                ]
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{KEY, STATUS, STORY_POINTS};
    use crate::model::{ChildIssue, Ticket};

    fn links() -> LinkTarget {
        LinkTarget {
            base_url: "https://example.atlassian.net/".into(),
            idea_view_id: "42".into(),
        }
    }

    fn plan(key: &str, tickets: &[&str]) -> Plan {
        Plan {
            key: key.into(),
            summary: format!("{key} summary"),
            status: "Open".into(),
            issue_type: "Idea".into(),
            required_for_go_live: true,
            customers: vec!["Acme".into(), "Globex".into()],
            children: tickets
                .iter()
                .map(|key| {
                    ChildIssue::Ticket(Ticket {
                        key: key.to_string(),
                        summary: "t".into(),
                        status: "Done".into(),
                        issue_type: "Story".into(),
                    })
                })
                .collect(),
            expanded: true,
        }
    }

    #[test]
    fn hyperlink_formulas() {
        assert_eq!(
            hyperlink_ticket("https://example.atlassian.net/", "PROJ-1"),
            "=HYPERLINK(\"https://example.atlassian.net/browse/PROJ-1\", \"PROJ-1\")"
        );
        assert_eq!(
            hyperlink_idea("https://example.atlassian.net", "42", "PMPLAN-7"),
            "=HYPERLINK(\"https://example.atlassian.net/jira/polaris/projects/PMPLAN/ideas/view/42?selectedIssue=PMPLAN-7&issueViewSection=deliver\", \"PMPLAN-7\")"
        );
    }

    #[test]
    fn record_row_follows_column_order_and_types() {
        let record: Record = [
            ("key", FieldValue::Text("PROJ-1".into())),
            ("storyPoints", FieldValue::Float(2.5)),
            ("status", FieldValue::Text("Open".into())),
        ]
        .into_iter()
        .collect();

        let row = record_row(&record, &[STORY_POINTS.mapping, KEY.mapping, STATUS.mapping]);

        assert_eq!(
            row,
            vec![
                CellValue::Number(2.5),
                CellValue::Text("PROJ-1".into()),
                CellValue::Text("Open".into()),
            ]
        );
    }

    #[test]
    fn missing_and_null_fields_become_empty_cells() {
        let record: Record = [("key", FieldValue::Null)].into_iter().collect();
        let row = record_row(&record, &[KEY.mapping, STATUS.mapping]);
        assert_eq!(row, vec![CellValue::Empty, CellValue::Empty]);
    }

    #[test]
    fn nested_records_are_flattened_to_text() {
        let inner: Record = [("name", FieldValue::Text("High".into()))].into_iter().collect();
        assert_eq!(
            CellValue::from(&FieldValue::Record(inner)),
            CellValue::Text("{\"name\":\"High\"}".into())
        );
        assert_eq!(
            CellValue::from(&FieldValue::Decimal("1.5".into())),
            CellValue::Number(1.5)
        );
    }

    #[test]
    fn summary_rows_nest_plans_under_initiatives() {
        let initiative = Initiative {
            key: "PMPLAN-1".into(),
            summary: "Initiative".into(),
            status: "In Progress".into(),
            required_for_go_live: false,
            customers: Vec::new(),
            children: vec![ChildIssue::Plan(Arc::new(plan("PMPLAN-2", &["PROJ-1", "PROJ-2"])))],
        };

        let rows = initiative_summary_rows(&[initiative], &links());

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], CellValue::Text("Initiative".into()));
        assert_eq!(rows[0][5], CellValue::Integer(1));
        assert_eq!(rows[1][4], CellValue::Text("Acme, Globex".into()));
        assert_eq!(rows[1][5], CellValue::Integer(2));
        assert!(rows[2].is_empty());
    }

    #[test]
    fn ticket_rows_carry_plan_and_project() {
        let plans = [
            Arc::new(plan("PMPLAN-2", &["PROJ-1"])),
            Arc::new(plan("PMPLAN-3", &[])),
        ];
        let rows = plan_ticket_rows(&plans, &links());

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0][1],
            CellValue::Text(hyperlink_ticket("https://example.atlassian.net", "PROJ-1"))
        );
        assert_eq!(rows[0][5], CellValue::Text("PROJ".into()));
    }
}
