use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::fields::{self, FieldAliasIndex, PRODUCT_INITIATIVE_TYPE, UNKNOWN};
use crate::jira::JiraError;
use crate::model::{
    AgileSprint, ChildIssue, Initiative, KeyedIssue, Plan, Ticket, TicketWithParent,
};
use crate::record::{FieldValue, Record};

pub const IGNORE_FIELDS: [&str; 7] = [
    "avatarId",
    "hierarchyLevel",
    "iconUrl",
    "id",
    "expand",
    "self",
    "subtask",
];

const FIELDS_ENVELOPE: &str = "fields";

fn is_ignored(name: &str) -> bool {
    IGNORE_FIELDS.contains(&name)
}

pub fn map_issue(node: &Value, index: &FieldAliasIndex) -> Result<Record, JiraError> {
    match node {
        Value::Object(object) => Ok(map_object(object, index)),
        other => Err(JiraError::Malformed(format!(
            "expected issue object, found {}",
            json_kind(other)
        ))),
    }
}

fn map_object(object: &Map<String, Value>, index: &FieldAliasIndex) -> Record {
    let mut record = Record::new();
    for (name, value) in object {
        if name == FIELDS_ENVELOPE {
            if let Value::Object(fields) = value {
                flatten_fields_into(&mut record, fields, index);
                continue;
            }
        }

        if is_ignored(name) {
            continue;
        }

        record.insert(index.output_name(name, None), map_value(value, None, index));
    }
    record
}

fn flatten_fields_into(record: &mut Record, fields: &Map<String, Value>, index: &FieldAliasIndex) {
    for (name, value) in fields {
        if is_ignored(name) {
            continue;
        }

        let children = index.flatten_children(name);
        if children.is_empty() {
            record.insert(index.output_name(name, None), map_value(value, None, index));
            continue;
        }

        match value {
            Value::Object(object) => {
                for child in children {
                    // An absent or null sub-key contributes nothing.
                    let Some(child_value) = object.get(child).filter(|v| !v.is_null()) else {
                        continue;
                    };
                    record.insert(
                        index.output_name(name, Some(child)),
                        map_value(child_value, None, index),
                    );
                }
            }
            _ => {
                for child in children {
                    record.insert(
                        index.output_name(name, Some(child)),
                        map_value(value, Some(child), index),
                    );
                }
            }
        }
    }
}

fn map_value(value: &Value, child: Option<&str>, index: &FieldAliasIndex) -> FieldValue {
    match value {
        Value::Object(object) => FieldValue::Record(map_object(object, index)),
        Value::Array(items) => FieldValue::Text(join_array(items, child, index)),
        Value::String(raw) => match parse_date_time(raw) {
            Some(parsed) => FieldValue::DateTime(parsed),
            None => FieldValue::Text(raw.clone()),
        },
        Value::Number(number) => map_number(number),
        Value::Bool(flag) => FieldValue::Bool(*flag),
        Value::Null => FieldValue::Null,
    }
}

fn join_array(items: &[Value], child: Option<&str>, index: &FieldAliasIndex) -> String {
    match child {
        None => items
            .iter()
            .map(|item| map_value(item, None, index).to_string())
            .collect::<Vec<_>>()
            .join(","),
        Some(child) => items
            .iter()
            .filter_map(|item| item.as_object())
            .filter_map(|object| object.get(child).filter(|v| !v.is_null()))
            .map(|value| map_value(value, None, index).to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

fn map_number(number: &Number) -> FieldValue {
    if let Some(value) = number.as_i64() {
        return FieldValue::Integer(value);
    }
    if number.is_f64() {
        if let Some(value) = number.as_f64() {
            return FieldValue::Float(value);
        }
    }
    FieldValue::Decimal(number.to_string())
}

pub fn parse_date_time(raw: &str) -> Option<DateTime<Local>> {
    let trimmed = raw.trim();
    if trimmed.len() < 10 || !trimmed.as_bytes()[0].is_ascii_digit() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Local));
    }
    // Jira's own format: 2026-02-20T00:00:00.000+0000
    if let Ok(parsed) = DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(parsed.with_timezone(&Local));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Local.from_local_datetime(&midnight).earliest();
    }
    None
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    Outward,
    Inward,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueLink {
    #[serde(default)]
    inward_issue: Option<LinkedIssue>,
    #[serde(default)]
    outward_issue: Option<LinkedIssue>,
}

#[derive(Debug, Deserialize)]
struct LinkedIssue {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    fields: Option<Map<String, Value>>,
}

fn issue_key(issue: &Value) -> Result<String, JiraError> {
    issue
        .get(fields::KEY.mapping.field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| JiraError::Malformed("issue is missing its key".into()))
}

fn issue_fields(issue: &Value) -> Option<&Map<String, Value>> {
    issue.get(FIELDS_ENVELOPE).and_then(Value::as_object)
}

fn nested_name(fields: &Map<String, Value>, field: &str, child: &str) -> Option<String> {
    fields
        .get(field)
        .and_then(|value| value.get(child))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn text_field(fields: &Map<String, Value>, field: &str) -> Option<String> {
    fields
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn status_of(fields: &Map<String, Value>) -> Option<String> {
    nested_name(fields, fields::STATUS.mapping.field, "name")
}

fn issue_type_of(fields: &Map<String, Value>) -> Option<String> {
    // Linked issues have been seen carrying their type under `type` rather than `issuetype`.
    nested_name(fields, fields::ISSUE_TYPE.mapping.field, "name")
        .or_else(|| nested_name(fields, "type", "name"))
}

fn required_flag(fields: &Map<String, Value>, key: &str) -> Result<bool, JiraError> {
    match fields.get(fields::REQUIRED_FOR_GO_LIVE.mapping.field) {
        None | Some(Value::Null) => Ok(false),
        Some(value) => value.as_f64().map(|v| v > 0.0).ok_or_else(|| {
            JiraError::Malformed(format!(
                "{key}: required-for-go-live field is not numeric: {value}"
            ))
        }),
    }
}

fn customers(fields: &Map<String, Value>) -> Vec<String> {
    fields
        .get(fields::CUSTOMERS.mapping.field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("value").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn linked_children(
    fields: &Map<String, Value>,
    direction: LinkDirection,
    keep_child: impl Fn(&str) -> bool,
) -> Result<Vec<ChildIssue>, JiraError> {
    let Some(raw_links) = fields
        .get(fields::ISSUE_LINKS.mapping.field)
        .filter(|value| value.is_array())
    else {
        return Ok(Vec::new());
    };

    let links: Vec<IssueLink> = serde_json::from_value(raw_links.clone())
        .map_err(|err| JiraError::Malformed(format!("unreadable issue links: {err}")))?;

    let mut children: Vec<ChildIssue> = Vec::new();
    for link in links {
        let linked = match direction {
            LinkDirection::Outward => link.outward_issue,
            LinkDirection::Inward => link.inward_issue,
        };
        let Some(LinkedIssue {
            key: Some(key),
            fields: Some(child_fields),
        }) = linked
        else {
            continue;
        };

        let issue_type = issue_type_of(&child_fields).unwrap_or_else(|| UNKNOWN.to_string());
        if !keep_child(&issue_type) {
            continue;
        }
        if children.iter().any(|existing| existing.key() == key) {
            continue;
        }

        children.push(ChildIssue::Ticket(Ticket {
            key,
            summary: text_field(&child_fields, fields::SUMMARY.mapping.field).unwrap_or_default(),
            status: status_of(&child_fields).unwrap_or_else(|| UNKNOWN.to_string()),
            issue_type,
        }));
    }
    Ok(children)
}

pub fn initiative_from_json(
    issue: &Value,
    direction: LinkDirection,
    keep_child: impl Fn(&str) -> bool,
) -> Result<Initiative, JiraError> {
    let key = issue_key(issue)?;
    let Some(fields) = issue_fields(issue) else {
        return Ok(Initiative {
            key,
            summary: String::new(),
            status: String::new(),
            required_for_go_live: false,
            customers: Vec::new(),
            children: Vec::new(),
        });
    };

    Ok(Initiative {
        summary: text_field(fields, fields::SUMMARY.mapping.field).unwrap_or_default(),
        status: status_of(fields).unwrap_or_default(),
        required_for_go_live: required_flag(fields, &key)?,
        customers: customers(fields),
        children: linked_children(fields, direction, keep_child)?,
        key,
    })
}

pub fn plan_from_json(issue: &Value) -> Result<Plan, JiraError> {
    let initiative = initiative_from_json(issue, LinkDirection::Inward, |issue_type| {
        issue_type != PRODUCT_INITIATIVE_TYPE
    })?;

    Ok(Plan {
        key: initiative.key,
        summary: initiative.summary,
        status: initiative.status,
        issue_type: fields::IDEA_TYPE.to_string(),
        required_for_go_live: initiative.required_for_go_live,
        customers: initiative.customers,
        children: initiative.children,
        expanded: false,
    })
}

pub fn ticket_from_json(issue: &Value) -> Result<TicketWithParent, JiraError> {
    let key = issue_key(issue)?;
    let fields = issue_fields(issue);

    let summary = fields
        .and_then(|f| text_field(f, fields::SUMMARY.mapping.field))
        .unwrap_or_default();
    let status = fields
        .and_then(status_of)
        .unwrap_or_else(|| UNKNOWN.to_string());
    let issue_type = fields
        .and_then(issue_type_of)
        .unwrap_or_else(|| UNKNOWN.to_string());
    let parent_key = fields.and_then(|f| {
        nested_name(
            f,
            fields::PARENT_KEY.mapping.field,
            fields::KEY.mapping.field,
        )
    });

    Ok(TicketWithParent {
        ticket: Ticket {
            key,
            summary,
            status,
            issue_type,
        },
        parent_key,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SprintPayload {
    id: i64,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    complete_date: Option<DateTime<Utc>>,
    #[serde(default)]
    origin_board_id: Option<i64>,
    #[serde(default)]
    goal: Option<String>,
}

pub fn sprint_from_json(value: &Value) -> Result<AgileSprint, JiraError> {
    if value.is_null() {
        return Err(JiraError::NoData(
            "no agile sprint values returned from api".into(),
        ));
    }

    let payload: SprintPayload = serde_json::from_value(value.clone())
        .map_err(|err| JiraError::Malformed(format!("unreadable sprint: {err}")))?;

    Ok(AgileSprint {
        id: payload.id,
        state: payload.state.unwrap_or_default(),
        name: payload.name.unwrap_or_default(),
        start_date: payload.start_date,
        end_date: payload.end_date,
        complete_date: payload.complete_date,
        board_id: payload.origin_board_id.unwrap_or(0),
        goal: payload.goal.unwrap_or_default(),
    })
}
