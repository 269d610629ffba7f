use std::collections::BTreeMap;

use chrono::{DateTime, Local};

use crate::mapper;
use crate::record::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub field: &'static str,
    pub flatten_field: Option<&'static str>,
    pub alias: Option<&'static str>,
}

impl FieldMapping {
    pub const fn new(field: &'static str) -> Self {
        Self {
            field,
            flatten_field: None,
            alias: None,
        }
    }

    pub const fn flatten(mut self, child: &'static str) -> Self {
        self.flatten_field = Some(child);
        self
    }

    pub const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn output_name(&self) -> &'static str {
        self.alias.unwrap_or(self.field)
    }
}

pub struct TypedField<T> {
    pub mapping: FieldMapping,
    parser: fn(&Record, &str) -> Option<T>,
}

impl<T> std::fmt::Debug for TypedField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedField")
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

impl<T> TypedField<T> {
    pub const fn new(mapping: FieldMapping, parser: fn(&Record, &str) -> Option<T>) -> Self {
        Self { mapping, parser }
    }

    pub fn parse(&self, record: &Record) -> Option<T> {
        (self.parser)(record, self.mapping.output_name())
    }
}

pub const PRODUCT_INITIATIVE_TYPE: &str = "Product Initiative";
pub const IDEA_TYPE: &str = "Idea";
pub const EPIC_TYPE: &str = "Epic";
pub const UNKNOWN: &str = "Unknown";

pub const KEY: TypedField<String> = TypedField::new(FieldMapping::new("key"), parse_text);
pub const SUMMARY: TypedField<String> = TypedField::new(FieldMapping::new("summary"), parse_text);
pub const STATUS: TypedField<String> =
    TypedField::new(FieldMapping::new("status").flatten("name"), parse_text);
pub const ISSUE_TYPE: TypedField<String> =
    TypedField::new(FieldMapping::new("issuetype").flatten("name"), parse_text);
pub const PARENT_KEY: TypedField<String> = TypedField::new(
    FieldMapping::new("parent").flatten("key").alias("parentKey"),
    parse_text,
);
pub const ISSUE_LINKS: TypedField<String> =
    TypedField::new(FieldMapping::new("issuelinks"), parse_text);
pub const REQUIRED_FOR_GO_LIVE: TypedField<bool> = TypedField::new(
    FieldMapping::new("customfield_11986").alias("requiredForGoLive"),
    parse_flag,
);
pub const CUSTOMERS: TypedField<Vec<String>> = TypedField::new(
    FieldMapping::new("customfield_11888")
        .flatten("value")
        .alias("customers"),
    parse_list,
);
pub const STORY_POINTS: TypedField<f64> = TypedField::new(
    FieldMapping::new("customfield_10004").alias("storyPoints"),
    parse_number,
);
pub const ORIGINAL_ESTIMATE: TypedField<f64> =
    TypedField::new(FieldMapping::new("timeoriginalestimate"), parse_number);
pub const CREATED: TypedField<DateTime<Local>> =
    TypedField::new(FieldMapping::new("created"), parse_date_time);
pub const UPDATED: TypedField<DateTime<Local>> =
    TypedField::new(FieldMapping::new("updated"), parse_date_time);
pub const RESOLVED: TypedField<DateTime<Local>> =
    TypedField::new(FieldMapping::new("resolutiondate"), parse_date_time);
pub const RESOLUTION: TypedField<String> =
    TypedField::new(FieldMapping::new("resolution").flatten("name"), parse_text);
pub const LABELS: TypedField<Vec<String>> =
    TypedField::new(FieldMapping::new("labels"), parse_list);
pub const REPORTER: TypedField<String> = TypedField::new(
    FieldMapping::new("reporter")
        .flatten("displayName")
        .alias("reporter"),
    parse_text,
);
pub const TEAM: TypedField<String> = TypedField::new(
    FieldMapping::new("customfield_10001").flatten("name").alias("team"),
    parse_text,
);
pub const SPRINT: TypedField<String> = TypedField::new(
    FieldMapping::new("customfield_10020").flatten("name").alias("sprint"),
    parse_text,
);
pub const SPRINT_START_DATE: TypedField<DateTime<Local>> = TypedField::new(
    FieldMapping::new("customfield_10020")
        .flatten("startDate")
        .alias("sprintStartDate"),
    parse_date_time,
);
pub const ESTIMATION_STATUS: TypedField<String> = TypedField::new(
    FieldMapping::new("customfield_12038")
        .flatten("value")
        .alias("estimationStatus"),
    parse_text,
);
pub const HIGH_LEVEL_ESTIMATE: TypedField<f64> = TypedField::new(
    FieldMapping::new("customfield_12137").alias("highLevelEstimate"),
    parse_number,
);
pub const PROJECT_TARGET: TypedField<DateTime<Local>> = TypedField::new(
    FieldMapping::new("customfield_11240").alias("projectTarget"),
    parse_date_time,
);

fn parse_text(record: &Record, name: &str) -> Option<String> {
    match record.get(name)? {
        FieldValue::Null => None,
        FieldValue::Text(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_number(record: &Record, name: &str) -> Option<f64> {
    match record.get(name)? {
        FieldValue::Text(value) => value.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn parse_flag(record: &Record, name: &str) -> Option<bool> {
    match record.get(name)? {
        FieldValue::Bool(value) => Some(*value),
        other => other.as_f64().map(|value| value > 0.0),
    }
}

fn parse_date_time(record: &Record, name: &str) -> Option<DateTime<Local>> {
    match record.get(name)? {
        // Array-shaped fields (sprints) arrive joined; the first parseable entry wins.
        FieldValue::Text(raw) => raw
            .split(',')
            .map(str::trim)
            .find_map(mapper::parse_date_time),
        other => other.as_date_time(),
    }
}

fn parse_list(record: &Record, name: &str) -> Option<Vec<String>> {
    let raw = record.get(name)?.as_str()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .collect(),
    )
}

#[derive(Debug, Clone, Default)]
pub struct FieldAliasIndex {
    by_field: BTreeMap<&'static str, Vec<FieldMapping>>,
}

impl FieldAliasIndex {
    pub fn build(fields: &[FieldMapping]) -> Self {
        let mut by_field: BTreeMap<&'static str, Vec<FieldMapping>> = BTreeMap::new();
        for mapping in fields {
            let group = by_field.entry(mapping.field).or_default();
            if !group.contains(mapping) {
                group.push(*mapping);
            }
        }
        Self { by_field }
    }

    pub fn output_name(&self, field: &str, child: Option<&str>) -> String {
        let Some(mappings) = self.by_field.get(field) else {
            return field.to_string();
        };

        let mapping = mappings
            .iter()
            .find(|mapping| mapping.flatten_field == child)
            .or_else(|| mappings.first());

        match mapping.and_then(|mapping| mapping.alias) {
            Some(alias) => alias.to_string(),
            None => field.to_string(),
        }
    }

    pub fn flatten_children(&self, field: &str) -> Vec<&'static str> {
        self.by_field
            .get(field)
            .map(|mappings| {
                mappings
                    .iter()
                    .filter_map(|mapping| mapping.flatten_field)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

pub fn requested_field_names(fields: &[FieldMapping]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(fields.len());
    for mapping in fields {
        if !names.iter().any(|name| name == mapping.field) {
            names.push(mapping.field.to_string());
        }
    }
    names
}
