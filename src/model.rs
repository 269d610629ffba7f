use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::fields::EPIC_TYPE;

pub trait KeyedIssue {
    fn key(&self) -> &str;
    fn issue_type(&self) -> &str;

    fn is_epic(&self) -> bool {
        self.issue_type() == EPIC_TYPE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub issue_type: String,
}

impl Ticket {
    pub fn project(&self) -> &str {
        self.key
            .split_once('-')
            .map(|(project, _)| project)
            .unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketWithParent {
    pub ticket: Ticket,
    pub parent_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub issue_type: String,
    pub required_for_go_live: bool,
    pub customers: Vec<String>,
    pub children: Vec<ChildIssue>,
    pub expanded: bool,
}

impl Plan {
    pub fn with_children(self, children: Vec<ChildIssue>) -> Self {
        Self { children, ..self }
    }

    pub fn epics(&self) -> impl Iterator<Item = &ChildIssue> {
        self.children.iter().filter(|child| child.is_epic())
    }

    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.children.iter().filter_map(ChildIssue::as_ticket)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Initiative {
    pub key: String,
    pub summary: String,
    pub status: String,
    pub required_for_go_live: bool,
    pub customers: Vec<String>,
    pub children: Vec<ChildIssue>,
}

impl Initiative {
    pub fn with_children(self, children: Vec<ChildIssue>) -> Self {
        Self { children, ..self }
    }

    pub fn plans(&self) -> impl Iterator<Item = &Plan> {
        self.children.iter().filter_map(ChildIssue::as_plan)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChildIssue {
    Ticket(Ticket),
    WithParent(TicketWithParent),
    Plan(Arc<Plan>),
}

impl ChildIssue {
    pub fn as_ticket(&self) -> Option<&Ticket> {
        match self {
            ChildIssue::Ticket(ticket) => Some(ticket),
            ChildIssue::WithParent(child) => Some(&child.ticket),
            ChildIssue::Plan(_) => None,
        }
    }

    pub fn as_plan(&self) -> Option<&Plan> {
        match self {
            ChildIssue::Plan(plan) => Some(plan.as_ref()),
            _ => None,
        }
    }

    pub fn parent_key(&self) -> Option<&str> {
        match self {
            ChildIssue::WithParent(child) => child.parent_key.as_deref(),
            _ => None,
        }
    }
}

impl KeyedIssue for Ticket {
    fn key(&self) -> &str {
        &self.key
    }

    fn issue_type(&self) -> &str {
        &self.issue_type
    }
}

impl KeyedIssue for TicketWithParent {
    fn key(&self) -> &str {
        &self.ticket.key
    }

    fn issue_type(&self) -> &str {
        &self.ticket.issue_type
    }
}

impl KeyedIssue for Plan {
    fn key(&self) -> &str {
        &self.key
    }

    fn issue_type(&self) -> &str {
        &self.issue_type
    }
}

impl KeyedIssue for Initiative {
    fn key(&self) -> &str {
        &self.key
    }

    fn issue_type(&self) -> &str {
        crate::fields::PRODUCT_INITIATIVE_TYPE
    }
}

impl KeyedIssue for ChildIssue {
    fn key(&self) -> &str {
        match self {
            ChildIssue::Ticket(ticket) => ticket.key(),
            ChildIssue::WithParent(child) => child.key(),
            ChildIssue::Plan(plan) => plan.key(),
        }
    }

    fn issue_type(&self) -> &str {
        match self {
            ChildIssue::Ticket(ticket) => ticket.issue_type(),
            ChildIssue::WithParent(child) => child.issue_type(),
            ChildIssue::Plan(plan) => plan.issue_type(),
        }
    }
}

pub fn dedupe_by_key<T: KeyedIssue>(items: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.key().to_string()))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgileSprint {
    pub id: i64,
    pub state: String,
    pub name: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub complete_date: Option<DateTime<Utc>>,
    pub board_id: i64,
    pub goal: String,
}
