use std::cell::RefCell;
use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::jira::{JiraEndpoint, JiraError, SearchPage};

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub jql: String,
    pub fields: Vec<String>,
    pub token: Option<String>,
}

#[derive(Debug, Default)]
pub struct FakeEndpoint {
    routes: Vec<(String, Vec<SearchPage>)>,
    failing: Vec<String>,
    board_pages: RefCell<VecDeque<Option<Value>>>,
    searches: RefCell<Vec<SearchCall>>,
    board_calls: RefCell<Vec<Option<usize>>>,
}

impl FakeEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, needle: &str, pages: Vec<SearchPage>) -> Self {
        self.routes.push((needle.to_string(), pages));
        self
    }

    pub fn failing(mut self, needle: &str) -> Self {
        self.failing.push(needle.to_string());
        self
    }

    pub fn board_page(self, page: Option<Value>) -> Self {
        self.board_pages.borrow_mut().push_back(page);
        self
    }

    pub fn searches(&self) -> Vec<SearchCall> {
        self.searches.borrow().clone()
    }

    pub fn searches_matching(&self, needle: &str) -> usize {
        self.searches
            .borrow()
            .iter()
            .filter(|call| call.jql.contains(needle))
            .count()
    }

    pub fn board_calls(&self) -> Vec<Option<usize>> {
        self.board_calls.borrow().clone()
    }
}

impl JiraEndpoint for FakeEndpoint {
    fn search_jql(
        &self,
        jql: &str,
        fields: &[String],
        next_page_token: Option<&str>,
    ) -> Result<SearchPage, JiraError> {
        self.searches.borrow_mut().push(SearchCall {
            jql: jql.to_string(),
            fields: fields.to_vec(),
            token: next_page_token.map(ToString::to_string),
        });

        if self.failing.iter().any(|needle| jql.contains(needle.as_str())) {
            return Err(JiraError::Malformed("scripted failure".into()));
        }

        let page_index = next_page_token
            .and_then(|token| token.strip_prefix('p'))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);

        let page = self
            .routes
            .iter()
            .find(|(needle, _)| jql.contains(needle.as_str()))
            .and_then(|(_, pages)| pages.get(page_index).cloned())
            .unwrap_or(SearchPage {
                issues: Vec::new(),
                is_last: true,
                next_page_token: None,
            });
        Ok(page)
    }

    fn board_sprints(
        &self,
        _board_id: u64,
        _state: Option<&str>,
        start_at: Option<usize>,
        _max_results: Option<usize>,
    ) -> Result<Option<Value>, JiraError> {
        self.board_calls.borrow_mut().push(start_at);
        Ok(self.board_pages.borrow_mut().pop_front().flatten())
    }

    fn sprint(&self, _sprint_id: u64) -> Result<Option<Value>, JiraError> {
        Ok(self.board_pages.borrow_mut().pop_front().flatten())
    }
}

pub fn paged(pages: Vec<Vec<Value>>) -> Vec<SearchPage> {
    let count = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(index, issues)| {
            let is_last = index + 1 == count;
            SearchPage {
                issues,
                is_last,
                next_page_token: (!is_last).then(|| format!("p{}", index + 1)),
            }
        })
        .collect()
}

pub fn issue(key: &str, issue_type: &str) -> Value {
    json!({
        "key": key,
        "fields": {
            "summary": format!("{key} summary"),
            "status": {"name": "Open"},
            "issuetype": {"name": issue_type}
        }
    })
}

pub fn link(direction: &str, key: &str, issue_type: &str) -> Value {
    json!({
        direction: {
            "key": key,
            "fields": {
                "summary": format!("{key} summary"),
                "status": {"name": "Open"},
                "issuetype": {"name": issue_type}
            }
        }
    })
}

pub fn linked_issue(key: &str, links: Vec<Value>) -> Value {
    json!({
        "key": key,
        "fields": {
            "summary": format!("{key} summary"),
            "status": {"name": "In Progress"},
            "issuelinks": links
        }
    })
}

pub fn epic_child(key: &str, parent: &str) -> Value {
    json!({
        "key": key,
        "fields": {
            "summary": format!("{key} summary"),
            "status": {"name": "Open"},
            "issuetype": {"name": "Story"},
            "parent": {"key": parent}
        }
    })
}
