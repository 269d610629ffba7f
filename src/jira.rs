use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum JiraError {
    #[error("jira request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("jira returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode jira response: {source}; body: {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
    #[error("invalid JIRA_BASE_URL '{0}'")]
    InvalidBaseUrl(String),
    #[error("malformed jira response: {0}")]
    Malformed(String),
    #[error("not supported, no data: {0}")]
    NoData(String),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub issues: Vec<Value>,
    #[serde(default)]
    pub is_last: bool,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JiraIdentity {
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

pub trait JiraEndpoint {
    fn search_jql(
        &self,
        jql: &str,
        fields: &[String],
        next_page_token: Option<&str>,
    ) -> Result<SearchPage, JiraError>;

    fn board_sprints(
        &self,
        board_id: u64,
        state: Option<&str>,
        start_at: Option<usize>,
        max_results: Option<usize>,
    ) -> Result<Option<Value>, JiraError>;

    fn sprint(&self, sprint_id: u64) -> Result<Option<Value>, JiraError>;
}

impl<E: JiraEndpoint + ?Sized> JiraEndpoint for &E {
    fn search_jql(
        &self,
        jql: &str,
        fields: &[String],
        next_page_token: Option<&str>,
    ) -> Result<SearchPage, JiraError> {
        (**self).search_jql(jql, fields, next_page_token)
    }

    fn board_sprints(
        &self,
        board_id: u64,
        state: Option<&str>,
        start_at: Option<usize>,
        max_results: Option<usize>,
    ) -> Result<Option<Value>, JiraError> {
        (**self).board_sprints(board_id, state, start_at, max_results)
    }

    fn sprint(&self, sprint_id: u64) -> Result<Option<Value>, JiraError> {
        (**self).sprint(sprint_id)
    }
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub http: Client,
    page_size: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    expand: &'a str,
    fields: &'a [String],
    jql: &'a str,
    max_results: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_page_token: Option<&'a str>,
}

impl JiraClient {
    pub fn new(base_url: String, email: String, api_token: String) -> Result<Self, JiraError> {
        let http = Client::builder().build()?;
        let normalized_base_url = normalize_base_url(&base_url)?;
        Ok(Self {
            base_url: normalized_base_url,
            email,
            api_token,
            http,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.email, Some(&self.api_token))
    }

    fn execute(&self, request: RequestBuilder) -> Result<String, JiraError> {
        let response = self.authed(request).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(%status, "jira request failed");
            return Err(JiraError::Http { status, body });
        }
        Ok(response.text()?)
    }

    pub fn get_myself(&self) -> Result<JiraIdentity, JiraError> {
        let url = format!("{}/rest/api/3/myself", self.base_url);
        let body = self.execute(self.http.get(&url))?;
        let payload: MyselfResponse = decode(&body)?;

        Ok(JiraIdentity {
            account_id: payload.account_id,
            display_name: payload.display_name,
            email_address: payload.email_address,
        })
    }
}

impl JiraEndpoint for JiraClient {
    fn search_jql(
        &self,
        jql: &str,
        fields: &[String],
        next_page_token: Option<&str>,
    ) -> Result<SearchPage, JiraError> {
        let url = format!("{}/rest/api/3/search/jql", self.base_url);
        let request = SearchRequest {
            expand: "names",
            fields,
            jql,
            max_results: self.page_size,
            next_page_token,
        };

        let body = self.execute(self.http.post(&url).json(&request))?;
        let page: SearchPage = decode(&body)?;
        debug!(
            jql,
            page_count = page.issues.len(),
            is_last = page.is_last,
            next_page_token_present = page.next_page_token.is_some(),
            "jira search page"
        );
        Ok(page)
    }

    fn board_sprints(
        &self,
        board_id: u64,
        state: Option<&str>,
        start_at: Option<usize>,
        max_results: Option<usize>,
    ) -> Result<Option<Value>, JiraError> {
        let url = format!("{}/rest/agile/1.0/board/{}/sprint", self.base_url, board_id);
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(state) = state {
            query.push(("state", state.to_string()));
        }
        if let Some(start_at) = start_at {
            query.push(("startAt", start_at.to_string()));
        }
        if let Some(max_results) = max_results {
            query.push(("maxResults", max_results.to_string()));
        }

        let body = self.execute(self.http.get(&url).query(&query))?;
        decode_optional(&body)
    }

    fn sprint(&self, sprint_id: u64) -> Result<Option<Value>, JiraError> {
        let url = format!("{}/rest/agile/1.0/sprint/{}", self.base_url, sprint_id);
        let body = self.execute(self.http.get(&url))?;
        decode_optional(&body)
    }
}

fn short_body(body: &str) -> String {
    if body.len() > 1000 {
        let mut end = 1000;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, JiraError> {
    serde_json::from_str(body).map_err(|source| {
        let body = short_body(body);
        warn!(body = %body, "failed decoding jira response");
        JiraError::Decode { source, body }
    })
}

fn decode_optional(body: &str) -> Result<Option<Value>, JiraError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    decode(body).map(Some)
}

fn normalize_base_url(raw: &str) -> Result<String, JiraError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(JiraError::InvalidBaseUrl(raw.to_string()));
    }

    let candidate = if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed =
        reqwest::Url::parse(&candidate).map_err(|_| JiraError::InvalidBaseUrl(raw.to_string()))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyselfResponse {
    account_id: Option<String>,
    display_name: Option<String>,
    email_address: Option<String>,
}
