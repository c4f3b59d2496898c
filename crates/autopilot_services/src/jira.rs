//! Jira Cloud REST client.
//!
//! Implements [`TicketSource`] over the v3 issue API and reads sprints from
//! the agile API. Comments and descriptions arrive in Atlassian Document
//! Format and are flattened to plain text on the way in.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use autopilot_agents::{AgentError, AgentResult, FieldUpdate, TicketQuery, TicketSource};
use autopilot_core::{Comment, SprintInfo, Ticket, TicketStatus};

use crate::error::{ServiceError, ServiceResult};

const SEARCH_FIELDS: [&str; 5] = ["summary", "status", "created", "description", "assignee"];
const MAX_RESULTS: u32 = 100;
const MAX_PAGES: u32 = 50;

/// Connection settings for a Jira Cloud site.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    /// Site root, e.g. `https://acme.atlassian.net`.
    pub domain: String,
    pub email: String,
    pub api_token: String,
}

impl JiraConfig {
    pub fn new(domain: impl Into<String>, email: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            domain: domain.into().trim_end_matches('/').to_string(),
            email: email.into(),
            api_token: api_token.into(),
        }
    }
}

/// JQL for each ticket selection.
pub fn jql(query: TicketQuery) -> String {
    match query {
        TicketQuery::Untriaged => r#"status = "To Do" AND assignee IS EMPTY"#.to_string(),
        TicketQuery::AssignedOpen => r#"assignee = currentUser() AND status != "Done""#.to_string(),
        TicketQuery::InReview => r#"status = "In Review""#.to_string(),
        TicketQuery::Sprint(id) => format!("sprint = {}", id),
    }
}

/// Jira REST client.
pub struct JiraClient {
    config: JiraConfig,
    client: reqwest::Client,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.domain, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .basic_auth(&self.config.email, Some(&self.config.api_token))
            .header("Accept", "application/json")
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ServiceResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Run a JQL search, following page tokens until the last page.
    #[instrument(skip(self))]
    pub async fn search_jql(&self, jql: &str) -> ServiceResult<Vec<Ticket>> {
        let mut tickets = Vec::new();
        let mut page_token: Option<String> = None;

        for page_number in 1..=MAX_PAGES {
            let body = search_body(jql, page_token.as_deref());
            let response = self
                .send(self.request(reqwest::Method::POST, "/rest/api/3/search/jql").json(&body))
                .await?;
            let page: SearchResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::decode(format!("search response: {}", e)))?;

            debug!(page = page_number, count = page.issues.len(), "Search page returned");
            tickets.extend(page.issues.into_iter().map(RawIssue::into_ticket));

            match page.next_page_token {
                Some(token) if !page.is_last => page_token = Some(token),
                _ => return Ok(tickets),
            }
        }

        warn!(jql, pages = MAX_PAGES, count = tickets.len(), "Search truncated at page limit");
        Ok(tickets)
    }

    /// First active sprint of a board, if any.
    pub async fn active_sprint(&self, board_id: u64) -> ServiceResult<Option<SprintInfo>> {
        let path = format!("/rest/agile/1.0/board/{}/sprint", board_id);
        let response = self
            .send(
                self.request(reqwest::Method::GET, &path)
                    .query(&[("state", "active")]),
            )
            .await?;
        let page: SprintPage = response
            .json()
            .await
            .map_err(|e| ServiceError::decode(format!("sprint response: {}", e)))?;

        let sprint = page.values.into_iter().next().map(RawSprint::into_sprint);
        match &sprint {
            Some(s) => info!(board_id, sprint_id = s.id, sprint = %s.name, "Active sprint found"),
            None => info!(board_id, "No active sprint"),
        }
        Ok(sprint)
    }

    async fn comments(&self, key: &str) -> ServiceResult<Vec<Comment>> {
        let path = format!("/rest/api/3/issue/{}/comment", key);
        let response = self.send(self.request(reqwest::Method::GET, &path)).await?;
        let page: CommentPage = response
            .json()
            .await
            .map_err(|e| ServiceError::decode(format!("comment response: {}", e)))?;
        Ok(page.comments.into_iter().map(RawComment::into_comment).collect())
    }

    async fn put_fields(&self, key: &str, update: &FieldUpdate) -> ServiceResult<()> {
        let body = fields_payload(update);
        let path = format!("/rest/api/3/issue/{}", key);
        self.send(self.request(reqwest::Method::PUT, &path).json(&body)).await?;
        Ok(())
    }

    async fn put_assignee(&self, key: &str, account_id: &str) -> ServiceResult<()> {
        let path = format!("/rest/api/3/issue/{}/assignee", key);
        self.send(
            self.request(reqwest::Method::PUT, &path)
                .json(&json!({ "accountId": account_id })),
        )
        .await?;
        Ok(())
    }

    async fn post_comment(&self, key: &str, text: &str) -> ServiceResult<()> {
        let path = format!("/rest/api/3/issue/{}/comment", key);
        self.send(
            self.request(reqwest::Method::POST, &path)
                .json(&json!({ "body": text_to_adf(text) })),
        )
        .await?;
        Ok(())
    }
}

fn tracker_error(e: ServiceError) -> AgentError {
    AgentError::tracker(e.to_string())
}

#[async_trait]
impl TicketSource for JiraClient {
    async fn search(&self, query: TicketQuery) -> AgentResult<Vec<Ticket>> {
        self.search_jql(&jql(query)).await.map_err(tracker_error)
    }

    async fn fetch_comments(&self, ticket_key: &str) -> AgentResult<Vec<Comment>> {
        self.comments(ticket_key).await.map_err(tracker_error)
    }

    async fn update_fields(&self, ticket_key: &str, update: &FieldUpdate) -> AgentResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.put_fields(ticket_key, update).await.map_err(tracker_error)
    }

    async fn assign(&self, ticket_key: &str, developer_id: &str) -> AgentResult<()> {
        self.put_assignee(ticket_key, developer_id)
            .await
            .map_err(tracker_error)
    }

    async fn add_comment(&self, ticket_key: &str, text: &str) -> AgentResult<()> {
        self.post_comment(ticket_key, text).await.map_err(tracker_error)
    }
}

/// Body of one search page request.
pub fn search_body(jql: &str, page_token: Option<&str>) -> Value {
    let mut body = json!({
        "jql": jql,
        "fields": SEARCH_FIELDS,
        "maxResults": MAX_RESULTS,
    });
    if let Some(token) = page_token {
        body["nextPageToken"] = json!(token);
    }
    body
}

/// Body of an issue edit request.
pub fn fields_payload(update: &FieldUpdate) -> Value {
    let mut fields = serde_json::Map::new();
    if let Some(priority) = update.priority {
        fields.insert("priority".into(), json!({ "name": priority.as_str() }));
    }
    if let Some(labels) = &update.labels {
        fields.insert("labels".into(), json!(labels));
    }
    json!({ "fields": fields })
}

/// Plain text as a minimal ADF document, one paragraph per line.
pub fn text_to_adf(text: &str) -> Value {
    let paragraphs: Vec<Value> = text
        .lines()
        .map(|line| {
            if line.is_empty() {
                json!({ "type": "paragraph", "content": [] })
            } else {
                json!({
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": line }],
                })
            }
        })
        .collect();

    json!({ "type": "doc", "version": 1, "content": paragraphs })
}

/// Flatten an ADF node (or a plain string) to text.
///
/// Text nodes inside one block are joined with spaces; blocks are
/// separated by newlines.
pub fn adf_to_text(node: &Value) -> String {
    match node {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        _ => {
            let mut blocks = Vec::new();
            collect_blocks(node, &mut blocks);
            blocks
                .into_iter()
                .filter(|b| !b.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

fn collect_blocks(node: &Value, blocks: &mut Vec<String>) {
    let Some(children) = node.get("content").and_then(Value::as_array) else {
        return;
    };

    let inline: Vec<&str> = children
        .iter()
        .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|c| c.get("text").and_then(Value::as_str))
        .collect();
    if !inline.is_empty() {
        blocks.push(inline.join(" ").trim().to_string());
    }

    for child in children {
        if child.get("type").and_then(Value::as_str) != Some("text") {
            collect_blocks(child, blocks);
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<RawIssue>,
    next_page_token: Option<String>,
    /// Missing on older responses; a missing token ends the search anyway.
    #[serde(default)]
    is_last: bool,
}

#[derive(Deserialize)]
struct RawIssue {
    key: String,
    fields: RawFields,
}

#[derive(Deserialize)]
struct RawFields {
    #[serde(default)]
    summary: String,
    status: Option<RawNamed>,
    created: Option<String>,
    #[serde(default)]
    description: Value,
    assignee: Option<RawUser>,
}

#[derive(Deserialize)]
struct RawNamed {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    display_name: Option<String>,
    account_id: Option<String>,
}

impl RawUser {
    fn label(self) -> Option<String> {
        self.display_name.or(self.account_id)
    }
}

impl RawIssue {
    fn into_ticket(self) -> Ticket {
        let status = self
            .fields
            .status
            .map(|s| TicketStatus::from_name(&s.name))
            .unwrap_or_else(|| TicketStatus::Other("Unknown".to_string()));

        Ticket {
            key: self.key,
            summary: self.fields.summary,
            status,
            created: self.fields.created,
            description: adf_to_text(&self.fields.description),
            assignee: self.fields.assignee.and_then(RawUser::label),
        }
    }
}

#[derive(Deserialize)]
struct CommentPage {
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Deserialize)]
struct RawComment {
    author: Option<RawUser>,
    #[serde(default)]
    body: Value,
    created: Option<String>,
}

impl RawComment {
    fn into_comment(self) -> Comment {
        Comment {
            author: self.author.and_then(RawUser::label),
            body: adf_to_text(&self.body),
            created: self.created,
        }
    }
}

#[derive(Deserialize)]
struct SprintPage {
    #[serde(default)]
    values: Vec<RawSprint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSprint {
    id: i64,
    name: String,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl RawSprint {
    fn into_sprint(self) -> SprintInfo {
        SprintInfo {
            id: self.id,
            name: self.name,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}
