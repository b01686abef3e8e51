use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{decode_secure_value, Section, SERVER_URL_KEY, USER_TOKEN_KEY};
use crate::error::JiazError;
use crate::rate_limiter::RateLimiter;

/// Tracker-specific identifiers of the custom fields jiaz reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFieldIds {
    pub original_story_points: String,
    pub story_points: String,
    pub work_type: String,
    pub sprints: String,
    pub epic_link: String,
    pub epic_progress: String,
    pub epic_start_date: String,
    pub epic_end_date: String,
    pub parent_link: String,
    pub status_summary: String,
}

impl Default for CustomFieldIds {
    fn default() -> Self {
        Self {
            original_story_points: "customfield_12314040".to_string(),
            story_points: "customfield_12310243".to_string(),
            work_type: "customfield_12320040".to_string(),
            sprints: "customfield_12310940".to_string(),
            epic_link: "customfield_12311140".to_string(),
            epic_progress: "customfield_12317141".to_string(),
            epic_start_date: "customfield_12313941".to_string(),
            epic_end_date: "customfield_12313942".to_string(),
            parent_link: "customfield_12313140".to_string(),
            status_summary: "customfield_12320841".to_string(),
        }
    }
}

impl CustomFieldIds {
    /// Defaults, overridden by `<name>_field` keys of a config block.
    pub fn from_section(section: &Section) -> Self {
        let mut ids = Self::default();
        let slots: [(&str, &mut String); 10] = [
            ("original_story_points", &mut ids.original_story_points),
            ("story_points", &mut ids.story_points),
            ("work_type", &mut ids.work_type),
            ("sprints", &mut ids.sprints),
            ("epic_link", &mut ids.epic_link),
            ("epic_progress", &mut ids.epic_progress),
            ("epic_start_date", &mut ids.epic_start_date),
            ("epic_end_date", &mut ids.epic_end_date),
            ("parent_link", &mut ids.parent_link),
            ("status_summary", &mut ids.status_summary),
        ];
        for (name, slot) in slots {
            if let Some(id) = section.get(&format!("{}_field", name)) {
                *slot = id.trim().to_string();
            }
        }
        ids
    }
}

/// Operations jiaz needs from the issue tracker.
#[async_trait]
pub trait Tracker: Send + Sync {
    fn server_url(&self) -> &str;
    fn custom_fields(&self) -> &CustomFieldIds;

    /// `None` when the tracker answers 404.
    async fn get_issue(&self, key: &str) -> Result<Option<Value>>;
    async fn search_issues(&self, jql: &str, max_results: u32) -> Result<Vec<Value>>;
    /// The created comment.
    async fn add_comment(&self, key: &str, body: &str) -> Result<Value>;
    async fn pin_comment(&self, key: &str, comment_id: &str) -> Result<()>;
    async fn pinned_comments(&self, key: &str) -> Result<Vec<Value>>;
    async fn update_fields(&self, key: &str, fields: Value) -> Result<()>;
    async fn active_sprints(&self, board_id: &str) -> Result<Vec<Value>>;

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.server_url().trim_end_matches('/'), key)
    }
}

/// Connection settings for a Jira server using a personal access token.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub server_url: String,
    pub token: String,
    pub timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub custom_fields: CustomFieldIds,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            token: String::new(),
            timeout_seconds: 30,
            probe_timeout_seconds: 5,
            max_retries: 2,
            retry_delay_ms: 1000,
            custom_fields: CustomFieldIds::default(),
        }
    }
}

impl JiraConfig {
    /// Settings from a config block; the stored token is decoded.
    pub fn from_section(section: &Section) -> Result<Self, JiazError> {
        let server_url = section
            .get(SERVER_URL_KEY)
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                JiazError::validation("Missing 'server_url' in configuration. Run 'jiaz config init'.")
            })?;
        let encoded = section.get(USER_TOKEN_KEY).ok_or_else(|| {
            JiazError::validation("Missing 'user_token' in configuration. Run 'jiaz config init'.")
        })?;
        let token = decode_secure_value(encoded)
            .context("Failed to decode the stored user token")?;

        Ok(Self {
            server_url,
            token,
            custom_fields: CustomFieldIds::from_section(section),
            ..Self::default()
        })
    }
}

/// Rate-limited Jira REST client (API v2 and agile 1.0).
pub struct JiraClient {
    client: Client,
    config: JiraConfig,
    limiter: RateLimiter,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(JiraClient {
            client,
            config,
            limiter: RateLimiter::default(),
        })
    }

    /// Build a client for a config block and check the server and token.
    pub async fn connect(section: &Section) -> Result<Self, JiazError> {
        let client = Self::new(JiraConfig::from_section(section)?)?;
        client.validate_connection().await?;
        println!("✅ JIRA authentication successful.");
        Ok(client)
    }

    fn create_auth_header(&self) -> String {
        format!("Bearer {}", self.config.token)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{}", self.config.server_url, path)
    }

    /// Reachability probe of the server root, then an identity call.
    pub async fn validate_connection(&self) -> Result<(), JiazError> {
        let probe = self
            .client
            .get(&self.config.server_url)
            .timeout(Duration::from_secs(self.config.probe_timeout_seconds))
            .send()
            .await;

        match probe {
            Ok(response) if response.status().as_u16() >= 400 => {
                return Err(JiazError::fatal(format!(
                    "❌ JIRA server responded with status code {}.",
                    response.status().as_u16()
                )));
            }
            Ok(_) => debug!("Server {} is reachable", self.config.server_url),
            Err(e) => {
                return Err(JiazError::fatal(format!(
                    "❌ Unable to reach JIRA server: {}",
                    e
                )));
            }
        }

        self.limiter.acquire().await;
        let response = self
            .client
            .get(self.api_url("myself"))
            .header("Authorization", self.create_auth_header())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                JiazError::fatal(format!("❌ Unexpected error during JIRA authentication: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(JiazError::fatal(format!(
                "❌ Authentication failed: {} - {}",
                status, text
            )));
        }

        Ok(())
    }

    /// Send through the rate limiter, retrying throttled and server-side failures.
    /// POST creates resources, so it is sent once.
    async fn execute(&self, mut request_fn: impl FnMut() -> RequestBuilder) -> Result<Response> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            self.limiter.acquire().await;
            let request = request_fn()
                .header("Authorization", self.create_auth_header())
                .header("Accept", "application/json")
                .build()
                .context("Failed to build Jira request")?;
            let retryable = request.method() != Method::POST;
            let final_attempt = !retryable || attempt == self.config.max_retries;

            match self.client.execute(request).await {
                Ok(response)
                    if response.status() == StatusCode::TOO_MANY_REQUESTS
                        || response.status().is_server_error() =>
                {
                    warn!(
                        "Jira returned {} (attempt {}/{})",
                        response.status(),
                        attempt + 1,
                        self.config.max_retries + 1
                    );
                    if final_attempt {
                        return Ok(response);
                    }
                    last_error = Some(anyhow!("Jira API returned error {}", response.status()));
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Jira request failed: {}", e);
                    if final_attempt {
                        return Err(anyhow::Error::new(e));
                    }
                    last_error = Some(anyhow::Error::new(e));
                }
            }

            sleep(Duration::from_millis(
                self.config.retry_delay_ms * 2_u64.pow(attempt as u32),
            ))
            .await;
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow!("Request failed after {} attempts", self.config.max_retries + 1)
        }))
    }

    async fn into_json(response: Response, action: &str) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Failed to {}: {} - {}", action, status, text);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let body = response.text().await.context("Failed to read Jira response")?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).context("Failed to parse JSON response")
    }
}

#[async_trait]
impl Tracker for JiraClient {
    fn server_url(&self) -> &str {
        &self.config.server_url
    }

    fn custom_fields(&self) -> &CustomFieldIds {
        &self.config.custom_fields
    }

    async fn get_issue(&self, key: &str) -> Result<Option<Value>> {
        let url = self.api_url(&format!("issue/{}", urlencoding::encode(key)));
        let response = self.execute(|| self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            info!("Issue {} not found", key);
            return Ok(None);
        }
        Self::into_json(response, &format!("fetch issue {}", key))
            .await
            .map(Some)
    }

    async fn search_issues(&self, jql: &str, max_results: u32) -> Result<Vec<Value>> {
        let url = format!(
            "{}?jql={}&maxResults={}",
            self.api_url("search"),
            urlencoding::encode(jql),
            max_results
        );
        debug!("Searching with JQL: {}", jql);
        let response = self.execute(|| self.client.get(&url)).await?;
        let results = Self::into_json(response, "search issues").await?;
        Ok(results
            .get("issues")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<Value> {
        let url = self.api_url(&format!("issue/{}/comment", urlencoding::encode(key)));
        let payload = serde_json::json!({ "body": body });
        let response = self.execute(|| self.client.post(&url).json(&payload)).await?;
        Self::into_json(response, &format!("comment on {}", key)).await
    }

    async fn pin_comment(&self, key: &str, comment_id: &str) -> Result<()> {
        let url = self.api_url(&format!(
            "issue/{}/comment/{}/pin",
            urlencoding::encode(key),
            urlencoding::encode(comment_id)
        ));
        let response = self
            .execute(|| self.client.put(&url).json(&Value::Bool(true)))
            .await?;
        Self::into_json(response, &format!("pin comment {}", comment_id)).await?;
        Ok(())
    }

    async fn pinned_comments(&self, key: &str) -> Result<Vec<Value>> {
        let url = self.api_url(&format!("issue/{}/pinned-comments", urlencoding::encode(key)));
        let response = self.execute(|| self.client.get(&url)).await?;
        let pinned = Self::into_json(response, &format!("list pinned comments of {}", key)).await?;
        Ok(pinned
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| entry.get("comment").unwrap_or(entry).clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_fields(&self, key: &str, fields: Value) -> Result<()> {
        let url = self.api_url(&format!("issue/{}", urlencoding::encode(key)));
        let payload = serde_json::json!({ "fields": fields });
        let response = self.execute(|| self.client.put(&url).json(&payload)).await?;
        Self::into_json(response, &format!("update issue {}", key)).await?;
        Ok(())
    }

    async fn active_sprints(&self, board_id: &str) -> Result<Vec<Value>> {
        let url = format!(
            "{}/rest/agile/1.0/board/{}/sprint?state=active",
            self.config.server_url,
            urlencoding::encode(board_id)
        );
        let response = self.execute(|| self.client.get(&url)).await?;
        let sprints = Self::into_json(response, &format!("list sprints of board {}", board_id)).await?;
        Ok(sprints
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::encode_secure_value;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn section(pairs: &[(&str, &str)]) -> Section {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_custom_field_defaults() {
        let ids = CustomFieldIds::default();
        assert_eq!(ids.story_points, "customfield_12310243");
        assert_eq!(ids.original_story_points, "customfield_12314040");
        assert_eq!(ids.status_summary, "customfield_12320841");
    }

    #[test]
    fn test_custom_field_overrides_from_section() {
        let ids = CustomFieldIds::from_section(&section(&[
            ("story_points_field", " customfield_1 "),
            ("jira_project", "PROJ"),
        ]));
        assert_eq!(ids.story_points, "customfield_1");
        assert_eq!(ids.work_type, CustomFieldIds::default().work_type);
    }

    #[test]
    fn test_config_from_section_decodes_token() {
        let token = encode_secure_value("pat-123");
        let config = JiraConfig::from_section(&section(&[
            ("server_url", "https://jira.example.com/"),
            ("user_token", &token),
        ]))
        .unwrap();
        assert_eq!(config.server_url, "https://jira.example.com");
        assert_eq!(config.token, "pat-123");
    }

    #[test]
    fn test_config_from_section_requires_server_url() {
        let err = JiraConfig::from_section(&section(&[("user_token", "dG9r")])).unwrap_err();
        assert!(matches!(err, JiazError::Validation(_)));
    }

    #[test]
    fn test_bearer_auth_header() {
        let client = JiraClient::new(JiraConfig {
            server_url: "https://jira.example.com".to_string(),
            token: "pat-123".to_string(),
            ..JiraConfig::default()
        })
        .unwrap();
        assert_eq!(client.create_auth_header(), "Bearer pat-123");
        assert_eq!(
            client.api_url("issue/PROJ-1"),
            "https://jira.example.com/rest/api/2/issue/PROJ-1"
        );
        assert_eq!(
            client.browse_url("PROJ-1"),
            "https://jira.example.com/browse/PROJ-1"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_fatal() {
        let client = JiraClient::new(JiraConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            token: "pat".to_string(),
            ..JiraConfig::default()
        })
        .unwrap();
        match client.validate_connection().await {
            Err(JiazError::Fatal(message)) => {
                assert!(message.starts_with("❌ Unable to reach JIRA server:"))
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    /// Answers every request with 502 and counts requests per method.
    async fn failing_server() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let methods = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&methods);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]);
                if let Some(method) = head.split_whitespace().next() {
                    seen.lock().unwrap().push(method.to_string());
                }
                let _ = stream
                    .write_all(
                        b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
            }
        });
        (url, methods)
    }

    fn client_for(url: String) -> JiraClient {
        JiraClient::new(JiraConfig {
            server_url: url,
            token: "pat".to_string(),
            retry_delay_ms: 1,
            ..JiraConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_comment_is_sent_once_on_server_error() {
        let (url, methods) = failing_server().await;
        let client = client_for(url);

        assert!(client.add_comment("PROJ-1", "backup").await.is_err());
        assert_eq!(methods.lock().unwrap().clone(), vec!["POST".to_string()]);
    }

    #[tokio::test]
    async fn test_reads_are_retried_on_server_error() {
        let (url, methods) = failing_server().await;
        let client = client_for(url);

        assert!(client.pinned_comments("PROJ-1").await.is_err());
        assert_eq!(methods.lock().unwrap().len(), 3);
    }
}
