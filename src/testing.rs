//! In-memory doubles shared by the unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::jira_client::{CustomFieldIds, Tracker};
use crate::llm::{LlmBackend, LlmError};
use crate::prompt::{KeyValidator, Prompter};

/// Answers prompts from a fixed script, recording what was asked.
///
/// `confirm` reads "y"/"n" (empty keeps the default) and `select` reads an index.
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new<const N: usize>(answers: [&str; N]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|a| a.to_string()).collect()),
            asked: RefCell::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    fn next(&self, prompt: &str) -> Result<String> {
        self.asked.borrow_mut().push(prompt.to_string());
        match self.answers.borrow_mut().pop_front() {
            Some(answer) => Ok(answer),
            None => bail!("no scripted answer for '{}'", prompt),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn input(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn secret(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(match self.next(prompt)?.trim() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => default,
        })
    }

    fn select(&self, prompt: &str, items: &[&str]) -> Result<usize> {
        let answer = self.next(prompt)?;
        let index: usize = answer.trim().parse()?;
        if index >= items.len() {
            bail!("scripted selection {} out of range", index);
        }
        Ok(index)
    }
}

/// Accepts exactly the listed keys.
pub struct AcceptKeys(pub Vec<String>);

#[async_trait]
impl KeyValidator for AcceptKeys {
    async fn validate(&self, api_key: &str) -> bool {
        self.0.iter().any(|key| key == api_key)
    }
}

/// Tracker backed by maps, recording every write.
pub struct FakeTracker {
    custom_fields: CustomFieldIds,
    issues: HashMap<String, Value>,
    search_results: Vec<Value>,
    sprints: Vec<Value>,
    pinned: Vec<Value>,
    fail_search: bool,
    fail_pin: bool,
    searches: Mutex<Vec<String>>,
    comments: Mutex<Vec<(String, String)>>,
    pins: Mutex<Vec<(String, String)>>,
    updates: Mutex<Vec<(String, Value)>>,
}

impl Default for FakeTracker {
    fn default() -> Self {
        Self {
            custom_fields: CustomFieldIds::default(),
            issues: HashMap::new(),
            search_results: Vec::new(),
            sprints: Vec::new(),
            pinned: Vec::new(),
            fail_search: false,
            fail_pin: false,
            searches: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
            pins: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
        }
    }
}

impl FakeTracker {
    pub fn with_issue(mut self, issue: Value) -> Self {
        let key = issue["key"].as_str().unwrap_or_default().to_string();
        self.issues.insert(key, issue);
        self
    }

    pub fn with_search_results(mut self, results: Vec<Value>) -> Self {
        self.search_results = results;
        self
    }

    pub fn with_sprints(mut self, sprints: Vec<Value>) -> Self {
        self.sprints = sprints;
        self
    }

    pub fn with_pinned(mut self, pinned: Vec<Value>) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn failing_pin(mut self) -> Self {
        self.fail_pin = true;
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    pub fn pins(&self) -> Vec<(String, String)> {
        self.pins.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, Value)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    fn server_url(&self) -> &str {
        "https://jira.example.com"
    }

    fn custom_fields(&self) -> &CustomFieldIds {
        &self.custom_fields
    }

    async fn get_issue(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.issues.get(key).cloned())
    }

    async fn search_issues(&self, jql: &str, _max_results: u32) -> Result<Vec<Value>> {
        self.searches.lock().unwrap().push(jql.to_string());
        if self.fail_search {
            bail!("search failed");
        }
        Ok(self.search_results.clone())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<Value> {
        let mut comments = self.comments.lock().unwrap();
        comments.push((key.to_string(), body.to_string()));
        Ok(json!({ "id": format!("{}", 10000 + comments.len()), "body": body }))
    }

    async fn pin_comment(&self, key: &str, comment_id: &str) -> Result<()> {
        if self.fail_pin {
            bail!("pinning is not supported");
        }
        self.pins
            .lock()
            .unwrap()
            .push((key.to_string(), comment_id.to_string()));
        Ok(())
    }

    async fn pinned_comments(&self, _key: &str) -> Result<Vec<Value>> {
        Ok(self.pinned.clone())
    }

    async fn update_fields(&self, key: &str, fields: Value) -> Result<()> {
        self.updates.lock().unwrap().push((key.to_string(), fields));
        Ok(())
    }

    async fn active_sprints(&self, _board_id: &str) -> Result<Vec<Value>> {
        Ok(self.sprints.clone())
    }
}

/// LLM backend replaying queued responses.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    available: bool,
    remote: bool,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            available: true,
            remote: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn local(mut self) -> Self {
        self.remote = false;
        self
    }
}

pub fn unavailable_error() -> LlmError {
    LlmError::ServiceUnavailable("Scripted".to_string())
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn is_remote(&self) -> bool {
        self.remote
    }

    async fn check_availability(&self) -> bool {
        self.available
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Response {
                    service: "Scripted".to_string(),
                    message: "no scripted response left".to_string(),
                })
            })
    }
}

/// A Story with the fields most tests read. The one comment is from
/// 2024-05-18 and the epic link is EPIC-7.
pub fn sample_issue(key: &str, status: &str, assignee: &str, story_points: Option<f64>) -> Value {
    let ids = CustomFieldIds::default();
    let mut issue = json!({
        "key": key,
        "fields": {
            "summary": format!("Title of {}", key),
            "issuetype": { "name": "Story", "subtask": false },
            "status": { "name": status },
            "assignee": { "displayName": assignee },
            "reporter": { "displayName": "Rita Reporter" },
            "priority": { "name": "Major" },
            "labels": ["backend", "q2"],
            "created": "2024-05-01T09:00:00.000+0000",
            "updated": "2024-05-19T09:00:00.000+0000",
            "description": format!("Description of {}", key),
            "comment": {
                "comments": [
                    {
                        "id": "1",
                        "author": { "displayName": "Bob Builder" },
                        "body": "Looks good",
                        "created": "2024-05-18T10:00:00.000+0000"
                    }
                ]
            }
        }
    });

    let fields = &mut issue["fields"];
    fields[ids.work_type.as_str()] = json!({ "value": "Feature" });
    fields[ids.epic_link.as_str()] = json!("EPIC-7");
    if let Some(points) = story_points {
        fields[ids.story_points.as_str()] = json!(points);
    }
    if assignee.is_empty() {
        fields["assignee"] = Value::Null;
    }
    issue
}
