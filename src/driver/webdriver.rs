//! W3C WebDriver backend (geckodriver, chromedriver, ...) spoken over plain
//! HTTP + JSON.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::{Client, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Browser, DriverError, DriverResult, Page, Query};

/// Key under which W3C WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long clicks and fills wait for their target to show up.
const ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosts that remember the signed-in account. The flow only passes through
/// them by clicking, so they are never recorded by `goto`.
const SIGN_IN_HOSTS: &[&str] = &["login.microsoftonline.com"];

pub struct WebDriverBrowser {
    client: Client,
    server_url: String,
    headless: bool,
}

impl WebDriverBrowser {
    pub fn new(server_url: &str, headless: bool) -> DriverResult<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            headless,
        })
    }

    fn capabilities(&self) -> Value {
        let args: Vec<&str> = if self.headless { vec!["-headless"] } else { vec![] };
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "firefox",
                    "moz:firefoxOptions": { "args": args }
                }
            }
        })
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    type Page = WebDriverPage;

    async fn open_page(&self, storage_state: Option<&Path>) -> DriverResult<WebDriverPage> {
        let state = match storage_state {
            Some(path) => Some(StorageState::read(path).await?),
            None => None,
        };

        let url = format!("{}/session", self.server_url);
        let value = send(&self.client, Method::POST, &url, Some(self.capabilities())).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Malformed(format!("no sessionId in {value}")))?;
        debug!("Opened webdriver session {session_id}");

        let page = WebDriverPage {
            client: self.client.clone(),
            session_url: format!("{}/session/{}", self.server_url, session_id),
            hosts: Mutex::new(BTreeSet::new()),
        };
        if let Some(state) = &state {
            if let Err(err) = page.restore_cookies(state).await {
                if let Err(close_err) = page.close().await {
                    warn!("Failed to end webdriver session {session_id}: {close_err}");
                }
                return Err(err);
            }
        }
        Ok(page)
    }
}

pub struct WebDriverPage {
    client: Client,
    session_url: String,
    /// Every host navigated to, for collecting cookies on save.
    hosts: Mutex<BTreeSet<String>>,
}

impl WebDriverPage {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}/{}", self.session_url, path);
        send(&self.client, method, &url, body).await
    }

    async fn find_all(&self, query: &Query) -> DriverResult<Vec<String>> {
        let value = self
            .command(
                Method::POST,
                "elements",
                Some(json!({ "using": "xpath", "value": query.to_xpath() })),
            )
            .await?;
        let elements = value
            .as_array()
            .ok_or_else(|| DriverError::Malformed(format!("expected element list, got {value}")))?;
        elements
            .iter()
            .map(|element| {
                element
                    .get(ELEMENT_KEY)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| DriverError::Malformed(format!("bad element reference {element}")))
            })
            .collect()
    }

    /// First element matching `query`, polling until `timeout`.
    async fn locate(&self, query: &Query, timeout: Duration) -> DriverResult<String> {
        let start = Instant::now();
        loop {
            if let Some(id) = self.find_all(query).await?.into_iter().next() {
                return Ok(id);
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::NotFound(query.to_xpath()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn element_text(&self, element: &str) -> DriverResult<String> {
        let value = self
            .command(
                Method::POST,
                "execute/sync",
                Some(json!({
                    "script": "return arguments[0].textContent;",
                    "args": [{ ELEMENT_KEY: element }]
                })),
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click_element(&self, query: &Query) -> DriverResult<()> {
        let start = Instant::now();
        loop {
            let element = self.locate(query, ACTION_TIMEOUT).await?;
            let path = format!("element/{element}/click");
            match self.command(Method::POST, &path, Some(json!({}))).await {
                Ok(_) => return Ok(()),
                // Animations and overlays make elements briefly unclickable.
                Err(DriverError::Protocol { error, .. })
                    if is_transient(&error) && start.elapsed() < ACTION_TIMEOUT =>
                {
                    debug!("Retrying click on {query}: {error}");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn current_url(&self) -> DriverResult<String> {
        let value = self.command(Method::GET, "url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Malformed(format!("expected url, got {value}")))
    }

    fn remember_host(&self, url: &str) {
        if let (Some(host), Ok(mut hosts)) = (host_of(url), self.hosts.lock()) {
            hosts.insert(host);
        }
    }

    /// Cookies visible on each of `hosts`, gathered in a throwaway tab so the
    /// page the flow is on stays where it is.
    async fn collect_cookies(&self, hosts: &BTreeSet<String>) -> DriverResult<Vec<Vec<Cookie>>> {
        let original = self.command(Method::GET, "window", None).await?;
        let created = self
            .command(Method::POST, "window/new", Some(json!({ "type": "tab" })))
            .await?;
        let tab = created.get("handle").cloned().unwrap_or(Value::Null);
        self.command(Method::POST, "window", Some(json!({ "handle": tab })))
            .await?;

        let mut batches = Vec::with_capacity(hosts.len());
        for host in hosts {
            let url = cookie_url(host);
            if let Err(err) = self.command(Method::POST, "url", Some(json!({ "url": url }))).await {
                warn!("Skipping cookies of {host}: {err}");
                continue;
            }
            let value = self.command(Method::GET, "cookie", None).await?;
            batches.push(serde_json::from_value(value)?);
        }

        self.command(Method::DELETE, "window", None).await?;
        self.command(Method::POST, "window", Some(json!({ "handle": original })))
            .await?;
        Ok(batches)
    }

    async fn restore_cookies(&self, state: &StorageState) -> DriverResult<()> {
        let now = Utc::now().timestamp();
        let mut by_domain: BTreeMap<String, Vec<&Cookie>> = BTreeMap::new();
        for cookie in &state.cookies {
            if cookie.expiry.is_some_and(|expiry| expiry < now) {
                continue;
            }
            let domain = cookie.domain.as_deref().unwrap_or_default();
            let host = domain.trim_start_matches('.').to_string();
            if host.is_empty() {
                continue;
            }
            by_domain.entry(host).or_default().push(cookie);
        }

        // WebDriver only accepts cookies for the document's current domain.
        for (host, cookies) in by_domain {
            if let Err(err) = self.goto(&cookie_url(&host)).await {
                warn!("Skipping {} cookies for {host}: {err}", cookies.len());
                continue;
            }
            for cookie in cookies {
                let body = json!({ "cookie": cookie });
                if let Err(err) = self.command(Method::POST, "cookie", Some(body)).await {
                    warn!("Could not restore cookie {} for {host}: {err}", cookie.name);
                }
            }
        }
        debug!("Restored session from storage state saved at {}", state.saved_at);
        Ok(())
    }
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        self.remember_host(url);
        Ok(())
    }

    async fn click(&self, query: &Query) -> DriverResult<()> {
        self.click_element(query).await
    }

    async fn fill(&self, query: &Query, text: &str) -> DriverResult<()> {
        let element = self.locate(query, ACTION_TIMEOUT).await?;
        self.command(Method::POST, &format!("element/{element}/clear"), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn select_option(&self, query: &Query, label: &str) -> DriverResult<()> {
        let option = Query::tag("option").text_is(label).within(query.clone());
        self.click_element(&option).await
    }

    async fn wait_for(&self, query: &Query, timeout: Duration) -> DriverResult<bool> {
        match self.locate(query, timeout).await {
            Ok(_) => Ok(true),
            Err(DriverError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn wait_until_settled(&self, timeout: Duration) -> DriverResult<()> {
        let start = Instant::now();
        loop {
            let state = self
                .command(
                    Method::POST,
                    "execute/sync",
                    Some(json!({ "script": "return document.readyState;", "args": [] })),
                )
                .await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    what: "document to finish loading".to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn text_content(&self, query: &Query) -> DriverResult<String> {
        let element = self.locate(query, ACTION_TIMEOUT).await?;
        self.element_text(&element).await
    }

    async fn all_text_contents(&self, query: &Query) -> DriverResult<Vec<String>> {
        let mut texts = Vec::new();
        for element in self.find_all(query).await? {
            texts.push(self.element_text(&element).await?);
        }
        Ok(texts)
    }

    /// WebDriver only hands out the current document's cookies, so every host
    /// the flow touched is visited in turn and the results merged.
    async fn save_storage_state(&self, path: &Path) -> DriverResult<()> {
        let current = self.current_url().await?;
        let mut hosts = match self.hosts.lock() {
            Ok(hosts) => hosts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        hosts.extend(host_of(&current));
        hosts.extend(SIGN_IN_HOSTS.iter().map(|host| host.to_string()));

        let batches = self.collect_cookies(&hosts).await?;
        let state = StorageState {
            saved_at: Utc::now(),
            cookies: merge_cookies(batches),
        };
        debug!("Saving {} cookies from {hosts:?}", state.cookies.len());
        state.write(path).await
    }

    async fn close(&self) -> DriverResult<()> {
        send(&self.client, Method::DELETE, &self.session_url, None)
            .await
            .map(|_| ())
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// A same-host URL that doesn't redirect elsewhere, so cookies can be read
/// and set for `host`.
fn cookie_url(host: &str) -> String {
    format!("https://{host}/favicon.ico")
}

/// Later batches win when the same cookie shows up on several hosts.
fn merge_cookies(batches: Vec<Vec<Cookie>>) -> Vec<Cookie> {
    let mut merged: BTreeMap<(Option<String>, Option<String>, String), Cookie> = BTreeMap::new();
    for cookie in batches.into_iter().flatten() {
        let key = (cookie.domain.clone(), cookie.path.clone(), cookie.name.clone());
        merged.insert(key, cookie);
    }
    merged.into_values().collect()
}

fn is_transient(error: &str) -> bool {
    matches!(
        error,
        "element click intercepted" | "element not interactable" | "stale element reference"
    )
}

async fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> DriverResult<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let mut payload: Value = response.json().await?;
    let value = payload
        .get_mut("value")
        .map(Value::take)
        .unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Err(DriverError::Protocol {
        error: field("error"),
        message: field("message"),
    })
}

/// One browser cookie, in WebDriver's JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

/// The session artifact: every cookie of the browsing context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<Cookie>,
}

impl StorageState {
    pub async fn read(path: &Path) -> DriverResult<Self> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| storage_error(path, source))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Writes to a sibling temp file and renames it over `path`, so readers
    /// only ever see a complete artifact.
    pub async fn write(&self, path: &Path) -> DriverResult<()> {
        let data = serde_json::to_vec_pretty(self)?;
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|source| storage_error(&tmp, source))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| storage_error(path, source))
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn storage_error(path: &Path, source: std::io::Error) -> DriverError {
    DriverError::StorageState {
        path: path.display().to_string(),
        source,
    }
}
