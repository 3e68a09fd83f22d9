//! Scripted in-memory browser for exercising the booking flow in tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use super::{Browser, DriverError, DriverResult, Page, Query};
use crate::portal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Goto(String),
    Click(Query),
    Fill(Query, String),
    Select(Query, String),
    WaitFor(Query),
    SaveState(PathBuf),
    Close,
}

#[derive(Debug, Default)]
struct FakeState {
    present: HashSet<Query>,
    failing_clicks: HashSet<Query>,
    texts: HashMap<Query, String>,
    /// Schedule rows per week; the next-week button moves forward.
    weeks: Vec<Vec<String>>,
    week: usize,
    unsettled: bool,
    fail_save: bool,
    actions: Vec<Action>,
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with(self, query: Query) -> Self {
        self.edit(|s| {
            s.present.insert(query);
        })
    }

    pub fn with_text(self, query: Query, text: &str) -> Self {
        self.edit(|s| {
            s.texts.insert(query, text.to_string());
        })
    }

    pub fn failing_click(self, query: Query) -> Self {
        self.edit(|s| {
            s.failing_clicks.insert(query);
        })
    }

    pub fn with_weeks(self, weeks: Vec<Vec<&str>>) -> Self {
        self.edit(|s| {
            s.weeks = weeks
                .into_iter()
                .map(|rows| rows.into_iter().map(str::to_string).collect())
                .collect();
        })
    }

    pub fn unsettled(self) -> Self {
        self.edit(|s| s.unsettled = true)
    }

    pub fn failing_save(self) -> Self {
        self.edit(|s| s.fail_save = true)
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn clicks(&self) -> Vec<Query> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::Click(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn waited_for(&self) -> Vec<Query> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::WaitFor(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn week(&self) -> usize {
        self.state.lock().unwrap().week
    }

    fn record(&self, action: Action) {
        self.state.lock().unwrap().actions.push(action);
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.record(Action::Goto(url.to_string()));
        Ok(())
    }

    async fn click(&self, query: &Query) -> DriverResult<()> {
        self.record(Action::Click(query.clone()));
        let mut state = self.state.lock().unwrap();
        if state.failing_clicks.contains(query) {
            return Err(DriverError::NotFound(query.to_xpath()));
        }
        if *query == portal::next_week_button() {
            state.week += 1;
        }
        Ok(())
    }

    async fn fill(&self, query: &Query, text: &str) -> DriverResult<()> {
        self.record(Action::Fill(query.clone(), text.to_string()));
        Ok(())
    }

    async fn select_option(&self, query: &Query, label: &str) -> DriverResult<()> {
        self.record(Action::Select(query.clone(), label.to_string()));
        Ok(())
    }

    async fn wait_for(&self, query: &Query, _timeout: Duration) -> DriverResult<bool> {
        self.record(Action::WaitFor(query.clone()));
        Ok(self.state.lock().unwrap().present.contains(query))
    }

    async fn wait_until_settled(&self, timeout: Duration) -> DriverResult<()> {
        if self.state.lock().unwrap().unsettled {
            return Err(DriverError::Timeout {
                what: "document to finish loading".to_string(),
                timeout,
            });
        }
        Ok(())
    }

    async fn text_content(&self, query: &Query) -> DriverResult<String> {
        self.state
            .lock()
            .unwrap()
            .texts
            .get(query)
            .cloned()
            .ok_or_else(|| DriverError::NotFound(query.to_xpath()))
    }

    async fn all_text_contents(&self, query: &Query) -> DriverResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        if *query != portal::schedule_rows() {
            return Ok(Vec::new());
        }
        Ok(state.weeks.get(state.week).cloned().unwrap_or_default())
    }

    async fn save_storage_state(&self, path: &Path) -> DriverResult<()> {
        self.record(Action::SaveState(path.to_path_buf()));
        if self.state.lock().unwrap().fail_save {
            return Err(DriverError::StorageState {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.record(Action::Close);
        Ok(())
    }
}

/// Hands out pre-scripted pages in order and remembers how each was opened.
#[derive(Debug, Default)]
pub struct FakeBrowser {
    pages: Mutex<VecDeque<FakePage>>,
    opened: Mutex<Vec<Option<PathBuf>>>,
    reject_state: bool,
}

impl FakeBrowser {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            opened: Mutex::new(Vec::new()),
            reject_state: false,
        }
    }

    /// Fails any open that is seeded from a storage state, as with a corrupt
    /// artifact, without handing out a page.
    pub fn rejecting_state(mut self) -> Self {
        self.reject_state = true;
        self
    }

    /// Storage state each opened page was seeded with.
    pub fn opened(&self) -> Vec<Option<PathBuf>> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    type Page = FakePage;

    async fn open_page(&self, storage_state: Option<&Path>) -> DriverResult<FakePage> {
        self.opened
            .lock()
            .unwrap()
            .push(storage_state.map(Path::to_path_buf));
        if self.reject_state && storage_state.is_some() {
            return Err(DriverError::Malformed("unreadable storage state".to_string()));
        }
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DriverError::Malformed("no scripted page left".to_string()))
    }
}
