use std::time::Duration;

use anyhow::Context;
use log::{info, warn};

use crate::{
    booking::{BookedSlot, Booker},
    config::Config,
    driver::{Browser, Page, webdriver::WebDriverBrowser},
    error::Result,
    session::SessionManager,
};

/// Gives the portal time to finish the last booking before the browser goes.
pub const POST_RUN_DELAY: Duration = Duration::from_secs(20);

pub struct RunOptions {
    pub webdriver_url: String,
    pub headless: bool,
    pub post_run_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            headless: false,
            post_run_delay: POST_RUN_DELAY,
        }
    }
}

pub async fn run(config: &Config, options: &RunOptions) -> anyhow::Result<Vec<BookedSlot>> {
    let browser = WebDriverBrowser::new(&options.webdriver_url, options.headless)
        .with_context(|| format!("could not set up webdriver client for {}", options.webdriver_url))?;
    let booked = run_with_browser(&browser, config, options.post_run_delay)
        .await
        .context("booking run failed")?;
    Ok(booked)
}

/// Signs in, books every configured slot and tears the page down again.
pub async fn run_with_browser<B: Browser>(
    browser: &B,
    config: &Config,
    post_run_delay: Duration,
) -> Result<Vec<BookedSlot>> {
    let mut sessions = SessionManager::new(browser, config);
    let page = sessions.authenticate().await?;

    let outcome = Booker::new(&page).book_all(&config.activity_slots).await;
    if let Ok(booked) = &outcome {
        info!(
            "Booked {} slot(s), waiting {post_run_delay:?} before closing",
            booked.len()
        );
        tokio::time::sleep(post_run_delay).await;
    }

    if let Err(err) = page.close().await {
        warn!("Failed to close page: {err}");
    }
    outcome
}
