use std::{path::Path, time::Duration};

use log::{debug, info, warn};

use crate::{
    config::Config,
    driver::{Browser, Page},
    error::{BookingError, Result},
    portal,
};

const PICK_ACCOUNT_TIMEOUT: Duration = Duration::from_secs(10);
const STAY_SIGNED_IN_TIMEOUT: Duration = Duration::from_secs(3);
const EMAIL_FORM_TIMEOUT: Duration = Duration::from_secs(3);
const SECOND_FACTOR_TIMEOUT: Duration = Duration::from_secs(3);
/// Long enough to approve the sign-in on a phone.
const SECOND_FACTOR_APPROVAL_TIMEOUT: Duration = Duration::from_secs(55);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NoSession,
    Resuming,
    Expired,
    FreshLoginInProgress,
    Authenticated,
    AuthFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ArtifactFound,
    ArtifactMissing,
    ResumeSucceeded,
    ResumeExpired,
    LoginStarted,
    LoginSucceeded,
    LoginFailed,
}

impl SessionPhase {
    /// The phase `event` leads to, or `None` if it can't happen in this phase.
    pub fn on(self, event: SessionEvent) -> Option<SessionPhase> {
        use SessionEvent::*;
        use SessionPhase::*;

        match (self, event) {
            (NoSession, ArtifactFound) => Some(Resuming),
            (NoSession, ArtifactMissing) => Some(FreshLoginInProgress),
            (Resuming, ResumeSucceeded) => Some(Authenticated),
            (Resuming, ResumeExpired) => Some(Expired),
            (Expired, LoginStarted) => Some(FreshLoginInProgress),
            (FreshLoginInProgress, LoginSucceeded) => Some(Authenticated),
            (FreshLoginInProgress, LoginFailed) => Some(AuthFailed),
            _ => None,
        }
    }
}

/// Gets the tool signed in to the portal, reusing the saved session when the
/// identity provider still accepts it.
pub struct SessionManager<'a, B: Browser> {
    browser: &'a B,
    base_url: &'a str,
    email: &'a str,
    password: &'a str,
    artifact: &'a Path,
    phase: SessionPhase,
}

impl<'a, B: Browser> SessionManager<'a, B> {
    pub fn new(browser: &'a B, config: &'a Config) -> Self {
        Self {
            browser,
            base_url: &config.base_url,
            email: &config.email,
            password: &config.password,
            artifact: &config.state_file,
            phase: SessionPhase::NoSession,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn advance(&mut self, event: SessionEvent) -> Result<()> {
        let next = self.phase.on(event).ok_or_else(|| {
            BookingError::Auth(format!("{event:?} is not valid while {:?}", self.phase))
        })?;
        debug!("Session {:?} --{event:?}--> {next:?}", self.phase);
        self.phase = next;
        Ok(())
    }

    pub fn has_persisted_session(&self) -> bool {
        self.artifact.is_file()
    }

    /// Runs the session state machine until it is signed in or has failed.
    pub async fn authenticate(&mut self) -> Result<B::Page> {
        loop {
            match self.phase {
                SessionPhase::NoSession => {
                    if self.has_persisted_session() {
                        info!("Found session state in {}", self.artifact.display());
                        self.advance(SessionEvent::ArtifactFound)?;
                    } else {
                        info!("No session state file, signing in from scratch");
                        self.advance(SessionEvent::ArtifactMissing)?;
                    }
                }
                SessionPhase::Resuming => match self.try_resume_session().await {
                    Ok(page) => {
                        self.advance(SessionEvent::ResumeSucceeded)?;
                        return Ok(page);
                    }
                    Err(err) => {
                        if err.is_recoverable() {
                            info!("State file expired, signing in again");
                        } else {
                            warn!("Cannot reuse session state: {err}");
                        }
                        self.advance(SessionEvent::ResumeExpired)?;
                    }
                },
                SessionPhase::Expired => self.advance(SessionEvent::LoginStarted)?,
                SessionPhase::FreshLoginInProgress => match self.fresh_login().await {
                    Ok(page) => {
                        self.advance(SessionEvent::LoginSucceeded)?;
                        return Ok(page);
                    }
                    Err(err) => {
                        self.advance(SessionEvent::LoginFailed)?;
                        return Err(err);
                    }
                },
                SessionPhase::Authenticated | SessionPhase::AuthFailed => {
                    return Err(BookingError::Auth(format!(
                        "session already resolved as {:?}",
                        self.phase
                    )));
                }
            }
        }
    }

    /// Opens a page with the saved session and checks the identity provider
    /// still knows us. A "Pick an account" prompt or a bare email form means
    /// it doesn't.
    pub async fn try_resume_session(&self) -> Result<B::Page> {
        let page = self.browser.open_page(Some(self.artifact)).await?;
        match self.probe_resumed(&page).await {
            Ok(()) => Ok(page),
            Err(err) => {
                close_quietly(&page).await;
                Err(err)
            }
        }
    }

    async fn probe_resumed(&self, page: &B::Page) -> Result<()> {
        navigate_to_login(page, self.base_url).await?;

        if page
            .wait_for(&portal::pick_account_prompt(), PICK_ACCOUNT_TIMEOUT)
            .await?
        {
            return Err(BookingError::SessionExpired);
        }
        if page
            .wait_for(&portal::email_input(), EMAIL_FORM_TIMEOUT)
            .await?
        {
            debug!("Sign-in page asks for an email, saved session is unknown");
            return Err(BookingError::SessionExpired);
        }

        if page
            .wait_for(&portal::stay_signed_in_prompt(), STAY_SIGNED_IN_TIMEOUT)
            .await?
        {
            info!("Succeeded using state file. Proceeding");
            page.click(&portal::sign_in_button("No")).await?;
        }
        Ok(())
    }

    /// Signs in with the configured credentials. The portal always asks for a
    /// second factor; the code to confirm is printed for the operator.
    pub async fn fresh_login(&self) -> Result<B::Page> {
        info!("===START FRESH LOGIN===");
        let page = self.browser.open_page(None).await?;
        match self.sign_in(&page).await {
            Ok(()) => Ok(page),
            Err(err) => {
                close_quietly(&page).await;
                Err(err)
            }
        }
    }

    async fn sign_in(&self, page: &B::Page) -> Result<()> {
        navigate_to_login(page, self.base_url).await?;

        page.fill(&portal::email_input(), self.email).await?;
        page.click(&portal::sign_in_button("Next")).await?;
        page.fill(&portal::password_input(), self.password).await?;
        page.click(&portal::sign_in_button("Sign in")).await?;

        if !page
            .wait_for(&portal::second_factor_title(), SECOND_FACTOR_TIMEOUT)
            .await?
        {
            return Err(BookingError::Auth(
                "2FA authentication does not show up".to_string(),
            ));
        }

        let code = page
            .text_content(&portal::second_factor_code())
            .await
            .map_err(|err| BookingError::Auth(format!("failed to get 2FA code: {err}")))?;
        info!("===2FA authentication REQUIRED===");
        info!("Waiting for the sign-in to be approved ({SECOND_FACTOR_APPROVAL_TIMEOUT:?})...");
        println!("2FA code is: {}", code.trim());

        if !page
            .wait_for(&portal::stay_signed_in_prompt(), SECOND_FACTOR_APPROVAL_TIMEOUT)
            .await?
        {
            return Err(BookingError::Auth("2FA is not fulfilled".to_string()));
        }
        info!("Stay signed in appeared. Proceeding");
        page.click(&portal::sign_in_button("No")).await?;

        match page.save_storage_state(self.artifact).await {
            Ok(()) => info!("Saved session state to {}", self.artifact.display()),
            Err(err) => warn!("Cannot save state file: {err}"),
        }
        Ok(())
    }
}

async fn navigate_to_login<P: Page + ?Sized>(page: &P, base_url: &str) -> Result<()> {
    page.goto(base_url).await?;
    page.click(&portal::settings_link()).await?;
    page.click(&portal::sign_in_link()).await?;
    Ok(())
}

async fn close_quietly<P: Page + ?Sized>(page: &P) {
    if let Err(err) = page.close().await {
        warn!("Failed to close page: {err}");
    }
}
