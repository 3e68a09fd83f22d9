use std::time::Duration;

use log::{debug, error, info, warn};

use crate::{
    config::{Activity, ActivitySlotPreference, BookingType},
    driver::Page,
    error::{BookingError, Result},
    matcher::{ScrapedSlot, match_slots, scrape_visible_slots},
    portal,
};

pub const COURT_COUNT: u32 = 6;
const COURT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(2);

/// How a slot ended up being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Court(u32),
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedSlot {
    pub slot: ScrapedSlot,
    pub claim: Claim,
}

/// Outcome of one pass over a single preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingAttemptResult {
    Booked(Vec<BookedSlot>),
    /// Neither this week nor the next has the slot.
    NoMatch,
    /// The slot was found but nothing in it could be claimed.
    CourtsExhausted { tried: u32 },
}

/// Drives the portal through booking each preference on an already
/// authenticated page.
pub struct Booker<'a, P: Page + ?Sized> {
    page: &'a P,
}

impl<'a, P: Page + ?Sized> Booker<'a, P> {
    pub fn new(page: &'a P) -> Self {
        Self { page }
    }

    /// Books every preference in order, stopping at the first one that fails.
    pub async fn book_all(
        &self,
        preferences: &[ActivitySlotPreference],
    ) -> Result<Vec<BookedSlot>> {
        let mut booked = Vec::new();
        for (index, preference) in preferences.iter().enumerate() {
            info!(
                "Booking {}/{}: {preference}",
                index + 1,
                preferences.len()
            );
            let result = self.attempt(preference).await.inspect_err(|err| {
                error!("Aborting run, booking {preference} failed: {err}");
            })?;
            match result {
                BookingAttemptResult::Booked(slots) => booked.extend(slots),
                BookingAttemptResult::NoMatch => {
                    error!("Aborting run, the booking choice {preference} doesn't exist");
                    return Err(BookingError::NoMatch(preference.to_string()));
                }
                BookingAttemptResult::CourtsExhausted { tried } => {
                    error!("Aborting run, failed to book any court for {preference}");
                    return Err(BookingError::CourtsExhausted(tried));
                }
            }
        }
        Ok(booked)
    }

    /// One full pass for `preference`: filter the listing, find the slot (this
    /// week or the next), then claim, confirm and close each matched slot.
    pub async fn attempt(&self, preference: &ActivitySlotPreference) -> Result<BookingAttemptResult> {
        self.open_listing(preference).await?;

        let matched = self.find_matching_slots(preference).await?;
        if matched.is_empty() {
            return Ok(BookingAttemptResult::NoMatch);
        }
        info!("Match result: {matched:?}");

        let mut booked = Vec::with_capacity(matched.len());
        for slot in matched {
            self.page.click(&portal::schedule_entry(&slot)).await?;

            let claim = match preference.activity.booking_type() {
                BookingType::BookCourt => self.try_book_court(COURT_COUNT).await?.map(Claim::Court),
                BookingType::Reserve => self.try_reserve().await?.then_some(Claim::Reserved),
            };
            let Some(claim) = claim else {
                let tried = match preference.activity.booking_type() {
                    BookingType::BookCourt => COURT_COUNT,
                    BookingType::Reserve => 1,
                };
                return Ok(BookingAttemptResult::CourtsExhausted { tried });
            };

            self.confirm_booking().await?;
            self.close_booking_window(preference.activity).await?;
            booked.push(BookedSlot { slot, claim });
        }
        Ok(BookingAttemptResult::Booked(booked))
    }

    async fn open_listing(&self, preference: &ActivitySlotPreference) -> Result<()> {
        self.page.click(&portal::courses_button()).await?;
        self.page
            .select_option(
                &portal::activity_type_select(),
                preference.activity.category_label(),
            )
            .await?;
        self.page
            .select_option(&portal::area_select(), preference.area.display_label())
            .await?;
        Ok(())
    }

    /// Matches against the week on screen, moving on to the next week once if
    /// that fails. A second structural failure is returned as an error; a
    /// second miss comes back as an empty list.
    async fn find_matching_slots(
        &self,
        preference: &ActivitySlotPreference,
    ) -> Result<Vec<ScrapedSlot>> {
        match self.match_current_week(preference).await {
            Ok(found) if !found.is_empty() => return Ok(found),
            Ok(_) => warn!("Time slots found, but none match {preference}. Trying next week."),
            Err(BookingError::NoSlotElements) => {
                warn!("No time slots found for the current week. Trying next week.")
            }
            Err(err) => return Err(err),
        }

        self.page.click(&portal::next_week_button()).await?;
        self.match_current_week(preference).await
    }

    async fn match_current_week(
        &self,
        preference: &ActivitySlotPreference,
    ) -> Result<Vec<ScrapedSlot>> {
        let slots = scrape_visible_slots(self.page).await?;
        Ok(match_slots(preference, &slots))
    }

    /// Tries courts `1..=max_courts` in order and takes the first that exists
    /// and accepts the click.
    pub async fn try_book_court(&self, max_courts: u32) -> Result<Option<u32>> {
        for court in 1..=max_courts {
            let link = portal::book_court_link(court);
            if !self.page.wait_for(&link, COURT_PROBE_TIMEOUT).await? {
                debug!("Court {court} is not offered");
                continue;
            }
            match self.page.click(&link).await {
                Ok(()) => {
                    info!("Successfully booked court {court}");
                    return Ok(Some(court));
                }
                Err(err) => debug!("Court {court} did not take the booking: {err}"),
            }
        }
        warn!("No courts available (tried 1-{max_courts})");
        Ok(None)
    }

    pub async fn try_reserve(&self) -> Result<bool> {
        let link = portal::reserve_link();
        if !self.page.wait_for(&link, COURT_PROBE_TIMEOUT).await? {
            warn!("Nothing to reserve");
            return Ok(false);
        }
        match self.page.click(&link).await {
            Ok(()) => {
                info!("Successfully reserved");
                Ok(true)
            }
            Err(err) => {
                warn!("Cannot reserve: {err}");
                Ok(false)
            }
        }
    }

    /// Without the confirmation dialog there is no telling whether the booking
    /// went through, so its absence is fatal. Failing to dismiss it is not.
    async fn confirm_booking(&self) -> Result<()> {
        if !self
            .page
            .wait_for(&portal::booking_confirmation(), CONFIRMATION_TIMEOUT)
            .await?
        {
            return Err(BookingError::DialogTimeout(CONFIRMATION_TIMEOUT));
        }
        if let Err(err) = self.page.click(&portal::confirmation_ok_button()).await {
            warn!("Could not dismiss booking confirmation: {err}");
        }
        Ok(())
    }

    async fn close_booking_window(&self, activity: Activity) -> Result<()> {
        self.page
            .click(&portal::close_booking_window(activity))
            .await?;
        Ok(())
    }
}
