use std::{collections::HashMap, fmt, time::Duration};

use log::{debug, warn};

use crate::{
    config::ActivitySlotPreference,
    driver::Page,
    error::{BookingError, Result},
    portal,
};

/// Headless rendering may lag behind; a slow settle is not fatal.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// A schedule entry as shown in the weekly view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedSlot {
    pub day: String,
    pub date: String,
    pub hour: String,
    pub activity: String,
}

impl fmt::Display for ScrapedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.day, self.date, self.hour, self.activity)
    }
}

/// Identity of a slot across weeks. The date is deliberately left out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey<'a> {
    pub day: &'a str,
    pub hour: &'a str,
    pub activity: &'a str,
}

impl ScrapedSlot {
    pub fn key(&self) -> SlotKey<'_> {
        SlotKey {
            day: &self.day,
            hour: &self.hour,
            activity: &self.activity,
        }
    }
}

impl ActivitySlotPreference {
    pub fn key(&self) -> SlotKey<'_> {
        SlotKey {
            day: &self.day,
            hour: &self.hour,
            activity: self.activity.schedule_label(),
        }
    }
}

/// Splits a row such as "Wed 11.6. 20:00 Badminton" into its fields.
/// Rows with fewer than four tokens are partial entries and yield `None`.
pub fn parse_slot_row(text: &str) -> Option<ScrapedSlot> {
    let mut tokens = text.split_whitespace();
    let (Some(day), Some(date), Some(hour), Some(activity)) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return None;
    };
    Some(ScrapedSlot {
        day: day.to_string(),
        date: date.to_string(),
        hour: hour.to_string(),
        activity: activity.to_string(),
    })
}

/// Reads every slot of the week currently on screen.
///
/// Fails with [`BookingError::NoSlotElements`] when the page has no schedule
/// rows at all, which is different from rows that just don't match.
pub async fn scrape_visible_slots<P: Page + ?Sized>(page: &P) -> Result<Vec<ScrapedSlot>> {
    if let Err(err) = page.wait_until_settled(SETTLE_TIMEOUT).await {
        warn!("Page did not settle before scanning slots: {err}");
    }

    let rows = page.all_text_contents(&portal::schedule_rows()).await?;
    if rows.is_empty() {
        return Err(BookingError::NoSlotElements);
    }

    let slots: Vec<ScrapedSlot> = rows.iter().filter_map(|row| parse_slot_row(row)).collect();
    debug!("Scraped {} slots from {} rows", slots.len(), rows.len());
    Ok(slots)
}

/// Slots whose (day, hour, activity) equal the preference's. Later duplicates
/// replace earlier ones, so at most one slot comes back.
pub fn match_slots(
    preference: &ActivitySlotPreference,
    slots: &[ScrapedSlot],
) -> Vec<ScrapedSlot> {
    let by_key: HashMap<SlotKey<'_>, &ScrapedSlot> =
        slots.iter().map(|slot| (slot.key(), slot)).collect();
    by_key
        .get(&preference.key())
        .map(|slot| vec![(*slot).clone()])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Activity, Area},
        driver::fake::FakePage,
    };

    fn preference(day: &str, hour: &str, activity: Activity) -> ActivitySlotPreference {
        ActivitySlotPreference {
            day: day.to_string(),
            date: "11.6.".to_string(),
            hour: hour.to_string(),
            activity,
            area: Area::Hervanta,
        }
    }

    fn slots(rows: &[&str]) -> Vec<ScrapedSlot> {
        rows.iter().filter_map(|row| parse_slot_row(row)).collect()
    }

    #[test]
    fn parses_row_fields() {
        let slot = parse_slot_row("  Wed 11.6.\n 20:00   Badminton ").unwrap();
        assert_eq!(slot.day, "Wed");
        assert_eq!(slot.date, "11.6.");
        assert_eq!(slot.hour, "20:00");
        assert_eq!(slot.activity, "Badminton");
    }

    #[test]
    fn skips_short_rows() {
        assert_eq!(parse_slot_row("Wed 11.6. 20:00"), None);
        assert_eq!(parse_slot_row(""), None);
        assert_eq!(
            slots(&["Wed 11.6.", "Thu 12.6. 18:00 Badminton"]).len(),
            1
        );
    }

    #[test]
    fn matches_single_row() {
        let scraped = slots(&["Wed 11.6. 20:00 Badminton"]);
        let found = match_slots(&preference("Wed", "20:00", Activity::Badminton), &scraped);
        assert_eq!(found, scraped);
    }

    #[test]
    fn ignores_date_when_matching() {
        let scraped = slots(&["Wed 18.6. 20:00 Badminton"]);
        let found = match_slots(&preference("Wed", "20:00", Activity::Badminton), &scraped);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].date, "18.6.");
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let found = match_slots(&preference("Wed", "20:00", Activity::Badminton), &[]);
        assert!(found.is_empty());
    }

    #[test]
    fn no_row_with_the_same_key() {
        let scraped = slots(&[
            "Wed 11.6. 19:00 Badminton",
            "Thu 12.6. 20:00 Badminton",
            "Wed 11.6. 20:00 Billiards",
        ]);
        let found = match_slots(&preference("Wed", "20:00", Activity::Badminton), &scraped);
        assert!(found.is_empty());
    }

    #[test]
    fn returns_at_most_one_slot_last_duplicate_wins() {
        let scraped = slots(&[
            "Wed 11.6. 20:00 Badminton",
            "Mon 9.6. 07:00 Badminton",
            "Wed 18.6. 20:00 Badminton",
        ]);
        let wanted = preference("Wed", "20:00", Activity::Badminton);
        let found = match_slots(&wanted, &scraped);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key(), wanted.key());
        assert_eq!(found[0].date, "18.6.");
    }

    #[tokio::test]
    async fn scrape_without_rows_is_structural_failure() {
        let page = FakePage::new().with_weeks(vec![vec![]]);
        let err = scrape_visible_slots(&page).await.unwrap_err();
        assert!(matches!(err, BookingError::NoSlotElements));
    }

    #[tokio::test]
    async fn scrape_survives_unsettled_page_and_bad_rows() {
        let page = FakePage::new()
            .unsettled()
            .with_weeks(vec![vec!["Tue", "Tue 10.6. 17:00 Badminton"]]);
        let scraped = scrape_visible_slots(&page).await.unwrap();
        assert_eq!(scraped.len(), 1);
        assert_eq!(scraped[0].to_string(), "Tue 10.6. 17:00 Badminton");
    }
}
