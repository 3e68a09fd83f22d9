pub mod app;
pub mod booking;
pub mod config;
pub mod driver;
mod error;
pub mod matcher;
mod portal;
pub mod session;

pub use booking::{BookedSlot, Booker, BookingAttemptResult, Claim};
pub use config::{Activity, ActivitySlotPreference, Area, Config, ConfigError};
pub use error::{BookingError, Result};
pub use matcher::{ScrapedSlot, match_slots, parse_slot_row, scrape_visible_slots};
pub use session::{SessionManager, SessionPhase};
