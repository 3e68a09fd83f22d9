use std::{
    fmt,
    path::{Path, PathBuf},
};

use chrono::NaiveTime;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://www.tuni.fi/sportuni/omasivu/?newPage=selection&lang=en";
const DEFAULT_STATE_FILE: &str = "ms_user.json";
const CONFIG_FILE_NAME: &str = "config.yaml";
const HOME_CONFIG_DIR: &str = ".sportuni";
const ENV_PREFIX: &str = "SPORTUNI_";

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("failed to load env variables into config: {0}")]
    Env(#[from] envy::Error),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("no activity slots configured")]
    NoSlots,
    #[error("invalid course_area: {0}\n available options are: {1}")]
    InvalidArea(String, String),
    #[error("invalid {field} {value:?} in activity slot #{index}")]
    InvalidSlot {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// Sports the portal lets us book, with the labels the portal uses for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Activity {
    Badminton,
    #[serde(alias = "Billiard")]
    Billiards,
}

/// How a matched slot is claimed once its booking window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingType {
    /// Several numbered courts, take the first free one.
    BookCourt,
    /// A single reservable resource.
    Reserve,
}

impl Activity {
    /// Text shown for the activity in the weekly schedule rows.
    pub fn schedule_label(self) -> &'static str {
        match self {
            Activity::Badminton => "Badminton",
            Activity::Billiards => "Billiards",
        }
    }

    /// Label of the activity-type filter option.
    pub fn category_label(self) -> &'static str {
        match self {
            Activity::Badminton => "Ball games",
            Activity::Billiards => "Other",
        }
    }

    /// Heading of the booking window opened for a slot.
    pub fn dialog_heading(self) -> &'static str {
        match self {
            Activity::Badminton => "Sulkapallo",
            Activity::Billiards => "Biljardi",
        }
    }

    pub fn booking_type(self) -> BookingType {
        match self {
            Activity::Badminton => BookingType::BookCourt,
            Activity::Billiards => BookingType::Reserve,
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schedule_label())
    }
}

/// Campus areas accepted in `course_area`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Area {
    Hervanta,
    Kauppi,
    CityCentre,
}

impl Area {
    pub const ALL: [Area; 3] = [Area::Hervanta, Area::Kauppi, Area::CityCentre];

    pub fn key(self) -> &'static str {
        match self {
            Area::Hervanta => "hervanta",
            Area::Kauppi => "kauppi",
            Area::CityCentre => "citycentre",
        }
    }

    /// Label of the area filter option.
    pub fn display_label(self) -> &'static str {
        match self {
            Area::Hervanta => "Hervanta",
            Area::Kauppi => "Kauppi",
            Area::CityCentre => "City centre",
        }
    }

    pub fn from_key(key: &str) -> Result<Self, ConfigError> {
        Self::ALL.into_iter().find(|a| a.key() == key).ok_or_else(|| {
            let options = Self::ALL.map(Area::key).join(" | ");
            ConfigError::InvalidArea(key.to_string(), options)
        })
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A slot the user wants booked every time the tool runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivitySlotPreference {
    pub day: String,
    pub date: String,
    pub hour: String,
    pub activity: Activity,
    pub area: Area,
}

impl fmt::Display for ActivitySlotPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {}",
            self.day, self.hour, self.activity, self.area
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawSlot {
    #[serde(default)]
    day: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    hour: String,
    activity: Activity,
    #[serde(alias = "area", default)]
    course_area: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    base_url: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    state_file_name: String,
    #[serde(default)]
    activity_slots: Vec<RawSlot>,
}

/// The `SPORTUNI_*` env vars. Any that are set override the config file.
#[derive(Debug, Default, Deserialize)]
pub struct BookingEnv {
    base_url: Option<String>,
    email: Option<String>,
    password: Option<String>,
    state_file: Option<String>,
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> Result<Self, ConfigError> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config = envy::prefixed(ENV_PREFIX).from_env::<Self>()?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub state_file: PathBuf,
    pub activity_slots: Vec<ActivitySlotPreference>,
}

impl Config {
    /// Loads from an explicit file, or from the first config file found in the
    /// working directory or `~/.sportuni/`. Without a readable file the config
    /// comes from the environment alone.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = BookingEnv::load_from_env()?;
        let raw = match explicit {
            Some(path) => read_config_file(path)?,
            None => match find_config_file() {
                Some(path) => read_config_file(&path)?,
                None => {
                    info!("No config file found, using environment only");
                    RawConfig::default()
                }
            },
        };
        Self::from_parts(raw, env)
    }

    pub fn from_yaml_str(input: &str, env: BookingEnv) -> Result<Self, ConfigError> {
        let raw = serde_yaml::from_str(input).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::from_parts(raw, env)
    }

    fn from_parts(raw: RawConfig, env: BookingEnv) -> Result<Self, ConfigError> {
        let pick = |file: String, env: Option<String>, default: &str| {
            env.filter(|v| !v.is_empty())
                .or(Some(file).filter(|v| !v.is_empty()))
                .unwrap_or_else(|| default.to_string())
        };

        let activity_slots = raw
            .activity_slots
            .into_iter()
            .map(|slot| -> Result<ActivitySlotPreference, ConfigError> {
                Ok(ActivitySlotPreference {
                    day: slot.day.trim().to_string(),
                    date: slot.date.trim().to_string(),
                    hour: slot.hour.trim().to_string(),
                    activity: slot.activity,
                    area: Area::from_key(slot.course_area.trim())?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let config = Config {
            base_url: pick(raw.base_url, env.base_url, DEFAULT_BASE_URL),
            email: pick(raw.email, env.email, ""),
            password: pick(raw.password, env.password, ""),
            state_file: PathBuf::from(pick(
                raw.state_file_name,
                env.state_file,
                DEFAULT_STATE_FILE,
            )),
            activity_slots,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url"));
        }
        if self.email.trim().is_empty() {
            return Err(ConfigError::Missing("email"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("password"));
        }
        if self.activity_slots.is_empty() {
            return Err(ConfigError::NoSlots);
        }

        let date_pattern = Regex::new(r"^\d{1,2}\.\d{1,2}\.$")?;
        for (index, slot) in self.activity_slots.iter().enumerate() {
            if !WEEKDAYS.contains(&slot.day.as_str()) {
                return Err(invalid_slot(index, "day", &slot.day));
            }
            // Schedule rows show zero-padded hours.
            if slot.hour.len() != 5 || NaiveTime::parse_from_str(&slot.hour, "%H:%M").is_err() {
                return Err(invalid_slot(index, "hour", &slot.hour));
            }
            // Never matched on, only checked for shape.
            if !slot.date.is_empty() && !date_pattern.is_match(&slot.date) {
                return Err(invalid_slot(index, "date", &slot.date));
            }
        }
        Ok(())
    }
}

fn invalid_slot(index: usize, field: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidSlot {
        index,
        field,
        value: value.to_string(),
    }
}

fn find_config_file() -> Option<PathBuf> {
    let local = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    let home = dirs::home_dir()?.join(HOME_CONFIG_DIR).join(CONFIG_FILE_NAME);
    home.is_file().then_some(home)
}

fn read_config_file(path: &Path) -> Result<RawConfig, ConfigError> {
    debug!("Reading config from {}", path.display());
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
