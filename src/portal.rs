//! Where things live on the sportuni portal and its Microsoft sign-in pages.

use crate::{config::Activity, driver::Query, matcher::ScrapedSlot};

pub fn settings_link() -> Query {
    Query::tag("a").class("ups-settings-link").has_text("Settings")
}

pub fn sign_in_link() -> Query {
    Query::tag("a").class("ui-btn").has_text("Sign in")
}

pub fn email_input() -> Query {
    Query::placeholder("Email, phone, or Skype")
}

pub fn password_input() -> Query {
    Query::placeholder("Password")
}

/// The blue buttons of the Microsoft sign-in flow ("Next", "Sign in", "No").
pub fn sign_in_button(label: &str) -> Query {
    Query::tag("input").class("win-button").attr("value", label)
}

pub fn pick_account_prompt() -> Query {
    Query::tag("div").role("heading").has_text("Pick an account")
}

pub fn stay_signed_in_prompt() -> Query {
    Query::text("Stay signed in?")
}

pub fn second_factor_title() -> Query {
    Query::any().id("idDiv_SAOTCAS_Title")
}

pub fn second_factor_code() -> Query {
    Query::tag("div")
        .id("idRichContext_DisplaySign")
        .class("displaySign")
}

pub fn courses_button() -> Query {
    Query::tag("a")
        .class("ui-btn")
        .class("ui-btn-icon-right")
        .has_text("Courses")
}

pub fn activity_type_select() -> Query {
    Query::tag("select").id("type")
}

pub fn area_select() -> Query {
    Query::tag("select").id("area")
}

pub fn next_week_button() -> Query {
    Query::tag("a").class("ui-btn").has_text("Next week")
}

/// Every entry of the weekly schedule, e.g. "Wed 11.6. 20:00 Badminton".
pub fn schedule_rows() -> Query {
    Query::tag("li").has(Query::tag("span"))
}

/// The one schedule entry for `slot`.
pub fn schedule_entry(slot: &ScrapedSlot) -> Query {
    Query::tag("li")
        .has(Query::tag("a").text_is(&format!("{} {}", slot.hour, slot.activity)))
        .has(Query::tag("span").text_is(&format!("{} {}", slot.day, slot.date)))
}

pub fn book_court_link(court: u32) -> Query {
    Query::tag("a")
        .class("ui-link")
        .has_text(&format!("Book court {court}"))
}

pub fn reserve_link() -> Query {
    Query::tag("a").class("ui-link").has_text("Reserve")
}

pub fn booking_confirmation() -> Query {
    Query::tag("div")
        .class("ups-dialog-content")
        .text_is("Thank you for your booking!")
}

pub fn confirmation_ok_button() -> Query {
    Query::tag("a").class("ui-btn").text_is("Ok")
}

/// Close button of the booking window whose heading names `activity`.
pub fn close_booking_window(activity: Activity) -> Query {
    let window = Query::tag("div").has(Query::tag("h1").text_is(activity.dialog_heading()));
    Query::tag("a")
        .class("ui-btn")
        .class("ui-corner-all")
        .class("ui-icon-delete")
        .role("button")
        .has_text("Close")
        .within(window)
        .first()
}
