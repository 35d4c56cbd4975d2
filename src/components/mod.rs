//! Server-rendered page components.

pub mod card_grid;
pub mod media_overview;
pub mod stars;

pub use card_grid::{CardGrid, CardView};
pub use media_overview::{MediaOverview, OverviewState, WatchNow};

use crate::models::{MediaId, MediaType};

pub const LOGIN_ROUTE: &str = "/login";

/// Movies keep their dedicated route; everything else goes through `/overview/{type}/{id}`.
pub fn overview_route(media_type: MediaType, id: MediaId) -> String {
    match media_type {
        MediaType::Movie => format!("/moviesOverview/{id}"),
        other => format!("/overview/{other}/{id}"),
    }
}

/// Where a user interaction sends the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Route(String),
    Login,
}

impl Navigation {
    pub fn location(&self) -> &str {
        match self {
            Navigation::Route(path) => path,
            Navigation::Login => LOGIN_ROUTE,
        }
    }
}

pub(crate) fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wraps a rendered component in a minimal HTML document.
pub fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{}</title></head><body>{}</body></html>",
        escape(title),
        body
    )
}
