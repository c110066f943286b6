//! Announcement rendering.

use crate::models::{Announcement, EventRecord};

/// Date layout used in announcements, e.g. "November 24, 2024 07:58" (UTC).
pub const DATE_FORMAT: &str = "%B %d, %Y %H:%M";

/// Render an event into announcement text and a map link.
pub fn format_event(event: &EventRecord) -> Announcement {
    let date = event.occurred_at.format(DATE_FORMAT);
    Announcement {
        text: format!("Magnitude {} {} on {}\n", event.mag, event.place, date),
        map_link: map_link(&event.latitude_text(), &event.longitude_text()),
    }
}

/// Google Maps link centered on the given coordinates.
pub fn map_link(latitude: &str, longitude: &str) -> String {
    format!("https://maps.google.com/?q={},{}", latitude, longitude)
}
