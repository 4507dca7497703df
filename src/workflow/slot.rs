//! Tee slots scraped from the results grid.

use crate::config::TimeWindow;

/// A bookable time shown for a course on the target date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeeSlot {
    /// Time as displayed, e.g. `"07:15"`.
    pub display_time: String,
    pub course: String,
    pub hour: u32,
}

impl TeeSlot {
    /// Build a slot from its displayed text; `None` if no leading hour parses.
    pub fn parse(display_time: &str, course: &str) -> Option<Self> {
        let display_time = display_time.trim();
        let hour = leading_hour(display_time)?;
        Some(Self {
            display_time: display_time.to_string(),
            course: course.to_string(),
            hour,
        })
    }

    pub fn in_window(&self, window: &TimeWindow) -> bool {
        window.contains(self.hour)
    }
}

/// The integer before the first `:` of a displayed time.
pub fn leading_hour(text: &str) -> Option<u32> {
    let head = text.trim().split(':').next()?;
    head.trim().parse().ok()
}
