//! Target date policy.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Largest offset a configuration may ask for.
pub const MAX_OFFSET_DAYS: u32 = 366;

/// How the date to book is derived from today's date.
///
/// The two policies are distinct on purpose: `NextWeekday` anchors to the
/// coming weekday before adding the offset, `FixedOffset` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum TargetDateRule {
    /// Next occurrence of `weekday` (today counts), plus `offset_days`.
    NextWeekday {
        #[serde(with = "weekday_name")]
        weekday: Weekday,
        offset_days: u32,
    },
    /// Today plus `days`.
    FixedOffset { days: u32 },
}

impl Default for TargetDateRule {
    /// Two Saturdays out.
    fn default() -> Self {
        TargetDateRule::NextWeekday { weekday: Weekday::Sat, offset_days: 14 }
    }
}

impl TargetDateRule {
    /// Saturates at [`NaiveDate::MAX`]; configured offsets are bounded by
    /// [`MAX_OFFSET_DAYS`] before a run starts.
    pub fn target_date(&self, today: NaiveDate) -> NaiveDate {
        let days = match *self {
            TargetDateRule::NextWeekday { weekday, offset_days } => {
                let from = today.weekday().num_days_from_monday();
                let to = weekday.num_days_from_monday();
                u64::from((to + 7 - from) % 7) + u64::from(offset_days)
            }
            TargetDateRule::FixedOffset { days } => u64::from(days),
        };
        today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
    }

    pub fn offset_days(&self) -> u32 {
        match *self {
            TargetDateRule::NextWeekday { offset_days, .. } => offset_days,
            TargetDateRule::FixedOffset { days } => days,
        }
    }
}

/// Format used by the tee sheet's date input.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

mod weekday_name {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(weekday: &Weekday, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&weekday.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Weekday, D::Error> {
        let name = String::deserialize(d)?;
        name.parse::<Weekday>()
            .map_err(|_| serde::de::Error::custom(format!("unknown weekday '{name}'")))
    }
}
