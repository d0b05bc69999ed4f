use time::{macros::format_description, Date, Duration, Month, OffsetDateTime};

use super::{dto::ListExpensesQuery, repo_types::ExpenseFilter};

/// Preset windows ending now. They take precedence over explicit dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    LastWeek,
    LastMonth,
    LastThreeMonth,
}

impl FilterType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lastWeek" => Some(Self::LastWeek),
            "lastMonth" => Some(Self::LastMonth),
            "lastThreeMonth" => Some(Self::LastThreeMonth),
            _ => None,
        }
    }

    fn start(self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        match self {
            Self::LastWeek => Some(now - Duration::days(7)),
            Self::LastMonth => months_before(now, 1),
            Self::LastThreeMonth => months_before(now, 3),
        }
    }
}

/// Same wall-clock time `months` calendar months earlier. The day is clamped
/// to the length of the target month (May 31 minus three months is Feb 28/29).
fn months_before(dt: OffsetDateTime, months: u32) -> Option<OffsetDateTime> {
    let index = dt.year() * 12 + i32::from(u8::from(dt.month())) - 1 - months as i32;
    let year = index.div_euclid(12);
    let month = Month::try_from((index.rem_euclid(12) + 1) as u8).ok()?;
    let day = dt.day().min(month.length(year));
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(dt.replace_date(date))
}

/// `YYYY-MM-DD` at UTC midnight; anything else is no bound.
fn parse_day(value: Option<&str>) -> Option<OffsetDateTime> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

/// Turns list query parameters into store predicates.
pub fn resolve(query: &ListExpensesQuery, now: OffsetDateTime) -> ExpenseFilter {
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let (start, end) = match query.filter_type.as_deref().and_then(FilterType::parse) {
        Some(preset) => (preset.start(now), Some(now)),
        None => (
            parse_day(query.date_start.as_deref()),
            parse_day(query.date_end.as_deref()),
        ),
    };

    ExpenseFilter {
        category,
        start,
        end,
    }
}
