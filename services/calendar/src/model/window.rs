//! Inclusive calendar date windows (ISO weeks and calendar months).
use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Inclusive `[start, end]` range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Monday..=Sunday of the ISO week containing `date`, or `None` when
    /// either end falls outside the representable date range.
    pub fn checked_week_of(date: NaiveDate) -> Option<Self> {
        let (back, ahead) = week_offsets(date);
        Some(Self {
            start: date.checked_sub_days(back)?,
            end: date.checked_add_days(ahead)?,
        })
    }

    /// Monday..=Sunday of the ISO week containing `date`, clamped to the
    /// representable date range.
    pub fn week_of(date: NaiveDate) -> Self {
        let (back, ahead) = week_offsets(date);
        Self {
            start: date.checked_sub_days(back).unwrap_or(NaiveDate::MIN),
            end: date.checked_add_days(ahead).unwrap_or(NaiveDate::MAX),
        }
    }

    /// First..=last day of the calendar month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        let end = start
            .checked_add_months(chrono::Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(date);
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// The day inside this window falling on `weekday`, if any.
    pub fn day_on(&self, weekday: Weekday) -> Option<NaiveDate> {
        let offset = (7 + weekday.num_days_from_monday()
            - self.start.weekday().num_days_from_monday())
            % 7;
        self.start
            .checked_add_days(Days::new(u64::from(offset)))
            .filter(|day| self.contains(*day))
    }
}

fn week_offsets(date: NaiveDate) -> (Days, Days) {
    let back = u64::from(date.weekday().num_days_from_monday());
    (Days::new(back), Days::new(6 - back))
}
