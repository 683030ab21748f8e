pub mod decoders;
pub mod imap_client;

use anyhow::{Result, anyhow};
use chrono::{Days, NaiveDate};

use crate::domain::email::{EmailId, EmailRecord};

/// An authenticated mailbox.
pub trait MailService {
    fn search(&mut self, range: &DateRange) -> Result<Vec<EmailId>>;
    /// Headers only; the returned record has no body.
    fn metadata(&mut self, id: EmailId) -> Result<EmailRecord>;
    fn body(&mut self, id: EmailId) -> Result<String>;
}

/// Authenticates and hands back a mailbox handle.
pub trait MailConnector {
    fn connect(&self) -> Result<Box<dyn MailService>>;
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DateRange {
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            first: day,
            last: day,
        }
    }

    /// IMAP SEARCH criteria; BEFORE is exclusive so it points at the day after `last`.
    pub fn imap_query(&self) -> String {
        let end = self.last.checked_add_days(Days::new(1)).unwrap_or(self.last);
        format!("SINCE {} BEFORE {}", imap_date(self.first), imap_date(end))
    }
}

fn imap_date(d: NaiveDate) -> String {
    d.format("%d-%b-%Y").to_string()
}

/// Stands in when no mailbox is configured; every connect fails with the reason.
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl MailConnector for Unavailable {
    fn connect(&self) -> Result<Box<dyn MailService>> {
        Err(anyhow!("mail service not available: {}", self.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_day_query_spans_one_day() {
        let d = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
        assert_eq!(
            DateRange::single_day(d).imap_query(),
            "SINCE 30-Nov-2025 BEFORE 01-Dec-2025"
        );
    }

    #[test]
    fn range_query_crosses_year_end() {
        let r = DateRange {
            first: NaiveDate::from_ymd_opt(2025, 12, 30).unwrap(),
            last: NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
        };
        assert_eq!(r.imap_query(), "SINCE 30-Dec-2025 BEFORE 01-Jan-2026");
    }

    #[test]
    fn unavailable_connector_reports_reason() {
        let err = Unavailable::new("user_email not set").connect().err().unwrap();
        assert!(err.to_string().contains("user_email not set"));
    }
}
