use serde::Serialize;

pub type EmailId = u32;

/// One cached message. `body` stays `None` until the message is first selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    pub id: EmailId,
    pub sender: String,
    pub subject: String,
    pub date: String,
    /// Server receive time in epoch milliseconds; the sort key.
    pub internal_date: i64,
    pub body: Option<String>,
}

impl EmailRecord {
    pub fn summary(&self) -> EmailSummary {
        EmailSummary {
            sender: self.sender.clone(),
            subject: self.subject.clone(),
            date: self.date.clone(),
            internal_date: self.internal_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    pub sender: String,
    pub subject: String,
    pub date: String,
    pub internal_date: i64,
}

/// A selected message with its body, as handed back to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailView {
    pub sender: String,
    pub subject: String,
    pub date: String,
    pub body: String,
}

/// Newest first. Ties keep their fetch order.
pub fn sort_newest_first(emails: &mut [EmailRecord]) {
    emails.sort_by(|a, b| b.internal_date.cmp(&a.internal_date));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: EmailId, internal_date: i64) -> EmailRecord {
        EmailRecord {
            id,
            sender: format!("sender{id}@example.com"),
            subject: format!("subject {id}"),
            date: String::new(),
            internal_date,
            body: None,
        }
    }

    #[test]
    fn sorts_by_internal_date_descending() {
        let mut emails = vec![record(1, 100), record(2, 300), record(3, 200)];
        sort_newest_first(&mut emails);
        let ids: Vec<_> = emails.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn summary_drops_body() {
        let mut e = record(7, 42);
        e.body = Some("hello".into());
        let json = serde_json::to_value(e.summary()).unwrap();
        assert_eq!(json["internal_date"], 42);
        assert!(json.get("body").is_none());
    }
}
