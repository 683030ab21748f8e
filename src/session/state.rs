use log::{debug, warn};

use crate::domain::email::{EmailRecord, sort_newest_first};
use crate::domain::policy::Policy;
use crate::domain::user::UserRecord;
use crate::mail::MailService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySelection {
    Cleared,
    Selected { index: usize },
    NotFound,
}

/// Everything the server remembers about the one active user.
#[derive(Default)]
pub struct SessionState {
    pub user_id: String,
    pub session_id: String,
    pub initialized: bool,

    pub first_name: String,
    pub last_name: String,

    pub policies: Vec<Policy>,
    /// Index into `policies`; `None` when no policy is in context.
    pub selected: Option<usize>,

    /// Newest first.
    pub fetched_emails: Vec<EmailRecord>,
    pub current_email: Option<usize>,
    /// Kept from the last fetch for lazy body loads.
    pub mail: Option<Box<dyn MailService>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_policies(&self) -> usize {
        self.policies.len()
    }

    pub fn selected_policy(&self) -> Option<&Policy> {
        self.policies.get(self.selected?)
    }

    pub fn selected_policy_mut(&mut self) -> Option<&mut Policy> {
        self.policies.get_mut(self.selected?)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// `None` clears. A name that matches no policy leaves the selection as it was.
    pub fn select_policy(&mut self, print_name: Option<&str>) -> PolicySelection {
        let Some(name) = print_name else {
            self.clear_selection();
            return PolicySelection::Cleared;
        };

        match self.policies.iter().position(|p| p.print_name == name) {
            Some(index) => {
                self.selected = Some(index);
                debug!("selected policy {index}: {name}");
                PolicySelection::Selected { index }
            }
            None => {
                warn!("no policy named '{name}' for user {}", self.user_id);
                PolicySelection::NotFound
            }
        }
    }

    /// Copies profile fields and rebuilds the policy list from the store record.
    pub fn apply_user(&mut self, user: UserRecord) {
        self.first_name = user.first_name;
        self.last_name = user.last_name;
        self.policies = user.policies;
        if !self.policies.is_empty() {
            self.clear_selection();
        }
    }

    pub fn replace_emails(&mut self, mut emails: Vec<EmailRecord>, mail: Box<dyn MailService>) {
        sort_newest_first(&mut emails);
        self.current_email = if emails.is_empty() { None } else { Some(0) };
        self.fetched_emails = emails;
        self.mail = Some(mail);
    }

    pub fn current_email(&self) -> Option<&EmailRecord> {
        self.fetched_emails.get(self.current_email?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn policy(name: &str) -> Policy {
        Policy {
            file_id: format!("{name}-id"),
            path: PathBuf::from(format!("docs/{name}.pdf")),
            policy_type: "auto".into(),
            print_name: name.into(),
            carrier: "Acme".into(),
            format: "pdf".into(),
            is_extracted: false,
            extracted_file_path: None,
            additional_metadata: None,
        }
    }

    fn with_policies(names: &[&str]) -> SessionState {
        let mut s = SessionState::new();
        s.policies = names.iter().map(|n| policy(n)).collect();
        s
    }

    #[test]
    fn exact_name_selects_matching_index() {
        let mut s = with_policies(&["Auto", "Home", "Renters"]);
        assert_eq!(
            s.select_policy(Some("Home")),
            PolicySelection::Selected { index: 1 }
        );
        assert_eq!(s.selected_policy().unwrap().print_name, "Home");
    }

    #[test]
    fn unknown_name_keeps_previous_selection() {
        let mut s = with_policies(&["Auto", "Home"]);
        s.select_policy(Some("Auto"));
        assert_eq!(s.select_policy(Some("home")), PolicySelection::NotFound);
        assert_eq!(s.selected, Some(0));
    }

    #[test]
    fn none_clears() {
        let mut s = with_policies(&["Auto"]);
        s.select_policy(Some("Auto"));
        assert_eq!(s.select_policy(None), PolicySelection::Cleared);
        assert!(s.selected_policy().is_none());
    }

    #[test]
    fn empty_user_record_keeps_selection() {
        let mut s = with_policies(&["Auto"]);
        s.selected = Some(0);
        s.apply_user(UserRecord {
            user_id: "u".into(),
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            policies: vec![],
        });
        assert_eq!(s.number_policies(), 0);
        assert_eq!(s.selected, Some(0));
        assert!(s.selected_policy().is_none());
    }
}
