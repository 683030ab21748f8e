pub mod state;

use chrono::NaiveDate;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::Path;

use crate::chat::memory::ConversationMemory;
use crate::chat::turn::QueryTurn;
use crate::domain::email::{EmailRecord, EmailSummary, EmailView};
use crate::domain::policy::Policy;
use crate::extract::{self, DocumentExtractor, ExtractionError, ensure_extracted, read_extracted};
use crate::llm::{ChatMessage, ModelClient, POLICY_INSTRUCTIONS, SYSTEM_PROMPT, TurnRequest};
use crate::mail::decoders::preview;
use crate::mail::{DateRange, MailConnector};
use crate::store::repo::UserStore;

pub use state::{PolicySelection, SessionState};

/// Result of a mailbox fetch for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched {
        date: NaiveDate,
        emails: Vec<EmailSummary>,
    },
    Failed(String),
}

impl FetchOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            FetchOutcome::Fetched { date, emails } if emails.is_empty() => json!({
                "success": true,
                "count": 0,
                "message": format!("No emails found for {date}"),
                "emails": [],
            }),
            FetchOutcome::Fetched { date, emails } => json!({
                "success": true,
                "count": emails.len(),
                "message": format!("Fetched {} emails from {date}", emails.len()),
                "emails": emails,
            }),
            FetchOutcome::Failed(error) => json!({ "success": false, "error": error }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected(EmailView),
    Failed(String),
}

impl SelectOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            SelectOutcome::Selected(email) => json!({ "success": true, "email": email }),
            SelectOutcome::Failed(error) => json!({ "success": false, "error": error }),
        }
    }
}

/// Puts the selected message in front of the question.
pub fn with_email_context(email: &EmailRecord, question: &str) -> String {
    format!(
        "[EMAIL CONTEXT]\nFrom: {}\nSubject: {}\nDate: {}\n\nBody:\n{}\n\n[USER QUESTION]\n{question}",
        email.sender,
        email.subject,
        email.date,
        email.body.as_deref().unwrap_or_default(),
    )
}

/// Profile snapshot answered after a focus event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusView<'a> {
    pub success: bool,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub policies: &'a [Policy],
    pub selected_policy: Option<&'a Policy>,
    pub selected_policy_index: Option<usize>,
    pub number_policies: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitView<'a> {
    pub first_name: &'a str,
    pub policies: &'a [Policy],
}

/// The session plus every collaborator a request handler needs.
pub struct ChatService {
    session: SessionState,
    memory: ConversationMemory,
    system_prompt: String,
    store: Box<dyn UserStore>,
    model: Box<dyn ModelClient>,
    extractor: Box<dyn DocumentExtractor>,
    mailer: Box<dyn MailConnector>,
}

impl ChatService {
    pub fn new(
        store: Box<dyn UserStore>,
        model: Box<dyn ModelClient>,
        extractor: Box<dyn DocumentExtractor>,
        mailer: Box<dyn MailConnector>,
    ) -> Self {
        Self {
            session: SessionState::new(),
            memory: ConversationMemory::new(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            store,
            model,
            extractor,
            mailer,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Page activation. Initialises the session once, then resyncs the
    /// profile and policy list from the store on every call.
    pub fn handle_focus(&mut self, user_id: &str, session_id: &str) {
        self.session.user_id = user_id.to_string();
        self.session.session_id = session_id.to_string();

        if !self.session.initialized {
            self.session.initialized = true;
            self.session.clear_selection();
            info!("session {session_id} initialised for user {user_id}");
        }

        match self.store.find_user(user_id) {
            Ok(Some(user)) => {
                self.session.apply_user(user);
                info!(
                    "focus: {} has {} policies",
                    user_id,
                    self.session.number_policies()
                );
            }
            Ok(None) => warn!("user {user_id} not found in store; profile left as is"),
            Err(e) => error!("user store lookup for {user_id} failed: {e:#}"),
        }
    }

    /// Focus again with the ids already on the session.
    pub fn refocus(&mut self) {
        let user_id = self.session.user_id.clone();
        let session_id = self.session.session_id.clone();
        self.handle_focus(&user_id, &session_id);
    }

    pub fn focus_view(&self) -> FocusView<'_> {
        FocusView {
            success: true,
            first_name: &self.session.first_name,
            last_name: &self.session.last_name,
            policies: &self.session.policies,
            selected_policy: self.session.selected_policy(),
            selected_policy_index: self.session.selected,
            number_policies: self.session.number_policies(),
        }
    }

    pub fn init_view(&self) -> InitView<'_> {
        InitView {
            first_name: &self.session.first_name,
            policies: &self.session.policies,
        }
    }

    /// Starts one answer. Frames are produced as the caller pulls them; the
    /// turn lands in memory only if the model stream ends cleanly.
    pub fn handle_query(&mut self, input: &str) -> QueryTurn<'_> {
        info!("query: {}", preview(input, 80));

        let policy_content = match self.prepare_policy_context() {
            Ok(content) => content,
            Err(e) => {
                error!("policy text unavailable: {e}");
                return QueryTurn::failed();
            }
        };
        let instructions = if policy_content.is_some() {
            POLICY_INSTRUCTIONS
        } else {
            ""
        };
        let policy_content = policy_content.unwrap_or_default();
        let history = self.memory.for_model();
        let input = match self.session.current_email() {
            Some(email) if email.body.is_some() => with_email_context(email, input),
            _ => input.to_string(),
        };

        let request = TurnRequest {
            system: &self.system_prompt,
            policy_instructions: instructions,
            policy_content: &policy_content,
            history: &history,
            input: &input,
        };

        match self.model.stream(&request) {
            Ok(fragments) => QueryTurn::streaming(input, fragments, &mut self.memory),
            Err(e) => {
                error!("model call failed to start: {e:#}");
                QueryTurn::failed()
            }
        }
    }

    /// Text of the selected policy, extracting it first if needed.
    fn prepare_policy_context(&mut self) -> extract::Result<Option<String>> {
        let Some(policy) = self.session.selected_policy_mut() else {
            return Ok(None);
        };

        let fresh = ensure_extracted(policy, self.extractor.as_ref())?;
        let text_path = policy
            .extracted_text()
            .map(Path::to_path_buf)
            .ok_or_else(|| ExtractionError::NotFound(policy.path.clone()))?;
        let file_id = policy.file_id.clone();

        let content = read_extracted(&text_path)?;

        if fresh
            && let Err(e) =
                self.store
                    .record_extraction(&self.session.user_id, &file_id, &text_path)
        {
            warn!("couldn't record extraction of {file_id}: {e:#}");
        }
        Ok(Some(content))
    }

    /// `None` clears the selection.
    pub fn select_policy(&mut self, print_name: Option<&str>) -> PolicySelection {
        self.session.select_policy(print_name)
    }

    pub fn clear_conversation(&mut self) {
        self.memory.clear();
        self.session.clear_selection();
        info!("conversation cleared for {}", self.session.user_id);
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.memory.messages()
    }

    /// Metadata of every message received on `date`, newest first. Bodies are
    /// left for `select_email`.
    pub fn fetch_emails(&mut self, date: NaiveDate) -> FetchOutcome {
        let mut service = match self.mailer.connect() {
            Ok(s) => s,
            Err(e) => {
                error!("mail connect failed: {e:#}");
                return FetchOutcome::Failed(format!("{e:#}"));
            }
        };

        let ids = match service.search(&DateRange::single_day(date)) {
            Ok(ids) => ids,
            Err(e) => {
                error!("mail search for {date} failed: {e:#}");
                return FetchOutcome::Failed(format!("{e:#}"));
            }
        };

        let mut emails = Vec::with_capacity(ids.len());
        for id in ids {
            match service.metadata(id) {
                Ok(record) => emails.push(record),
                Err(e) => warn!("skipping message {id}: {e:#}"),
            }
        }

        self.session.replace_emails(emails, service);
        info!(
            "fetched {} emails for {date}",
            self.session.fetched_emails.len()
        );
        FetchOutcome::Fetched {
            date,
            emails: self
                .session
                .fetched_emails
                .iter()
                .map(EmailRecord::summary)
                .collect(),
        }
    }

    /// Loads the body on first selection and keeps it for later ones.
    pub fn select_email(&mut self, index: i64) -> SelectOutcome {
        let session = &mut self.session;
        if session.fetched_emails.is_empty() {
            return SelectOutcome::Failed("No emails fetched".to_string());
        }
        let Some(i) = usize::try_from(index)
            .ok()
            .filter(|i| *i < session.fetched_emails.len())
        else {
            return SelectOutcome::Failed("Invalid email index".to_string());
        };

        let email = &mut session.fetched_emails[i];
        if email.body.is_none() {
            let Some(mail) = session.mail.as_mut() else {
                return SelectOutcome::Failed("Mail service not connected".to_string());
            };
            match mail.body(email.id) {
                Ok(body) => email.body = Some(body),
                Err(e) => {
                    error!("body fetch for message {} failed: {e:#}", email.id);
                    return SelectOutcome::Failed(format!("Error fetching body: {e:#}"));
                }
            }
        }

        let view = EmailView {
            sender: email.sender.clone(),
            subject: email.subject.clone(),
            date: email.date.clone(),
            body: email.body.clone().unwrap_or_default(),
        };
        session.current_email = Some(i);
        SelectOutcome::Selected(view)
    }
}
