#![allow(dead_code)]

use anyhow::{Result, anyhow};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

use policy_chat::domain::email::{EmailId, EmailRecord};
use policy_chat::domain::policy::Policy;
use policy_chat::domain::user::UserRecord;
use policy_chat::extract::{self, DocumentExtractor, Extraction, TextExtractor};
use policy_chat::llm::{ChatMessage, FragmentStream, ModelClient, TurnRequest};
use policy_chat::mail::{DateRange, MailConnector, MailService};
use policy_chat::session::ChatService;
use policy_chat::store::repo::UserStore;
use policy_chat::store::sqlite::SqliteUserStore;

pub const AUTO: &str = "Auto - Northwind Mutual";
pub const RENTERS: &str = "Renters - Harbor Insurance";
pub const BROKEN: &str = "Umbrella - Lost Scan";

/// One scripted model call.
pub enum Script {
    Fragments(Vec<Result<&'static str, &'static str>>),
    FailToStart,
}

impl Script {
    pub fn text(parts: &[&'static str]) -> Self {
        Script::Fragments(parts.iter().map(|p| Ok(*p)).collect())
    }
}

/// What the model was asked.
#[derive(Debug, Clone)]
pub struct Seen {
    pub preamble: String,
    pub policy_content: String,
    pub history: Vec<ChatMessage>,
    pub input: String,
}

pub struct FakeModel {
    scripts: Rc<RefCell<VecDeque<Script>>>,
    seen: Rc<RefCell<Vec<Seen>>>,
}

impl ModelClient for FakeModel {
    fn stream<'a>(&'a self, request: &TurnRequest<'_>) -> Result<FragmentStream<'a>> {
        self.seen.borrow_mut().push(Seen {
            preamble: request.preamble(),
            policy_content: request.policy_content.to_string(),
            history: request.history.to_vec(),
            input: request.input.to_string(),
        });
        match self.scripts.borrow_mut().pop_front() {
            Some(Script::FailToStart) => Err(anyhow!("connection refused")),
            Some(Script::Fragments(items)) => Ok(Box::new(
                items
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(|e| anyhow!(e))),
            )),
            None => Ok(Box::new(std::iter::empty())),
        }
    }
}

/// Real text extraction with a call counter.
pub struct CountingExtractor {
    calls: Rc<Cell<usize>>,
}

impl DocumentExtractor for CountingExtractor {
    fn extract(&self, source: &Path, dest: &Path) -> extract::Result<Extraction> {
        self.calls.set(self.calls.get() + 1);
        TextExtractor.extract(source, dest)
    }
}

pub struct Message {
    pub id: EmailId,
    pub internal_date: i64,
    pub subject: &'static str,
    pub body: &'static str,
}

#[derive(Default)]
pub struct Mailbox {
    pub messages: Vec<Message>,
    pub connects: usize,
    pub searches: Vec<String>,
    pub body_fetches: Vec<EmailId>,
    /// Metadata for these ids fails to load.
    pub broken: Vec<EmailId>,
    pub fail_bodies: bool,
    pub refuse_connect: bool,
}

pub struct FakeConnector {
    mailbox: Rc<RefCell<Mailbox>>,
}

impl MailConnector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn MailService>> {
        let mut mb = self.mailbox.borrow_mut();
        if mb.refuse_connect {
            return Err(anyhow!("authentication failed"));
        }
        mb.connects += 1;
        Ok(Box::new(FakeMailService {
            mailbox: self.mailbox.clone(),
        }))
    }
}

struct FakeMailService {
    mailbox: Rc<RefCell<Mailbox>>,
}

impl MailService for FakeMailService {
    fn search(&mut self, range: &DateRange) -> Result<Vec<EmailId>> {
        let mut mb = self.mailbox.borrow_mut();
        mb.searches.push(range.imap_query());
        Ok(mb.messages.iter().map(|m| m.id).collect())
    }

    fn metadata(&mut self, id: EmailId) -> Result<EmailRecord> {
        let mb = self.mailbox.borrow();
        if mb.broken.contains(&id) {
            return Err(anyhow!("malformed envelope"));
        }
        let m = mb
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| anyhow!("no message {id}"))?;
        Ok(EmailRecord {
            id,
            sender: format!("Carrier <notices{id}@example.com>"),
            subject: m.subject.to_string(),
            date: format!("Wed, 14 Oct 2026 0{}:00:00 +0000", id % 10),
            internal_date: m.internal_date,
            body: None,
        })
    }

    fn body(&mut self, id: EmailId) -> Result<String> {
        let mut mb = self.mailbox.borrow_mut();
        if mb.fail_bodies {
            return Err(anyhow!("connection reset"));
        }
        mb.body_fetches.push(id);
        mb.messages
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.body.to_string())
            .ok_or_else(|| anyhow!("no message {id}"))
    }
}

/// Always errors.
pub struct FailingStore;

impl UserStore for FailingStore {
    fn find_user(&self, _user_id: &str) -> Result<Option<UserRecord>> {
        Err(anyhow!("database is locked"))
    }
    fn upsert_user(&self, _user: &UserRecord) -> Result<()> {
        Err(anyhow!("database is locked"))
    }
    fn record_extraction(&self, _user_id: &str, _file_id: &str, _text_path: &Path) -> Result<()> {
        Err(anyhow!("database is locked"))
    }
    fn user_ids(&self) -> Result<Vec<String>> {
        Err(anyhow!("database is locked"))
    }
}

pub struct Harness {
    pub service: ChatService,
    pub scripts: Rc<RefCell<VecDeque<Script>>>,
    pub seen: Rc<RefCell<Vec<Seen>>>,
    pub extractions: Rc<Cell<usize>>,
    pub mailbox: Rc<RefCell<Mailbox>>,
    pub dir: TempDir,
}

impl Harness {
    pub fn script(&self, script: Script) {
        self.scripts.borrow_mut().push_back(script);
    }

    /// Runs one query to completion and returns its frames.
    pub fn ask(&mut self, input: &str) -> Vec<String> {
        self.service.handle_query(input).collect()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.borrow().clone()
    }
}

fn policy(dir: &Path, file_id: &str, file: &str, name: &str, kind: &str) -> Policy {
    Policy {
        file_id: file_id.to_string(),
        path: dir.join(file),
        policy_type: kind.to_string(),
        print_name: name.to_string(),
        carrier: name.split(" - ").nth(1).unwrap_or("").to_string(),
        format: file.rsplit('.').next().unwrap_or("").to_string(),
        is_extracted: false,
        extracted_file_path: None,
        additional_metadata: None,
    }
}

pub fn users(dir: &Path) -> Vec<UserRecord> {
    vec![
        UserRecord {
            user_id: "user0".into(),
            first_name: "Avery".into(),
            last_name: "Nguyen".into(),
            policies: vec![],
        },
        UserRecord {
            user_id: "user1".into(),
            first_name: "Jordan".into(),
            last_name: "Patel".into(),
            policies: vec![
                policy(dir, "user1-auto", "auto.md", AUTO, "auto"),
                policy(dir, "user1-renters", "renters.md", RENTERS, "renters"),
            ],
        },
        UserRecord {
            user_id: "user2".into(),
            first_name: "Casey".into(),
            last_name: "Morgan".into(),
            policies: vec![policy(dir, "user2-umbrella", "umbrella.pdf", BROKEN, "umbrella")],
        },
    ]
}

pub fn default_mailbox() -> Mailbox {
    Mailbox {
        messages: vec![
            Message {
                id: 11,
                internal_date: 1_000,
                subject: "Renewal notice",
                body: "Your auto policy renews on January 1.",
            },
            Message {
                id: 12,
                internal_date: 3_000,
                subject: "Claim update",
                body: "Claim 4471 has been approved.",
            },
            Message {
                id: 13,
                internal_date: 2_000,
                subject: "Payment received",
                body: "We received your payment of $84.20.",
            },
        ],
        ..Mailbox::default()
    }
}

pub fn harness_with_store(dir: TempDir, store: Box<dyn UserStore>) -> Harness {
    fs::write(
        dir.path().join("auto.md"),
        "Collision coverage: actual cash value, $500 deductible.\nRental reimbursement: $40 per day.",
    )
    .unwrap();
    fs::write(
        dir.path().join("renters.md"),
        "Personal property: $30,000 replacement cost.",
    )
    .unwrap();

    let scripts = Rc::new(RefCell::new(VecDeque::new()));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let extractions = Rc::new(Cell::new(0));
    let mailbox = Rc::new(RefCell::new(default_mailbox()));

    let service = ChatService::new(
        store,
        Box::new(FakeModel {
            scripts: scripts.clone(),
            seen: seen.clone(),
        }),
        Box::new(CountingExtractor {
            calls: extractions.clone(),
        }),
        Box::new(FakeConnector {
            mailbox: mailbox.clone(),
        }),
    )
    .with_system_prompt("You answer insurance questions.");

    Harness {
        service,
        scripts,
        seen,
        extractions,
        mailbox,
        dir,
    }
}

/// Seeded SQLite store; policy documents live in a temp dir.
pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteUserStore::open_in_memory().unwrap();
    for u in users(dir.path()) {
        store.upsert_user(&u).unwrap();
    }
    harness_with_store(dir, Box::new(store))
}
