use chrono::{Local, NaiveDate};
use log::warn;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::chat::turn::QueryTurn;
use crate::session::{ChatService, PolicySelection};

/// Sentinel the browser sends to deselect the current policy.
pub const NO_POLICY: &str = "None";

/// What the transport should write back for one request.
pub enum Reply<'a> {
    Json { status: u16, body: Value },
    Events(QueryTurn<'a>),
    File(PathBuf),
    NoContent,
    NotFound,
}

impl Reply<'_> {
    fn ok(body: Value) -> Self {
        Reply::Json { status: 200, body }
    }

    fn failure(status: u16, error: impl Into<String>) -> Self {
        Reply::Json {
            status,
            body: json!({ "success": false, "error": error.into() }),
        }
    }

    fn serialized<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Reply::ok(body),
            Err(e) => Reply::failure(500, e.to_string()),
        }
    }
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub fn dispatch<'a>(service: &'a mut ChatService, web_root: &Path, raw_url: &str) -> Reply<'a> {
    let Ok(url) = Url::parse(&format!("http://localhost{raw_url}")) else {
        return Reply::NotFound;
    };

    match url.path() {
        "/" | "//" => Reply::File(web_root.join("home.html")),
        "/script.js" => Reply::File(web_root.join("script.js")),
        "/favicon.ico" => Reply::NoContent,

        "/api/init" => Reply::serialized(&service.init_view()),

        "/api/chat" => {
            let message = query_param(&url, "message").unwrap_or_default();
            Reply::Events(service.handle_query(&message))
        }

        "/api/select_policy" => {
            let Some(policy) = query_param(&url, "policy").filter(|p| !p.is_empty()) else {
                return Reply::failure(400, "No policy specified");
            };
            let name = (policy != NO_POLICY).then_some(policy.as_str());
            match service.select_policy(name) {
                PolicySelection::Selected { .. } | PolicySelection::Cleared => {
                    Reply::ok(json!({ "success": true, "selected_policy": policy }))
                }
                PolicySelection::NotFound => {
                    Reply::failure(404, format!("No policy named '{policy}'"))
                }
            }
        }

        "/api/clear" => {
            service.clear_conversation();
            Reply::ok(json!({ "success": true }))
        }

        "/api/get_conversation_history" => Reply::ok(json!({ "history": service.history() })),

        "/api/handle_focus" => {
            service.refocus();
            Reply::serialized(&service.focus_view())
        }

        "/api/fetch_emails" => {
            let date = match query_param(&url, "date").filter(|d| !d.is_empty()) {
                None => Local::now().date_naive(),
                Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                    Ok(d) => d,
                    Err(_) => {
                        warn!("bad date parameter '{raw}'");
                        return Reply::failure(200, format!("Invalid date '{raw}', expected YYYY-MM-DD"));
                    }
                },
            };
            Reply::ok(service.fetch_emails(date).to_json())
        }

        "/api/select_email" => {
            let raw = query_param(&url, "index").unwrap_or_else(|| "0".to_string());
            match raw.trim().parse::<i64>() {
                Ok(index) => Reply::ok(service.select_email(index).to_json()),
                Err(_) => Reply::failure(200, "Invalid index parameter"),
            }
        }

        other => static_file(web_root, other),
    }
}

/// A file under `web_root`; anything that would climb out of it is refused.
fn static_file(web_root: &Path, path: &str) -> Reply<'static> {
    let rel = Path::new(path.trim_start_matches('/'));
    if rel.as_os_str().is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return Reply::NotFound;
    }
    let full = web_root.join(rel);
    if full.is_file() {
        Reply::File(full)
    } else {
        Reply::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_paths_stay_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("chatbot.html"), "<html></html>").unwrap();

        assert!(matches!(
            static_file(dir.path(), "/chatbot.html"),
            Reply::File(p) if p == dir.path().join("chatbot.html")
        ));
        assert!(matches!(static_file(dir.path(), "/missing.css"), Reply::NotFound));
        assert!(matches!(static_file(dir.path(), "/../etc/passwd"), Reply::NotFound));
        assert!(matches!(static_file(dir.path(), "/"), Reply::NotFound));
    }

    #[test]
    fn query_params_are_decoded() {
        let url = Url::parse("http://localhost/api/chat?message=what%27s+my+deductible%3F").unwrap();
        assert_eq!(
            query_param(&url, "message").as_deref(),
            Some("what's my deductible?")
        );
        assert_eq!(query_param(&url, "policy"), None);
    }
}
