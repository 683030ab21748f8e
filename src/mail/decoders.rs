/// Decodes an RFC 2047 header value; falls back to lossy UTF-8.
pub fn decode_header_value(raw: &[u8]) -> String {
    // mailparse wants a whole "Key: value" line
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw);
    line.extend_from_slice(b"\r\n");

    match mailparse::parse_header(&line) {
        Ok((h, _idx)) => h.get_value(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

pub fn decode_subject(raw: &[u8]) -> String {
    let s = decode_header_value(raw);
    let s = s.trim();
    if s.is_empty() {
        "(no subject)".to_string()
    } else {
        s.to_string()
    }
}

/// `Name <mailbox@host>`, or whichever parts exist.
pub fn format_sender(name: Option<&[u8]>, mailbox: Option<&[u8]>, host: Option<&[u8]>) -> String {
    let name = name
        .map(decode_header_value)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let address = match (mailbox, host) {
        (Some(m), Some(h)) => Some(format!(
            "{}@{}",
            String::from_utf8_lossy(m),
            String::from_utf8_lossy(h)
        )),
        (Some(m), None) => Some(String::from_utf8_lossy(m).into_owned()),
        _ => None,
    };

    match (name, address) {
        (Some(n), Some(a)) => format!("{n} <{a}>"),
        (Some(n), None) => n,
        (None, Some(a)) => a,
        (None, None) => "(unknown)".to_string(),
    }
}

/// Single-line preview, at most `max_chars` characters.
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
        if out.chars().count() > max_chars {
            break;
        }
    }
    if out.chars().count() > max_chars {
        let mut cut: String = out.chars().take(max_chars).collect();
        cut.push_str("...");
        return cut;
    }
    out
}

/// Best-effort plain text of a raw RFC 822 message.
pub fn body_text(raw_rfc822: &[u8]) -> String {
    match mailparse::parse_mail(raw_rfc822) {
        Ok(parsed) => text_part(&parsed).unwrap_or_else(|| {
            parsed
                .get_body()
                .unwrap_or_else(|_| String::from_utf8_lossy(raw_rfc822).into_owned())
        }),
        Err(_) => String::from_utf8_lossy(raw_rfc822).into_owned(),
    }
}

fn text_part(p: &mailparse::ParsedMail) -> Option<String> {
    let mime = p.ctype.mimetype.to_ascii_lowercase();
    if mime == "text/plain" {
        return p.get_body().ok();
    }

    for sp in &p.subparts {
        if let Some(t) = text_part(sp) {
            return Some(t);
        }
    }

    // no plain part anywhere below; take html
    if mime == "text/html"
        && let Ok(html) = p.get_body()
    {
        return Some(html2text::from_read(html.as_bytes(), 100).unwrap_or(html));
    }

    None
}
