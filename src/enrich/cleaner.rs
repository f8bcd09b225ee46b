//! Local text cleaner
//!
//! Deterministic normalization of page and OCR text. [`clean_text`] never
//! fails and is idempotent: `clean_text(&clean_text(s)) == clean_text(s)`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Upper bound on full passes; real inputs settle after one
const MAX_PASSES: usize = 8;

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(amp|lt|gt|quot|apos|nbsp|#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6});")
        .expect("valid entity pattern")
});

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://\S+|[\w.%+-]+@[\w-]+(?:\.[\w-]+)*\.[A-Za-z]{2,}")
        .expect("valid link pattern")
});

static BULLET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:[-*+](?:\s+|$)|[•●○◦▪▫■□►▸▶‣⁃∙·◆◇★☆✓✔➤➢»]\s*)+")
        .expect("valid bullet pattern")
});

static TABLE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:?-+:?$").expect("valid separator pattern"));

/// Cleans text for storage and scoring
///
/// - strips markup tags and decodes common entities
/// - drops control characters other than newline and tab
/// - pads URLs and email addresses with a leading space
/// - strips leading bullet and decoration glyphs per line
/// - flattens pipe tables into one line per cell
/// - removes isolated symbol runs such as `---` or `★★★`
/// - collapses whitespace and keeps at most one blank line in a row
pub fn clean_text(input: &str) -> String {
    let mut current = clean_once(input);
    for _ in 1..MAX_PASSES {
        let next = clean_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean_once(input: &str) -> String {
    let text = input.replace("\r\n", "\n").replace('\r', "\n");
    let text = strip_markup(&text);
    let text: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    let text = pad_links(&text);
    let text = clean_lines(&text);
    layout(&text)
}

/// Decodes entities and strips tags until neither changes anything
///
/// Each round that changes the text makes it shorter, so this terminates.
fn strip_markup(input: &str) -> String {
    let mut text = input.to_string();
    loop {
        let decoded = ENTITY.replace_all(&text, decode_entity);
        let stripped = TAG.replace_all(&decoded, "").into_owned();
        if stripped == text {
            return text;
        }
        text = stripped;
    }
}

fn decode_entity(caps: &Captures<'_>) -> String {
    let name = &caps[1];
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                name[1..].parse::<u32>().ok()
            };
            match code.map(char::from_u32) {
                Some(Some('\0')) => return String::new(),
                Some(c) => c,
                None => None,
            }
        }
    };

    match decoded {
        Some(c) => c.to_string(),
        None => caps[0].to_string(),
    }
}

fn pad_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for m in LINK.find_iter(text) {
        out.push_str(&text[last..m.start()]);
        let glued = text[..m.start()]
            .chars()
            .next_back()
            .map_or(false, |c| !c.is_whitespace());
        if glued {
            out.push(' ');
        }
        out.push_str(m.as_str());
        last = m.end();
    }

    out.push_str(&text[last..]);
    out
}

fn is_symbol_token(token: &str) -> bool {
    if token.chars().any(char::is_alphanumeric) {
        return false;
    }
    // A lone ASCII symbol ("-", "&", "$") usually carries meaning
    token.chars().count() >= 2 || token.chars().any(|c| !c.is_ascii())
}

fn table_cells(line: &str) -> Option<Vec<&str>> {
    let trimmed = line.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('|') || !trimmed.ends_with('|') {
        return None;
    }
    Some(
        trimmed[1..trimmed.len() - 1]
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect(),
    )
}

fn clean_lines(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();

    for line in text.split('\n') {
        let line = BULLET.replace(line, "");

        let parts: Vec<&str> = match table_cells(&line) {
            Some(cells) if !cells.is_empty() && cells.iter().all(|c| TABLE_SEPARATOR.is_match(c)) => {
                continue;
            }
            Some(cells) => cells,
            None => vec![&*line],
        };

        for part in parts {
            let kept: Vec<&str> = part
                .split_whitespace()
                .filter(|token| !is_symbol_token(token))
                .collect();
            out.push(kept.join(" "));
        }
    }

    out.join("\n")
}

fn layout(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = false;

    for line in text.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let blank = collapsed.is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        lines.push(collapsed);
    }

    lines.join("\n").trim().to_string()
}
