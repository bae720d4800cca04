//! Answer formatting.
//!
//! Appends a terminal period to the generated answer when it lacks sentence
//! punctuation, then attaches the citations in one of three styles:
//!
//! | Style | Output |
//! |-------|--------|
//! | `brace` | `Answer. {a.pdf, b.pdf}` (distinct filenames, alphabetical) |
//! | `annotated` | `Answer. {a.pdf — Agency: X; Title: Y; Law: Z; b.pdf — ...}` |
//! | `footnotes` | `Answer.[1][2]` followed by a linked **Sources** block |
//!
//! When the answer is empty, the citation block is returned on its own.

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::aws::uri_encode;
use crate::models::Reference;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationStyle {
    #[default]
    Brace,
    Annotated,
    Footnotes,
}

impl std::fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CitationStyle::Brace => "brace",
            CitationStyle::Annotated => "annotated",
            CitationStyle::Footnotes => "footnotes",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct AnswerFormatter {
    style: CitationStyle,
    link_base_url: String,
}

impl AnswerFormatter {
    pub fn new(style: CitationStyle, link_base_url: impl Into<String>) -> Self {
        Self {
            style,
            link_base_url: link_base_url.into(),
        }
    }

    pub fn style(&self) -> CitationStyle {
        self.style
    }

    /// Format `answer` with its deduplicated `refs`.
    pub fn format(&self, answer: &str, refs: &[Reference]) -> String {
        let answer = punctuate(answer);
        if refs.is_empty() {
            return answer;
        }
        match self.style {
            CitationStyle::Brace => brace(&answer, refs),
            CitationStyle::Annotated => annotated(&answer, refs),
            CitationStyle::Footnotes => self.footnotes(&answer, refs),
        }
    }

    /// Public link for a cited file.
    pub fn link_for(&self, filename: &str) -> String {
        format!("{}{}", self.link_base_url, uri_encode(filename))
    }

    fn footnotes(&self, answer: &str, refs: &[Reference]) -> String {
        let entries: Vec<&Reference> = refs.iter().filter(|r| r.label().is_some()).collect();
        if entries.is_empty() {
            return answer.to_string();
        }

        let mut sources = String::from("**Sources**\n");
        for (i, r) in entries.iter().enumerate() {
            let n = i + 1;
            let line = match r.filename.as_deref() {
                Some(name) => format!("[{}] [{}]({})", n, name, self.link_for(name)),
                None => format!("[{}] {}", n, r.label().unwrap_or_default()),
            };
            sources.push_str(&line);
            match (r.title.as_deref(), r.agency.as_deref()) {
                (Some(title), Some(agency)) if title != agency => {
                    sources.push_str(&format!(" — **{}** / {}", title, agency));
                }
                (Some(title), _) => sources.push_str(&format!(" — **{}**", title)),
                (None, Some(agency)) => sources.push_str(&format!(" — {}", agency)),
                (None, None) => {}
            }
            sources.push('\n');
        }
        let sources = sources.trim_end().to_string();

        if answer.is_empty() {
            return sources;
        }
        let markers: String = (1..=entries.len()).map(|n| format!("[{}]", n)).collect();
        format!("{}{}\n\n{}", answer, markers, sources)
    }
}

/// Trim trailing whitespace and end the answer with sentence punctuation.
pub fn punctuate(answer: &str) -> String {
    let trimmed = answer.trim_end();
    match trimmed.chars().last() {
        None => String::new(),
        Some('.' | '!' | '?') => trimmed.to_string(),
        Some(_) => format!("{}.", trimmed),
    }
}

fn attach(answer: &str, block: &str) -> String {
    if answer.is_empty() {
        block.to_string()
    } else {
        format!("{} {}", answer, block)
    }
}

fn brace(answer: &str, refs: &[Reference]) -> String {
    let names: BTreeSet<&str> = refs.iter().filter_map(|r| r.filename.as_deref()).collect();
    if names.is_empty() {
        return answer.to_string();
    }
    let list = names.into_iter().collect::<Vec<_>>().join(", ");
    attach(answer, &format!("{{{}}}", list))
}

fn annotated(answer: &str, refs: &[Reference]) -> String {
    let entries: Vec<String> = refs
        .iter()
        .filter_map(|r| {
            let label = r.label()?;
            let fields: Vec<String> = [
                ("Agency", r.agency.as_deref()),
                ("Title", r.title.as_deref()),
                ("Law", r.law.as_deref()),
            ]
            .iter()
            .filter_map(|(name, value)| value.map(|v| format!("{}: {}", name, v)))
            .collect();
            if fields.is_empty() {
                Some(label.to_string())
            } else {
                Some(format!("{} — {}", label, fields.join("; ")))
            }
        })
        .collect();
    if entries.is_empty() {
        return answer.to_string();
    }
    attach(answer, &format!("{{{}}}", entries.join("; ")))
}
