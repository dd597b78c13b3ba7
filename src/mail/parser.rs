//! Extraction of notifications from raw Bugzilla mail.
//!
//! A mail is classified by an ordered set of rules (first match wins):
//! - mails outside the tracked classification are ignored;
//! - a status change to `CLOSED`/`RESOLVED` becomes a closed report;
//! - a newly filed bug becomes a new report;
//! - anything else is ignored.
//!
//! Only a mail that was classified but lacks the fields its rule needs is an
//! error; everything else that does not match is simply "nothing to announce".

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::notification::{Notification, NotificationKind};
use crate::base::types::Res;

/// Default classification whose mails are announced.
pub const DEFAULT_CLASSIFICATION: &str = "openSUSE";

/// Default Bugzilla instance that sends the mails.
pub const DEFAULT_TRACKER_BASE_URL: &str = "https://bugzilla.novell.com";

static CHANGED_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^X-Bugzilla-Type: changed").expect("Invalid changed type regex"));

static STATUS_RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^X-Bugzilla-Changed-Fields: Status Resolution").expect("Invalid changed fields regex"));

static CLOSED_STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^X-Bugzilla-Status: (?:CLOSED|RESOLVED)").expect("Invalid status regex"));

static NEW_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^X-Bugzilla-Type: new").expect("Invalid new type regex"));

static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^Subject: .Bug ([0-9]+). (.+)").expect("Invalid subject regex"));

static NEW_SUBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Subject: .Bug ([0-9]+). New: (.+)").expect("Invalid new subject regex"));

static FOLDED_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]+").expect("Invalid folding regex"));

// Errors.

/// A mail that was classified as an announcement but is missing a field the
/// announcement needs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedNotification {
    /// No `Subject:` line of the expected shape.
    #[error("{kind} bug mail has no usable subject line")]
    MissingSubject { kind: NotificationKind },
    /// No `<name> <<email>> changed:` passage after the bug URL.
    #[error("closed bug mail for bug {id} does not name who closed it")]
    MissingActor { id: String },
}

// Types.

/// The shape a mail was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailShape {
    /// Not part of the tracked classification.
    Ineligible,
    /// A bug was closed or resolved.
    Closed,
    /// A bug was filed.
    New,
    /// Part of the classification, but no announcement rule applies.
    Unrecognized,
}

/// Parser for Bugzilla notification mails.
///
/// Holds only immutable, precompiled state and can be shared freely between
/// connection handlers.
#[derive(Debug, Clone)]
pub struct MailParser {
    classification_marker: String,
    actor_re: Regex,
}

impl Default for MailParser {
    fn default() -> Self {
        Self::new(DEFAULT_CLASSIFICATION, DEFAULT_TRACKER_BASE_URL).expect("Default mail parser must compile")
    }
}

impl MailParser {
    /// Creates a parser for mails of `classification` sent by the Bugzilla at `tracker_base_url`.
    pub fn new(classification: &str, tracker_base_url: &str) -> Res<Self> {
        let classification_marker = format!("X-Bugzilla-Classification: {classification}");

        let show_bug_url = format!("{}/show_bug.cgi", tracker_base_url.trim_end_matches('/'));
        let actor_re = Regex::new(&format!(r"{}.*\n\n\n(.+) <[^>]*> changed:\n", regex::escape(&show_bug_url)))?;

        Ok(Self { classification_marker, actor_re })
    }

    /// Parses a raw mail into a notification.
    ///
    /// Returns `Ok(None)` when the mail is not something to announce.
    pub fn parse(&self, text: &str) -> Result<Option<Notification>, MalformedNotification> {
        let text = normalize(text);

        match self.classify(&text) {
            MailShape::Ineligible | MailShape::Unrecognized => Ok(None),
            MailShape::Closed => {
                let (id, summary) = capture_subject(&SUBJECT_RE, &text).ok_or(MalformedNotification::MissingSubject {
                    kind: NotificationKind::ClosedReport,
                })?;

                let actor = self
                    .actor_re
                    .captures(&text)
                    .map(|c| c[1].trim().to_string())
                    .filter(|actor| !actor.is_empty())
                    .ok_or_else(|| MalformedNotification::MissingActor { id: id.clone() })?;

                Ok(Some(Notification::closed_report(id, summary, actor)))
            }
            MailShape::New => {
                let (id, summary) = capture_subject(&NEW_SUBJECT_RE, &text).ok_or(MalformedNotification::MissingSubject {
                    kind: NotificationKind::NewReport,
                })?;

                Ok(Some(Notification::new_report(id, summary)))
            }
        }
    }

    /// Decides which rule a (normalized) mail falls under.
    pub fn classify(&self, text: &str) -> MailShape {
        if !text.contains(&self.classification_marker) {
            return MailShape::Ineligible;
        }

        if CHANGED_TYPE_RE.is_match(text) && STATUS_RESOLUTION_RE.is_match(text) && CLOSED_STATUS_RE.is_match(text) {
            return MailShape::Closed;
        }

        if NEW_TYPE_RE.is_match(text) {
            return MailShape::New;
        }

        MailShape::Unrecognized
    }
}

/// Parses `text` with the default openSUSE parser.
pub fn parse(text: &str) -> Result<Option<Notification>, MalformedNotification> {
    static DEFAULT_PARSER: LazyLock<MailParser> = LazyLock::new(MailParser::default);

    DEFAULT_PARSER.parse(text)
}

// Helpers.

/// Normalizes line endings and unfolds continuation lines in the header block.
///
/// Without a blank line there is no telling headers from body, so nothing is unfolded.
fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n");

    match text.split_once("\n\n") {
        Some((headers, body)) => format!("{}\n\n{}", FOLDED_LINE_RE.replace_all(headers, " "), body),
        None => text,
    }
}

/// Captures the bug id and title from a subject line.
fn capture_subject(re: &Regex, text: &str) -> Option<(String, String)> {
    let captures = re.captures(text)?;
    let id = captures[1].to_string();
    let summary = captures[2].trim_end().to_string();

    if summary.is_empty() {
        return None;
    }

    Some((id, summary))
}

// Tests.
