//! The notification value extracted from a Bugzilla mail.

use std::fmt;

/// The kind of event a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// A bug was filed.
    NewReport,
    /// A bug was closed or resolved.
    ClosedReport,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::NewReport => write!(f, "new"),
            NotificationKind::ClosedReport => write!(f, "closed"),
        }
    }
}

/// A fully parsed notification, ready to be announced.
///
/// Only the two constructors create values, so a notification always has a
/// non-empty `id` and `summary`, and an actor exactly when it is a closed report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    kind: NotificationKind,
    id: String,
    summary: String,
    actor: Option<String>,
}

impl Notification {
    /// Creates a notification for a newly filed bug.
    pub(crate) fn new_report(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::NewReport,
            id: id.into(),
            summary: summary.into(),
            actor: None,
        }
    }

    /// Creates a notification for a bug closed by `actor`.
    pub(crate) fn closed_report(id: impl Into<String>, summary: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::ClosedReport,
            id: id.into(),
            summary: summary.into(),
            actor: Some(actor.into()),
        }
    }

    pub fn kind(&self) -> NotificationKind {
        self.kind
    }

    /// The bug number, kept as text.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Who closed the bug; `None` for new reports.
    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// The message that is broadcast to the channel.
    pub fn rendered_message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.actor) {
            (NotificationKind::ClosedReport, Some(actor)) => {
                write!(f, "Bug number {} about '{}' was closed by {}! Yay!", self.id, self.summary, actor)
            }
            _ => write!(
                f,
                "We have new bug! It's number is {} and it is about '{}'. Who is up for the challenge?",
                self.id, self.summary
            ),
        }
    }
}

// Tests.
