use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A single message submitted for dispatch.
///
/// Messages are immutable once built. The `id` doubles as the idempotency
/// key, so two messages sharing an id are treated as the same message no
/// matter what the rest of their content is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    id: String,
    recipient: String,
    subject: String,
    body: String,
}

impl Message {
    /// Build a message with a freshly generated, unique identifier.
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::with_id(ulid::Ulid::new().to_string(), recipient, subject, body)
    }

    /// Build a message with a caller-chosen identifier.
    #[must_use]
    pub fn with_id(
        id: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {:?}", self.id, self.recipient, self.subject)
    }
}
