//! Queue item data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use outbox_common::{Error, ItemId, Method, Result};

/// A deferred mutating operation awaiting replay.
///
/// Persisted as one element of the JSON array stored under the queue key.
/// Unknown fields are ignored on read so older builds can load newer queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Unique, increasing identifier assigned at enqueue time.
    pub id: ItemId,
    /// Target URL.
    pub url: String,
    /// Mutating verb.
    pub method: Method,
    /// What to send, tagged by `kind`.
    #[serde(flatten)]
    pub payload: Payload,
    /// When the operation was deferred.
    pub enqueued_at: DateTime<Utc>,
}

/// Payload of a queued operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Payload {
    /// Field values captured from a form at submit time.
    FormSubmission { fields: BTreeMap<String, String> },
    /// A programmatic network call, replayed verbatim.
    RawRequest {
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default, with = "body_base64")]
        body: Option<Vec<u8>>,
    },
}

/// Discriminant of [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    FormSubmission,
    RawRequest,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::FormSubmission => f.write_str("form-submission"),
            ItemKind::RawRequest => f.write_str("raw-request"),
        }
    }
}

impl Payload {
    /// Form payload from field/value pairs.
    pub fn form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Payload::FormSubmission {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Raw request payload.
    pub fn raw(headers: BTreeMap<String, String>, body: Option<Vec<u8>>) -> Self {
        Payload::RawRequest { headers, body }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Payload::FormSubmission { .. } => ItemKind::FormSubmission,
            Payload::RawRequest { .. } => ItemKind::RawRequest,
        }
    }
}

impl QueueItem {
    /// Create a queue item.
    ///
    /// # Errors
    /// - `url` is empty
    /// - `method` is not one of POST/PUT/PATCH/DELETE
    pub fn new(
        id: ItemId,
        method: Method,
        url: impl Into<String>,
        payload: Payload,
        enqueued_at: DateTime<Utc>,
    ) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::InvalidInput("Queued URL cannot be empty".to_string()));
        }
        if !method.is_mutating() {
            return Err(Error::InvalidInput(format!(
                "Only mutating requests can be queued, got {}",
                method
            )));
        }

        Ok(Self {
            id,
            url,
            method,
            payload,
            enqueued_at,
        })
    }

    pub fn kind(&self) -> ItemKind {
        self.payload.kind()
    }

    /// How long the item has been waiting.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.enqueued_at)
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {} ({})", self.id, self.method, self.url, self.kind())
    }
}

/// Bodies are arbitrary bytes; persist them as base64 text inside the JSON.
mod body_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match body {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
