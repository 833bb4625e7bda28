//! 📦 Common data structures: the pebbles that make up the boulder.
//!
//! 🎬 COLD OPEN. INT. METRICS PIPELINE, 3:47 AM
//!
//! A write to the time-series database failed. Nobody noticed. The failed line
//! was wrapped in a little JSON envelope, told where it was supposed to go, and
//! dropped into a queue to wait. This module is what that envelope looks like
//! once we fish it back out: a [`RawRecord`] on the wire, a [`NormalizedRecord`]
//! once it passes inspection, and a [`Batch`] once it has found some friends
//! headed to the same place.
//!
//! 🦆

use serde::{Deserialize, Deserializer, Serialize};

/// 📨 One queued record body, exactly as the upstream writer produced it.
///
/// Field names are the upstream's (PascalCase, with the all-caps `TSD` prefix).
/// `TSDName` and `TSDOrg` may be absent for single-tenant destinations.
///
/// A field that is `null` reads the same as a missing one. Any other non-string value
/// fails the parse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawRecord {
    #[serde(rename = "WritePath", default, deserialize_with = "null_as_empty")]
    pub write_path: String,
    #[serde(rename = "Message", default, deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(rename = "TSDName", default, deserialize_with = "null_as_empty")]
    pub tsd_name: String,
    #[serde(rename = "TSDOrg", default, deserialize_with = "null_as_empty")]
    pub tsd_org: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// 🎯 Where a message is headed: destination path, database (bucket) name, organization.
///
/// Two records may share a [`Batch`] only when all three strings are exactly equal.
/// No case folding, no trailing-slash forgiveness. Exact. Like a bouncer with a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub write_path: String,
    pub tsd_name: String,
    pub tsd_org: String,
}

impl BatchKey {
    pub fn new(
        write_path: impl Into<String>,
        tsd_name: impl Into<String>,
        tsd_org: impl Into<String>,
    ) -> Self {
        Self {
            write_path: write_path.into(),
            tsd_name: tsd_name.into(),
            tsd_org: tsd_org.into(),
        }
    }
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (bucket='{}', org='{}')",
            self.write_path, self.tsd_name, self.tsd_org
        )
    }
}

/// ✅ A record that survived validation. One line-protocol message and its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub key: BatchKey,
    pub message: String,
}

impl NormalizedRecord {
    /// 🔄 Render this record back into the inbound queue schema.
    ///
    /// Feeding the result through the validator again yields an equal record.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&RawRecord {
            write_path: self.key.write_path.clone(),
            message: self.message.clone(),
            tsd_name: self.key.tsd_name.clone(),
            tsd_org: self.key.tsd_org.clone(),
        })
    }
}

/// 🪨 A key-homogeneous, ordered group of messages headed out in one write.
///
/// Fields are private on purpose: once the grouper hands a `Batch` over it never
/// changes again. You may look. You may consume. You may not touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    key: BatchKey,
    messages: Vec<String>,
}

impl Batch {
    pub(crate) fn new(key: BatchKey, messages: Vec<String>) -> Self {
        Self { key, messages }
    }

    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 📡 The request body: messages joined by `\n`, no trailing newline.
    pub fn body(&self) -> String {
        self.messages.join("\n")
    }

    pub fn into_parts(self) -> (BatchKey, Vec<String>) {
        (self.key, self.messages)
    }
}
