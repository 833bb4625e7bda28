//! 🔍 The validator: customs and border control for queued records.
//!
//! Raw bytes come in. Either a [`NormalizedRecord`] comes out, or a
//! [`RecordError`] saying exactly which checkpoint the record failed at.
//! No best-effort dictionary lookups. No "eh, close enough".
//!
//! 🧠 Checkpoints, in order:
//! 1. bytes → UTF-8 text ([`RecordError::Decode`])
//! 2. text (surrounding newlines stripped) → [`RawRecord`] ([`RecordError::Parse`])
//! 3. `WritePath` non-empty, `Message` non-empty and not starting with `,`
//!    ([`RecordError::Validation`])
//! 4. optional lower-casing of the message when normalizing

use crate::common::{BatchKey, NormalizedRecord, RawRecord};
use crate::error::{RecordError, ValidationError};

/// Line-protocol field delimiter. A message that starts with it lost its measurement name.
const FIELD_DELIMITER: char = ',';

/// 🎯 Validate one queue payload.
///
/// Pure function: no logging, no I/O. The caller decides what a rejection means.
pub fn validate(payload: &[u8], normalize: bool) -> Result<NormalizedRecord, RecordError> {
    let text = std::str::from_utf8(payload)?;
    let raw: RawRecord = serde_json::from_str(text.trim_matches('\n'))?;
    check(raw, normalize)
}

fn check(raw: RawRecord, normalize: bool) -> Result<NormalizedRecord, RecordError> {
    if raw.write_path.is_empty() {
        return Err(ValidationError::MissingWritePath.into());
    }

    let message = raw.message.trim_matches('\n');
    if message.is_empty() {
        return Err(ValidationError::EmptyMessage.into());
    }
    if message.starts_with(FIELD_DELIMITER) {
        return Err(ValidationError::MalformedMessage.into());
    }

    let message = if normalize {
        message.to_lowercase()
    } else {
        message.to_string()
    };

    Ok(NormalizedRecord {
        key: BatchKey {
            write_path: raw.write_path,
            tsd_name: raw.tsd_name,
            tsd_org: raw.tsd_org,
        },
        message,
    })
}
