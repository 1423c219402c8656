//! Callback-data codec
//!
//! Inline button actions travel as a compact `action|k=v|k=v` string. The
//! chat provider caps callback payloads at 64 bytes, so the encoder
//! degrades to the bare action name when the structured form would not
//! fit, and the decoder accepts both forms. A button whose payload had to
//! be degraded is still actionable, just without its context.

use std::collections::BTreeMap;

/// Hard wire limit on encoded callback data
pub const MAX_CALLBACK_BYTES: usize = 64;

const FIELD_SEP: char = '|';
const KV_SEP: char = '=';

/// A button action plus a small key/value payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallbackData {
    pub action: String,
    /// BTreeMap keeps encoding deterministic
    pub args: BTreeMap<String, String>,
}

impl CallbackData {
    /// A payload carrying only an action name
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            args: BTreeMap::new(),
        }
    }

    /// Builder-style argument
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Look up an argument
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// Encode to the wire string, degrading when over the cap
    ///
    /// If the structured form exceeds [`MAX_CALLBACK_BYTES`], only the
    /// action name is sent; if even that is too long it is truncated at a
    /// char boundary. The result always fits the cap.
    pub fn encode(&self) -> String {
        let mut encoded = self.action.clone();
        for (key, value) in &self.args {
            encoded.push(FIELD_SEP);
            encoded.push_str(key);
            encoded.push(KV_SEP);
            encoded.push_str(value);
        }

        if encoded.len() <= MAX_CALLBACK_BYTES {
            return encoded;
        }

        // degrade: bare action name, truncated if it alone overflows
        let mut bare = self.action.clone();
        while bare.len() > MAX_CALLBACK_BYTES {
            bare.pop();
        }
        bare
    }

    /// Decode a wire string; never fails
    ///
    /// A bare action (no separator) yields empty args. Malformed `k=v`
    /// pairs are skipped rather than rejected - a stale or degraded button
    /// must still resolve to an action.
    pub fn decode(data: &str) -> Self {
        let mut parts = data.split(FIELD_SEP);
        let action = parts.next().unwrap_or_default().to_string();

        let mut args = BTreeMap::new();
        for part in parts {
            if let Some((key, value)) = part.split_once(KV_SEP) {
                if !key.is_empty() {
                    args.insert(key.to_string(), value.to_string());
                }
            }
        }

        Self { action, args }
    }
}
