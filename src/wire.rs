//! SCR message codec.
//!
//! The simulator speaks a flat, parenthesised format: `(angle 0.003)(track 7.4 7.6 ...)`.
//! Each group is a key followed by one or more whitespace separated values.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unterminated group starting at byte {0}")]
    Unterminated(usize),
}

/// Ordered set of named fields, as read from or written to the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    fields: Vec<(String, Vec<String>)>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw datagram. Text outside parentheses is ignored, groups without
    /// at least one value are skipped.
    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let mut msg = Message::new();
        let mut rest = raw;
        let mut offset = 0;

        while let Some(open) = rest.find('(') {
            let Some(close) = rest[open..].find(')') else {
                return Err(WireError::Unterminated(offset + open));
            };
            let group = &rest[open + 1..open + close];
            let mut items = group.split_whitespace();
            match (items.next(), items.clone().next()) {
                (Some(key), Some(_)) => {
                    msg.fields
                        .push((key.to_string(), items.map(str::to_string).collect()));
                }
                _ => tracing::debug!("skipping malformed group {:?}", group),
            }
            let consumed = open + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }

        Ok(msg)
    }

    /// Append a field. Lookups return the first occurrence of a key.
    pub fn push<I, V>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: fmt::Display,
    {
        self.fields.push((
            key.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// First value of `key`, parsed. `None` when absent or unparseable.
    pub fn scalar<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)?.first()?.parse().ok()
    }

    /// Like [`Message::scalar`] for floats, but `nan`/`inf` count as unknown.
    pub fn real(&self, key: &str) -> Option<f64> {
        self.scalar::<f64>(key).filter(|v| v.is_finite())
    }

    /// Like [`Message::sequence`] for floats; one non-finite value makes the sequence unknown.
    pub fn reals(&self, key: &str) -> Option<Vec<f64>> {
        self.sequence::<f64>(key)
            .filter(|vs| vs.iter().all(|v| v.is_finite()))
    }

    /// All values of `key`, parsed. A single bad value makes the whole sequence unknown.
    pub fn sequence<T: FromStr>(&self, key: &str) -> Option<Vec<T>> {
        self.get(key)?
            .iter()
            .map(|v| v.parse().ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, values) in &self.fields {
            write!(f, "({}", key)?;
            for v in values {
                write!(f, " {}", v)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
