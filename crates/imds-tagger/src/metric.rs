// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Records carried through the processor.
//!
//! The processor only needs to add tags to a record, so anything implementing [`Taggable`] can
//! be enriched. [`Metric`] is the concrete record used by the agent binary: the head of a line
//! protocol entry (`measurement,key=value,...`) with the rest of the line kept verbatim.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ParseError;

/// A record whose tags can be set by the processor.
pub trait Taggable: Send + 'static {
    /// Sets `name` to `value`, replacing any previous value.
    fn add_tag(&mut self, name: &str, value: &str);

    fn tag(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    /// Everything after the first space, never inspected
    pub payload: String,
}

impl Metric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            payload: String::new(),
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Parses `measurement[,key=value...][ payload]`.
    ///
    /// Escaped commas, spaces and equal signs are not supported.
    pub fn parse(line: &str) -> Result<Metric, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (head, payload) = line.split_once(' ').unwrap_or((line, ""));
        let mut parts = head.split(',');
        let name = match parts.next() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(ParseError::MissingName),
        };

        let mut tags = BTreeMap::new();
        for part in parts {
            match part.split_once('=') {
                Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                    tags.insert(key.to_string(), value.to_string());
                }
                _ => return Err(ParseError::MalformedTag(part.to_string())),
            }
        }

        Ok(Metric {
            name: name.to_string(),
            tags,
            payload: payload.trim_start().to_string(),
        })
    }
}

impl Taggable for Metric {
    fn add_tag(&mut self, name: &str, value: &str) {
        self.tags.insert(name.to_string(), value.to_string());
    }

    fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.tags {
            write!(f, ",{key}={value}")?;
        }
        if !self.payload.is_empty() {
            write!(f, " {}", self.payload)?;
        }
        Ok(())
    }
}
