// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The fixed set of metadata tags the processor knows how to fill in.

use std::fmt;
use std::str::FromStr;

use crate::errors::ConfigError;

/// A tag name backed by a field of the instance metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagName {
    Hostname,
    Id,
    Image,
    MachineType,
    Zone,
}

impl TagName {
    pub const ALL: [TagName; 5] = [
        TagName::Hostname,
        TagName::Id,
        TagName::Image,
        TagName::MachineType,
        TagName::Zone,
    ];

    /// Tag key as it appears on enriched records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TagName::Hostname => "hostname",
            TagName::Id => "id",
            TagName::Image => "image",
            TagName::MachineType => "machineType",
            TagName::Zone => "zone",
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(ConfigError::EmptyTag),
            "hostname" => Ok(TagName::Hostname),
            "id" => Ok(TagName::Id),
            "image" => Ok(TagName::Image),
            "machineType" => Ok(TagName::MachineType),
            "zone" => Ok(TagName::Zone),
            other => Err(ConfigError::UnknownTag(other.to_string())),
        }
    }
}

/// Splits a tag list such as `"id,zone"` or `"id zone"` into its names.
///
/// Space-separated lists are the standard, comma-separated lists are accepted as well.
pub fn split_tag_list(raw: &str) -> Vec<String> {
    raw.replace(',', " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
