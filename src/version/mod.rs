// src/version/mod.rs

//! Module version parsing and comparison
//!
//! Module packages carry dotted numeric versions such as `9.5.1` or `10.0`.
//! Versions are compared part by part numerically, with missing trailing
//! parts treated as zero, so `10.0` equals `10.0.0` and `9.10` is newer than
//! `9.9`. An optional qualifier after a dash (`1.0.0-beta`) sorts before the
//! unqualified release.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed module version
#[derive(Debug, Clone, Eq)]
pub struct ModuleVersion {
    parts: Vec<u64>,
    qualifier: Option<String>,
}

impl ModuleVersion {
    /// Parse a module version string
    ///
    /// Examples:
    /// - "1.2.3" → parts=[1, 2, 3]
    /// - "10.0" → parts=[10, 0]
    /// - "2.0.0-rc1" → parts=[2, 0, 0], qualifier="rc1"
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (numbers, qualifier) = match s.split_once('-') {
            Some((n, q)) if !q.is_empty() => (n, Some(q.to_string())),
            Some((n, _)) => (n, None),
            None => (s, None),
        };

        if numbers.is_empty() {
            return Err(Error::ParseError(format!("Empty module version '{}'", s)));
        }

        let parts = numbers
            .split('.')
            .map(|p| {
                p.parse::<u64>().map_err(|e| {
                    Error::ParseError(format!("Invalid version component '{}' in '{}': {}", p, s, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { parts, qualifier })
    }

    /// Numeric components
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    fn part(&self, idx: usize) -> u64 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl PartialEq for ModuleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for ModuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for idx in 0..len {
            match self.part(idx).cmp(&other.part(idx)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        // A qualified version precedes its release
        match (&self.qualifier, &other.qualifier) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        write!(f, "{}", numbers.join("."))?;
        if let Some(ref qualifier) = self.qualifier {
            write!(f, "-{}", qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ModuleVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ModuleVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
