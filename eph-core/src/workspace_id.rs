//! Workspace identifiers.
//!
//! A workspace id doubles as the automation engine's stack name, so it has to
//! stay DNS-label safe: lowercase alphanumerics and hyphens, 3 to 63 characters,
//! no leading or trailing hyphen.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use rand::seq::IndexedRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceError};

static NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]{1,61}[a-z0-9])$")
        .expect("Workspace name regex should compile - this is a static pattern")
});

const ADJECTIVES: &[&str] = &[
    "amber", "brave", "calm", "clever", "crisp", "daring", "eager", "fancy", "gentle", "happy",
    "jolly", "keen", "lively", "lucky", "mellow", "nimble", "proud", "quiet", "rapid", "shiny",
    "silent", "sunny", "swift", "witty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "canyon", "comet", "falcon", "forest", "glacier", "harbor", "heron",
    "island", "lagoon", "meadow", "otter", "panda", "pebble", "quartz", "raven", "river",
    "summit", "tiger", "valley", "walrus", "willow", "zephyr",
];

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Validate a name exactly as given.
    pub fn parse(name: &str) -> Result<Self> {
        if NAME_REGEX.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(WorkspaceError::InvalidName(name.to_string()))
        }
    }

    /// Resolve the id for a new workspace: a supplied name is trimmed and
    /// lowercased before validation, a missing or blank one is generated.
    pub fn resolve(name: Option<&str>) -> Result<Self> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Self::parse(&name.to_lowercase()),
            None => Ok(Self::generate()),
        }
    }

    /// Random `adjective-noun-xxxx` name.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
        let noun = NOUNS.choose(&mut rng).copied().unwrap_or("otter");
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();

        Self(format!("{adjective}-{noun}-{suffix}"))
    }

    /// Wrap the name of a stack that already exists in the engine.
    ///
    /// Stacks created before the naming rule existed are still listed and
    /// reaped, so lookups by id do not re-apply it.
    pub fn existing(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkspaceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for WorkspaceId {
    type Err = WorkspaceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WorkspaceId {
    type Error = WorkspaceError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<WorkspaceId> for String {
    fn from(id: WorkspaceId) -> Self {
        id.0
    }
}
