use std::{fmt, str::FromStr};

use anyhow::anyhow;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetType {
    Job,
    CommunityPost,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Job => "JOB",
            TargetType::CommunityPost => "COMMUNITY_POST",
        }
    }
}

impl FromStr for TargetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<TargetType> {
        match s {
            "JOB" => Ok(TargetType::Job),
            "COMMUNITY_POST" => Ok(TargetType::CommunityPost),
            _ => Err(anyhow!("unknown target type {s:?}")),
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Article a comment thread is attached to
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct Target {
    #[serde(rename = "type")]
    pub kind: TargetType,
    pub id: i64,
}

impl Target {
    pub fn new(kind: TargetType, id: i64) -> Target {
        Target { kind, id }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}
