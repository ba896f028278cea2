use geoauction_core::{Error, Result, EMBEDDING_DIM};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to rank with when the requester has no cached preference embedding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingEmbeddingPolicy {
    /// Resolve to no winner without touching the eligibility index
    #[default]
    NoWinner,
    /// Rank with the zero vector: every candidate is equally distant, so the
    /// top-k are the lowest ad ids
    Neutral,
}

impl FromStr for MissingEmbeddingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no-winner" | "no_winner" => Ok(Self::NoWinner),
            "neutral" => Ok(Self::Neutral),
            other => Err(Error::InvalidConfig(format!(
                "unknown missing-embedding policy '{}', expected no-winner or neutral",
                other
            ))),
        }
    }
}

impl fmt::Display for MissingEmbeddingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoWinner => write!(f, "no-winner"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Configuration for an auction engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub embedding_dim: usize,
    /// Size of the similarity-ranked subset the selector sees
    pub top_k: usize,
    pub missing_embedding: MissingEmbeddingPolicy,
    /// Exclude ads outside their campaign window at resolution time
    pub enforce_active_window: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_dim: EMBEDDING_DIM,
            top_k: 10,
            missing_embedding: MissingEmbeddingPolicy::NoWinner,
            enforce_active_window: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("top-k must be positive".to_string()));
        }
        Ok(())
    }
}
