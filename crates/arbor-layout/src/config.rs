#![forbid(unsafe_code)]

//! Map-level layout configuration.
//!
//! Every field has a documented default, so `LayoutConfig::default()` is a
//! complete, valid configuration.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which layout strategy a map uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StrategyKind {
    /// Root children split into two height-balanced branches.
    #[default]
    Balanced,
    /// Children on both sides of every node.
    Symmetric,
    /// One-time placement of new topics; no automatic re-layout.
    Free,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [Self::Balanced, Self::Symmetric, Self::Free];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Symmetric => "symmetric",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized strategy name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy(pub String);

impl fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown layout strategy {:?} (expected balanced, symmetric or free)",
            self.0
        )
    }
}

impl std::error::Error for UnknownStrategy {}

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStrategy(s.to_owned()))
    }
}

/// Layout parameters for one map.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LayoutConfig {
    /// Active strategy. Default: balanced.
    pub strategy: StrategyKind,
    /// Minimum vertical gap between stacked sibling subtrees. Default: 12.
    pub sibling_gap: f64,
    /// Horizontal distance between a parent's edge and its children's
    /// column. Default: 40.
    pub branch_spacing: f64,
    /// Floor substituted for degenerate (zero, negative, non-finite) sizes.
    /// Default: 1.
    pub min_extent: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Balanced,
            sibling_gap: 12.0,
            branch_spacing: 40.0,
            min_extent: 1.0,
        }
    }
}

impl LayoutConfig {
    /// Builder-style strategy override.
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate constraints. Returns a list of human-readable errors.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.sibling_gap.is_finite() || self.sibling_gap < 0.0 {
            errors.push(format!(
                "layout.sibling_gap must be finite and >= 0, got {}",
                self.sibling_gap
            ));
        }
        if !self.branch_spacing.is_finite() || self.branch_spacing < 0.0 {
            errors.push(format!(
                "layout.branch_spacing must be finite and >= 0, got {}",
                self.branch_spacing
            ));
        }
        if !self.min_extent.is_finite() || self.min_extent <= 0.0 {
            errors.push(format!(
                "layout.min_extent must be finite and > 0, got {}",
                self.min_extent
            ));
        }
        errors
    }
}
