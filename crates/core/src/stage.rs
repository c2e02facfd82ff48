//! Service-recovery stages and the policy that advances them.
//!
//! A session walks the four MOT stages in order: Explore, Offer, Action and
//! Confirm. Progression is driven purely by the number of turns in the log
//! and never moves backwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four ordered phases of a service-recovery conversation.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Explore,
    Offer,
    Action,
    Confirm,
}

impl Stage {
    /// All stages in progression order.
    pub const ALL: [Stage; 4] = [Stage::Explore, Stage::Offer, Stage::Action, Stage::Confirm];

    /// The stage that follows this one, or `None` for `Confirm`.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Explore => Some(Stage::Offer),
            Stage::Offer => Some(Stage::Action),
            Stage::Action => Some(Stage::Confirm),
            Stage::Confirm => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Explore => "EXPLORE",
            Stage::Offer => "OFFER",
            Stage::Action => "ACTION",
            Stage::Confirm => "CONFIRM",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EXPLORE" => Ok(Stage::Explore),
            "OFFER" => Ok(Stage::Offer),
            "ACTION" => Ok(Stage::Action),
            "CONFIRM" => Ok(Stage::Confirm),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Turn-count thresholds for leaving each stage.
///
/// A stage is left once the total number of turns strictly exceeds its
/// threshold. The defaults are 4, 8 and 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicy {
    pub offer_after: usize,
    pub action_after: usize,
    pub confirm_after: usize,
}

impl Default for StagePolicy {
    fn default() -> Self {
        Self {
            offer_after: 4,
            action_after: 8,
            confirm_after: 12,
        }
    }
}

impl StagePolicy {
    /// Builds a policy, requiring strictly increasing thresholds.
    pub fn new(offer_after: usize, action_after: usize, confirm_after: usize) -> Result<Self, String> {
        if offer_after < action_after && action_after < confirm_after {
            Ok(Self {
                offer_after,
                action_after,
                confirm_after,
            })
        } else {
            Err(format!(
                "stage thresholds must be strictly increasing, got {}, {}, {}",
                offer_after, action_after, confirm_after
            ))
        }
    }

    /// Threshold that must be exceeded to leave `stage`, if it can be left.
    fn exit_threshold(&self, stage: Stage) -> Option<usize> {
        match stage {
            Stage::Explore => Some(self.offer_after),
            Stage::Offer => Some(self.action_after),
            Stage::Action => Some(self.confirm_after),
            Stage::Confirm => None,
        }
    }

    /// Returns the stage after one evaluation at `turn_count` turns.
    ///
    /// Moves at most one step forward per call.
    pub fn advance(&self, current: Stage, turn_count: usize) -> Stage {
        match (self.exit_threshold(current), current.next()) {
            (Some(threshold), Some(next)) if turn_count > threshold => next,
            _ => current,
        }
    }
}

impl FromStr for StagePolicy {
    type Err = String;

    /// Parses a comma separated triple such as `"4,8,12"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|e| format!("'{}': {}", part.trim(), e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        match values.as_slice() {
            [offer, action, confirm] => StagePolicy::new(*offer, *action, *confirm),
            _ => Err(format!("expected three thresholds, got {}", values.len())),
        }
    }
}
