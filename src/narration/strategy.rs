//! Skew-strategy determination: which prompt-assembly variant the
//! narrator should use, based on how alone the candidate is in score
//! space.

use serde::{Deserialize, Serialize};

use crate::poi::{Poi, PoiManager};

/// Rivals are POIs scoring within this fraction of the candidate's score
const RIVAL_SCORE_FRACTION: f64 = 0.8;
/// At or above this many rivals the field is crowded
const MANY_RIVALS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewStrategy {
    /// Crowded field: keep the narration tight and comparative
    MinSkew,
    /// Isolated high scorer: give it the full treatment
    MaxSkew,
    Uniform,
    Fixed,
}

/// Decide the strategy for a candidate. Ground selections always get
/// `MaxSkew` (the user picked the place by being there).
pub async fn determine_strategy(
    pois: &dyn PoiManager,
    candidate: &Poi,
    on_ground: bool,
) -> SkewStrategy {
    if on_ground {
        return SkewStrategy::MaxSkew;
    }

    let count = pois
        .count_scored_above(candidate.score * RIVAL_SCORE_FRACTION, MANY_RIVALS + 1)
        .await;
    // The candidate counts itself
    let rivals = count.saturating_sub(1);

    if rivals == 0 {
        SkewStrategy::MaxSkew
    } else if rivals >= MANY_RIVALS {
        SkewStrategy::MinSkew
    } else {
        SkewStrategy::Uniform
    }
}
