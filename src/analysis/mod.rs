//! Read-only summaries over a graph and its review states.

pub mod progress;
pub mod weak_spots;

pub use progress::{aggregate_progress, ProgressReport};
pub use weak_spots::{rank_weak_spots, rank_weak_spots_with, WeakSpot, WeakSpotWeights};
