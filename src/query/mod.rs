//! Trade dataset access and aggregate queries
//!
//! Everything here feeds the noise engine: true aggregate values plus the
//! sensitivity that goes with them.

pub mod aggregate;
pub mod dataset;

pub use aggregate::{
    clamp_count, clip, clipped_sum, most_active_broker, noisy_histogram, sector_counts,
    split_budget_average, AverageRelease, HistogramBin, VolumeQuery, COUNT_SENSITIVITY,
};
pub use dataset::{filter_broker, filter_sector, load_trades, read_trades, Trade};
