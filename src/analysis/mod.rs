//! Analysis modules.
//!
//! Issue-aging statistics and report assembly helpers.

pub mod aggregator;
pub mod aging;

pub use aggregator::*;
pub use aging::{aggregate, AgingSeries, AgingWindow, IssueLifetime};
