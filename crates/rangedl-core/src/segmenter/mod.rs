//! Range math and segment planning.
//!
//! Splits a download into N segments and computes the HTTP Range header
//! bounds for each.

mod range;

pub use range::{plan_segments, Segment};
