//! Pipeline plumbing shared by all flows.

pub mod gate;
pub mod params;
pub mod stage;
pub mod strandedness;
