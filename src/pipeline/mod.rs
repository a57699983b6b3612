pub mod normalize;
pub mod image;
pub mod analysis;
pub mod triage;
