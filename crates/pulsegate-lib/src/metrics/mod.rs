pub mod hrv;
pub mod intervals;
pub mod sqi;
