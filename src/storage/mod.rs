//! Dataset loading and result persistence

pub mod csv;
pub mod sessions;
