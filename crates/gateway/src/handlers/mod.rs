//! API handlers module

pub mod chapters;
pub mod documents;
pub mod health;
pub mod papers;
