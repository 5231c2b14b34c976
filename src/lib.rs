//! Flashcard spaced-repetition core: scheduling, session selection, and the
//! storage/advisory seams, plus the thin HTTP layer that exposes them.

pub mod api;
pub mod db;
pub mod error;
pub mod gemini;
pub mod models;
pub mod session;
pub mod srs;
pub mod store;

#[cfg(test)]
mod srs_tests;
