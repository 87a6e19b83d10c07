//! Core trait abstractions for the harvest library.
//!
//! These traits define the capabilities that applications plug in:
//! a browser driver and an inference backend.

pub mod driver;
pub mod inference;
