//! Domain types for extraction runs.

pub mod config;
pub mod fragment;
pub mod record;
pub mod run;
