//! Browser driver implementations.

pub mod rate_limited;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use rate_limited::{RateLimitedDriver, RateLimitedLauncher};

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumDriver, ChromiumLauncher};
