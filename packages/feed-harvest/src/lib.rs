//! Incremental Feed Harvesting Library
//!
//! Drives an authenticated browser session through a paginated feed
//! (comment threads, company rosters), extracts candidate records from each
//! newly revealed fragment, deduplicates them by identity key and returns
//! the ordered set, optionally enriched by an inference backend.
//!
//! # Design Philosophy
//!
//! - The browser and the inference backend are capabilities behind traits
//! - Only authentication and navigation failures end a run
//! - Everything accepted before a stop is returned, in admission order
//! - Identity keys never change once a record is accepted
//!
//! # Usage
//!
//! ```rust,ignore
//! use feed_harvest::{Harvester, HarvestConfig, Target};
//! use feed_harvest::drivers::ChromiumLauncher;
//!
//! let harvester = Harvester::new(ChromiumLauncher::new(), HarvestConfig::default());
//! let report = harvester
//!     .extract_entities(&Target::post_comments(url), 50, None)
//!     .await?;
//!
//! for record in &report.records {
//!     println!("{:?} <{}>", record.display_name, record.identity_key());
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Browser driver and inference seams
//! - [`types`] - Fragments, records, configuration and run reports
//! - [`session`] - Authenticated session lifecycle and navigation
//! - [`pagination`] - Reveal-cycle driver
//! - [`extractor`] - Fragment to candidate record conversion
//! - [`store`] - Deduplicating, capped accumulator
//! - [`normalizer`] - Optional structured-field enrichment
//! - [`pipeline`] - Run orchestration
//! - [`drivers`] - Driver implementations (rate limiting, Chromium)
//! - [`testing`] - Mock implementations for testing

pub mod drivers;
pub mod error;
pub mod extractor;
pub mod normalizer;
pub mod pagination;
pub mod pipeline;
pub mod retry;
pub mod security;
pub mod session;
pub mod store;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{
    AuthError, DriverError, DriverResult, ExtractionError, HarvestResult, InferenceError,
    NavigationError, NormalizationError, NormalizeResult, ProfileError,
};
pub use traits::{
    driver::{BrowserDriver, Launcher, PageState},
    inference::Inference,
};
pub use types::{
    config::{CompanyRef, HarvestConfig, SiteConfig, Target},
    fragment::{FragmentQuery, RawFragment},
    record::{
        AcceptedRecord, CandidateRecord, FieldSource, IdentityKey, ProfileRecord,
        StructuredFields,
    },
    run::{ExhaustionCause, RunOutcome, RunReport, RunState, StopReason},
};

pub use extractor::{
    clean_profile_text, designation_score, find_contact_identifier, EntityExtractor,
    ExtractionProfile, KeyStrategy, Rejection, RevealControl,
};
pub use normalizer::{parse_structured_response, Normalizer};
pub use pagination::{FragmentSink, PaginationSummary, Paginator};
pub use pipeline::{extract_entities, Harvester};
pub use retry::{with_retry, RetryPolicy};
pub use security::{Credentials, SecretString};
pub use session::{Session, SessionManager, ViewHandle};
pub use store::Accumulator;

pub use drivers::{RateLimitedDriver, RateLimitedLauncher};

#[cfg(feature = "chromium")]
pub use drivers::{ChromiumDriver, ChromiumLauncher};

// Re-export testing utilities
pub use testing::{MockDriver, MockInference, MockLauncher};
