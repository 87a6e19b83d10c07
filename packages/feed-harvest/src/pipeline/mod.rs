//! Extraction runs.
//!
//! [`Harvester`] wires the session manager, pagination driver, extractor,
//! store and optional normalizer into one run:
//!
//! ```text
//! INIT → AUTHENTICATED → NAVIGATING → PAGINATING → STOPPED → NORMALIZING? → DONE
//!   └──────────┴──────────────┴──→ FAILED
//! ```
//!
//! The session is closed exactly once on every exit path. Only
//! authentication and navigation errors fail a run; everything later
//! degrades to a partial [`RunReport`]. Cancellation and the run deadline
//! are honored from login through normalization.

mod run;

use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use url::Url;

use crate::error::{DriverError, ExtractionError, HarvestResult, NavigationError};
use crate::extractor::{clean_profile_text, EntityExtractor, ExtractionProfile};
use crate::normalizer::Normalizer;
use crate::pagination::{interrupted, Paginator};
use crate::retry::with_retry;
use crate::security::Credentials;
use crate::session::{navigation_error, Session, SessionManager};
use crate::store::Accumulator;
use crate::traits::driver::{BrowserDriver, Launcher};
use crate::traits::inference::Inference;
use crate::types::config::{HarvestConfig, Target};
use crate::types::record::{AcceptedRecord, ProfileRecord, StructuredFields};
use crate::types::run::{RunReport, RunState};

use run::{AccumulatingSink, ExtractionRun};

/// Runs extractions against browsers produced by one launcher.
///
/// Each call opens its own session, so a harvester can serve concurrent
/// runs as long as the launcher hands out independent contexts.
pub struct Harvester<L: Launcher> {
    sessions: SessionManager<L>,
    normalizer: Option<Normalizer>,
}

impl<L: Launcher> Harvester<L> {
    pub fn new(launcher: L, config: HarvestConfig) -> Self {
        Self {
            sessions: SessionManager::new(launcher, config),
            normalizer: None,
        }
    }

    /// Enable normalization through `inference`, using the run config's
    /// timeout and retry policy.
    pub fn with_inference(mut self, inference: Arc<dyn Inference>) -> Self {
        self.normalizer = Some(Normalizer::new(inference, self.sessions.config()));
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn config(&self) -> &HarvestConfig {
        self.sessions.config()
    }

    pub fn sessions(&self) -> &SessionManager<L> {
        &self.sessions
    }

    /// Harvest up to `max_results` records from `target`.
    ///
    /// Credentials default to the environment when not given and are only
    /// needed if the browser profile is signed out.
    pub async fn extract_entities(
        &self,
        target: &Target,
        max_results: usize,
        credentials: Option<Credentials>,
    ) -> HarvestResult<RunReport> {
        self.extract_entities_with_cancel(target, max_results, credentials, &CancellationToken::new())
            .await
    }

    /// Like [`extract_entities`](Self::extract_entities), stopping early
    /// with partial results when `cancel` fires.
    pub async fn extract_entities_with_cancel(
        &self,
        target: &Target,
        max_results: usize,
        credentials: Option<Credentials>,
        cancel: &CancellationToken,
    ) -> HarvestResult<RunReport> {
        let run = ExtractionRun::new(target, max_results);
        let span = info_span!("extraction_run", run_id = %run.id(), target = %target);
        self.execute(run, target, max_results, credentials, cancel)
            .instrument(span)
            .await
    }

    async fn execute(
        &self,
        mut run: ExtractionRun,
        target: &Target,
        max_results: usize,
        credentials: Option<Credentials>,
        cancel: &CancellationToken,
    ) -> HarvestResult<RunReport> {
        let config = self.config();
        let profile = ExtractionProfile::for_target(target);
        let extractor = match EntityExtractor::with_base_url(profile.clone(), &config.site.base_url) {
            Ok(extractor) => extractor,
            Err(e) => {
                run.advance(RunState::Failed);
                return Err(ExtractionError::Config(e));
            }
        };

        info!(max_results, profile = %profile.name, "Starting extraction run");
        let deadline = config.deadline.map(|d| run.started() + d);
        let credentials = credentials.or_else(|| Credentials::from_env().ok());
        let session = match self
            .sessions
            .open_until(credentials.as_ref(), cancel, deadline)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                run.advance(RunState::Failed);
                return Err(e.into());
            }
        };
        run.advance(RunState::Authenticated);

        run.advance(RunState::Navigating);
        if let Err(e) = self.sessions.open_view(&session, target).await {
            run.advance(RunState::Failed);
            session.close().await;
            return Err(e.into());
        }

        run.advance(RunState::Paginating);
        let mut paginator = Paginator::new(
            profile.query.clone(),
            profile.reveal.clone(),
            config.max_cycles_for(target),
            config,
        );
        if let Some(deadline) = deadline {
            paginator = paginator.with_deadline(deadline);
        }
        let mut sink = AccumulatingSink::new(&extractor, Accumulator::with_cap(max_results));
        let summary = paginator.drive(&session, &mut sink, cancel).await;
        run.advance(RunState::Stopped(summary.stop));

        let (store, counters) = sink.into_parts();
        let mut records = store.into_records();
        let mut fallbacks = 0;

        if let Some(normalizer) = self.normalizer.as_ref().filter(|_| config.normalize_records) {
            if cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("Run interrupted, skipping normalization");
            } else {
                run.advance(RunState::Normalizing);
                let (enriched, fell_back) =
                    normalize_all(normalizer, records, cancel, deadline).await;
                records = enriched;
                fallbacks = fell_back;
            }
        }

        run.advance(RunState::Done(summary.stop.outcome()));
        session.close().await;

        let report = run.into_report(records, summary, counters, fallbacks);
        info!(
            accepted = report.len(),
            stop = %report.stop_reason,
            outcome = ?report.outcome,
            fragments_seen = report.fragments_seen,
            fragments_rejected = report.fragments_rejected,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Extraction run finished"
        );
        Ok(report)
    }

    /// Extract and normalize a single profile page.
    ///
    /// Without a configured normalizer, or when it fails, the fields are
    /// split locally from the cleaned page text.
    pub async fn extract_profile(
        &self,
        profile_url: &str,
        credentials: Option<Credentials>,
    ) -> HarvestResult<ProfileRecord> {
        let span = info_span!("profile_extraction", url = %profile_url);
        self.profile(profile_url, credentials).instrument(span).await
    }

    async fn profile(
        &self,
        profile_url: &str,
        credentials: Option<Credentials>,
    ) -> HarvestResult<ProfileRecord> {
        let url = Url::parse(profile_url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| NavigationError::InvalidTarget {
                reason: format!("not a profile URL: {}", profile_url),
            })?;

        let credentials = credentials.or_else(|| Credentials::from_env().ok());
        let session = self.sessions.open(credentials.as_ref()).await?;

        let (landed, raw) = match self.read_profile(&session, url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };
        session.close().await;

        let cleaned = clean_profile_text(&raw);
        let (fields, fell_back) = match &self.normalizer {
            Some(normalizer) => {
                normalizer
                    .normalize_or(&cleaned, || StructuredFields::from_profile_text(&cleaned))
                    .await
            }
            None => (StructuredFields::from_profile_text(&cleaned), true),
        };
        info!(fallback = fell_back, text_len = cleaned.len(), "Profile extracted");

        Ok(ProfileRecord {
            profile_url: landed,
            fields,
            cleaned_text: cleaned,
        })
    }

    /// Landed URL and body text of a profile page.
    async fn read_profile(
        &self,
        session: &Session<L::Driver>,
        url: &str,
    ) -> Result<(String, String), NavigationError> {
        let view = self.sessions.navigate(session, url).await?;
        let text = with_retry(
            &self.config().retry,
            "body_text",
            |e: &DriverError| e.is_transient(),
            || session.driver().body_text(),
        )
        .await
        .map_err(|e| navigation_error(url, e))?;

        if text.trim().is_empty() {
            return Err(NavigationError::NotFound {
                url: url.to_string(),
            });
        }
        Ok((view.url, text))
    }
}

/// Enrich records in order. Once `cancel` fires or `deadline` passes, the
/// record in flight and all later ones get local fallback fields.
async fn normalize_all(
    normalizer: &Normalizer,
    records: Vec<AcceptedRecord>,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> (Vec<AcceptedRecord>, usize) {
    let mut enriched = Vec::with_capacity(records.len());
    let mut fallbacks = 0;
    let mut pending = records.into_iter();

    while let Some(record) = pending.next() {
        let outcome = tokio::select! {
            biased;
            _ = interrupted(cancel, deadline) => None,
            outcome = normalizer.enrich(record.clone()) => Some(outcome),
        };
        match outcome {
            Some((record, fell_back)) => {
                if fell_back {
                    fallbacks += 1;
                }
                enriched.push(record);
            }
            None => {
                let remaining: Vec<AcceptedRecord> =
                    std::iter::once(record).chain(pending.by_ref()).collect();
                warn!(
                    remaining = remaining.len(),
                    "Run interrupted during normalization, using local fields"
                );
                fallbacks += remaining.len();
                enriched.extend(remaining.into_iter().map(|record| {
                    let fields = StructuredFields::from_record(&record);
                    record.with_structured(fields)
                }));
                break;
            }
        }
    }
    (enriched, fallbacks)
}

/// One-shot entity extraction returning the ordered record list.
pub async fn extract_entities<L: Launcher>(
    launcher: L,
    config: HarvestConfig,
    target: &Target,
    max_results: usize,
    credentials: Option<Credentials>,
) -> HarvestResult<Vec<AcceptedRecord>> {
    let report = Harvester::new(launcher, config)
        .extract_entities(target, max_results, credentials)
        .await?;
    Ok(report.records)
}
