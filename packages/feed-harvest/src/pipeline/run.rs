//! Per-run bookkeeping: the state trail and the fragment sink.

use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::extractor::EntityExtractor;
use crate::pagination::{FragmentSink, PaginationSummary};
use crate::store::Accumulator;
use crate::types::config::Target;
use crate::types::fragment::RawFragment;
use crate::types::record::AcceptedRecord;
use crate::types::run::{RunReport, RunState};

/// One invocation of an entity extraction.
///
/// Lives only for the duration of the call and is never persisted.
#[derive(Debug)]
pub(crate) struct ExtractionRun {
    id: Uuid,
    target: String,
    max_results: usize,
    state: RunState,
    trail: Vec<RunState>,
    started: Instant,
}

impl ExtractionRun {
    pub fn new(target: &Target, max_results: usize) -> Self {
        Self {
            id: Uuid::now_v7(),
            target: target.to_string(),
            max_results,
            state: RunState::Init,
            trail: vec![RunState::Init],
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Move to `next`, recording it in the trail.
    pub fn advance(&mut self, next: RunState) {
        if !self.state.can_transition_to(&next) {
            warn!(from = ?self.state, to = ?next, "Unexpected run state transition");
        }
        debug!(from = ?self.state, to = ?next, "Run state");
        self.state = next;
        self.trail.push(next);
    }

    pub fn into_report(
        self,
        records: Vec<AcceptedRecord>,
        summary: PaginationSummary,
        sink: SinkCounters,
        normalization_fallbacks: usize,
    ) -> RunReport {
        let outcome = summary.stop.outcome();
        RunReport {
            run_id: self.id,
            target: self.target,
            max_results: self.max_results,
            records,
            stop_reason: summary.stop,
            outcome,
            reveal_cycles: summary.reveal_cycles,
            fragments_seen: summary.fragments_seen,
            fragments_rejected: sink.rejected,
            candidates_refused: sink.refused,
            normalization_fallbacks,
            states: self.trail,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Counts kept by [`AccumulatingSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SinkCounters {
    pub rejected: usize,
    pub refused: usize,
}

/// Extracts each fragment and offers the candidate to the store.
pub(crate) struct AccumulatingSink<'a> {
    extractor: &'a EntityExtractor,
    store: Accumulator,
    counters: SinkCounters,
}

impl<'a> AccumulatingSink<'a> {
    pub fn new(extractor: &'a EntityExtractor, store: Accumulator) -> Self {
        Self {
            extractor,
            store,
            counters: SinkCounters::default(),
        }
    }

    pub fn into_parts(self) -> (Accumulator, SinkCounters) {
        (self.store, self.counters)
    }
}

impl FragmentSink for AccumulatingSink<'_> {
    fn accept(&mut self, fragment: RawFragment) {
        match self.extractor.classify(&fragment) {
            Ok(candidate) => {
                let key = candidate.identity_key.clone();
                if self.store.offer(candidate) {
                    debug!(identity_key = %key, accepted = self.store.len(), "Record accepted");
                } else {
                    self.counters.refused += 1;
                    debug!(identity_key = %key, "Duplicate or over cap, refused");
                }
            }
            Err(reason) => {
                self.counters.rejected += 1;
                debug!(position = fragment.position, reason = ?reason, "Fragment skipped");
            }
        }
    }

    fn is_satisfied(&self) -> bool {
        self.store.is_full()
    }
}
