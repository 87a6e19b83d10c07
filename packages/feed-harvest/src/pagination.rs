//! Pagination driver: reveal, capture, diff, repeat.
//!
//! Each cycle captures every visible item, keeps only the fragments not seen
//! in an earlier capture (by [`RawFragment::fingerprint`]) and hands them to
//! a [`FragmentSink`] in DOM order. Stop conditions are evaluated after the
//! politeness delay and the capture, right before the next reveal, so the
//! final batch is always processed.

use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::extractor::RevealControl;
use crate::retry::{with_retry, RetryPolicy};
use crate::session::Session;
use crate::traits::driver::BrowserDriver;
use crate::types::config::HarvestConfig;
use crate::types::fragment::{FragmentQuery, RawFragment};
use crate::types::run::{ExhaustionCause, StopReason};

/// Receives newly revealed fragments.
pub trait FragmentSink {
    /// Consume one fragment. Called in DOM order.
    fn accept(&mut self, fragment: RawFragment);

    /// Whether the caller's result cap is already met.
    fn is_satisfied(&self) -> bool;
}

/// What one pagination pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSummary {
    pub stop: StopReason,
    /// Reveal actions that succeeded
    pub reveal_cycles: usize,
    /// Distinct fragments captured
    pub fragments_seen: usize,
}

/// Drives the reveal control of one feed view.
#[derive(Debug, Clone)]
pub struct Paginator {
    query: FragmentQuery,
    reveal: RevealControl,
    max_cycles: usize,
    empty_cycles_before_exhausted: usize,
    politeness_delay: Duration,
    retry: RetryPolicy,
    deadline: Option<Instant>,
}

impl Paginator {
    pub fn new(
        query: FragmentQuery,
        reveal: RevealControl,
        max_cycles: usize,
        config: &HarvestConfig,
    ) -> Self {
        Self {
            query,
            reveal,
            max_cycles,
            empty_cycles_before_exhausted: config.empty_cycles_before_exhausted.max(1),
            politeness_delay: config.politeness_delay,
            retry: config.retry.clone(),
            deadline: None,
        }
    }

    /// Stop with [`StopReason::Cancelled`] once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run until a stop condition holds. Never fails: driver errors end the
    /// pass with an `Exhausted` stop and whatever the sink already holds.
    pub async fn drive<D: BrowserDriver>(
        &self,
        session: &Session<D>,
        sink: &mut impl FragmentSink,
        cancel: &CancellationToken,
    ) -> PaginationSummary {
        let driver = session.driver();
        let mut seen: HashSet<String> = HashSet::new();
        let mut reveal_cycles = 0;
        let mut fragments_seen = 0;
        let mut empty_streak = 0;

        let finish = |stop: StopReason, reveal_cycles: usize, fragments_seen: usize| {
            info!(
                stop = %stop,
                reveal_cycles,
                fragments_seen,
                "Pagination stopped"
            );
            PaginationSummary {
                stop,
                reveal_cycles,
                fragments_seen,
            }
        };

        if sink.is_satisfied() {
            return finish(StopReason::CapReached, 0, 0);
        }

        loop {
            let captured = match with_retry(
                &self.retry,
                "capture",
                |e: &DriverError| e.is_transient(),
                || driver.capture(&self.query),
            )
            .await
            {
                Ok(fragments) => fragments,
                Err(e) => {
                    return finish(driver_stop(session, &e), reveal_cycles, fragments_seen);
                }
            };

            let fresh: Vec<RawFragment> = captured
                .into_iter()
                .filter(|f| seen.insert(f.fingerprint()))
                .collect();
            let new_fragments = fresh.len();
            fragments_seen += new_fragments;
            if new_fragments == 0 {
                empty_streak += 1;
            } else {
                empty_streak = 0;
            }
            debug!(cycle = reveal_cycles, new_fragments, empty_streak, "Captured feed");

            for fragment in fresh {
                if sink.is_satisfied() {
                    break;
                }
                sink.accept(fragment);
            }

            let stop = if sink.is_satisfied() {
                Some(StopReason::CapReached)
            } else if empty_streak >= self.empty_cycles_before_exhausted {
                Some(StopReason::Exhausted(ExhaustionCause::NoNewFragments))
            } else if reveal_cycles >= self.max_cycles {
                Some(StopReason::MaxCycles)
            } else if cancel.is_cancelled() || self.deadline_passed() {
                Some(StopReason::Cancelled)
            } else {
                None
            };
            if let Some(stop) = stop {
                return finish(stop, reveal_cycles, fragments_seen);
            }

            if self.reveal.scroll_before {
                if let Err(e) = with_retry(
                    &self.retry,
                    "scroll",
                    |e: &DriverError| e.is_transient(),
                    || driver.scroll_to_bottom(),
                )
                .await
                {
                    return finish(driver_stop(session, &e), reveal_cycles, fragments_seen);
                }
            }

            // Not retried: the error may arrive after the click landed.
            let clicked = driver
                .click(&self.reveal.selector, self.reveal.text.as_deref())
                .await;
            match clicked {
                Ok(true) => reveal_cycles += 1,
                Ok(false) => {
                    debug!(selector = %self.reveal.selector, "No reveal control left");
                    return finish(
                        StopReason::Exhausted(ExhaustionCause::NoRevealControl),
                        reveal_cycles,
                        fragments_seen,
                    );
                }
                Err(e) => {
                    return finish(driver_stop(session, &e), reveal_cycles, fragments_seen);
                }
            }

            tokio::select! {
                biased;
                _ = interrupted(cancel, self.deadline) => {
                    return finish(StopReason::Cancelled, reveal_cycles, fragments_seen);
                }
                _ = tokio::time::sleep(self.politeness_delay) => {}
            }
        }
    }
}

/// Stop reason for a driver error that outlived its retries.
fn driver_stop<D: BrowserDriver>(session: &Session<D>, error: &DriverError) -> StopReason {
    if error.is_transient() {
        warn!(error = %error, "Transient failures persisted; keeping partial results");
        StopReason::Exhausted(ExhaustionCause::TransientFailures)
    } else {
        warn!(error = %error, "Browser failure during pagination; keeping partial results");
        if matches!(error, DriverError::Closed) {
            session.invalidate();
        }
        StopReason::Exhausted(ExhaustionCause::DriverFailure)
    }
}

/// Resolves once `cancel` fires or `deadline` passes.
pub(crate) async fn interrupted(cancel: &CancellationToken, deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
            }
        }
        None => cancel.cancelled().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;
    use crate::testing::{DriverCall, MockDriver, MockLauncher};

    /// Collects fragments up to a cap.
    #[derive(Default)]
    struct VecSink {
        fragments: Vec<RawFragment>,
        cap: Option<usize>,
    }

    impl FragmentSink for VecSink {
        fn accept(&mut self, fragment: RawFragment) {
            self.fragments.push(fragment);
        }

        fn is_satisfied(&self) -> bool {
            self.cap.is_some_and(|cap| self.fragments.len() >= cap)
        }
    }

    fn frag(n: usize) -> RawFragment {
        RawFragment::new(n, format!("<article>item {}</article>", n))
    }

    fn paginator(max_cycles: usize) -> Paginator {
        Paginator::new(
            FragmentQuery::new("article"),
            RevealControl {
                selector: "button.more".to_string(),
                text: None,
                scroll_before: false,
            },
            max_cycles,
            &HarvestConfig::immediate(),
        )
    }

    async fn run(driver: MockDriver, paginator: Paginator, sink: &mut VecSink) -> PaginationSummary {
        let manager = SessionManager::new(MockLauncher::new(driver), HarvestConfig::immediate());
        let session = manager.open(None).await.unwrap();
        let summary = paginator
            .drive(&session, sink, &CancellationToken::new())
            .await;
        session.close().await;
        summary
    }

    #[tokio::test]
    async fn test_new_fragments_only_in_dom_order() {
        let driver = MockDriver::new()
            .signed_in()
            .with_cycle(vec![frag(0), frag(1)])
            .with_cycle(vec![frag(0), frag(1), frag(2), frag(3)])
            .with_reveal_limit(1);
        let mut sink = VecSink::default();
        let summary = run(driver, paginator(10), &mut sink).await;

        let positions: Vec<_> = sink.fragments.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert_eq!(summary.fragments_seen, 4);
        assert_eq!(summary.reveal_cycles, 1);
        assert_eq!(
            summary.stop,
            StopReason::Exhausted(ExhaustionCause::NoRevealControl)
        );
    }

    #[tokio::test]
    async fn test_two_empty_cycles_exhaust() {
        let driver = MockDriver::new()
            .signed_in()
            .with_cycle(vec![frag(0)])
            .with_cycle(vec![frag(0)]);
        let mut sink = VecSink::default();
        let summary = run(driver, paginator(10), &mut sink).await;

        assert_eq!(
            summary.stop,
            StopReason::Exhausted(ExhaustionCause::NoNewFragments)
        );
        assert_eq!(sink.fragments.len(), 1);
        assert_eq!(summary.reveal_cycles, 2);
    }

    #[tokio::test]
    async fn test_cap_stops_before_next_reveal() {
        let driver = MockDriver::new()
            .signed_in()
            .with_cycle(vec![frag(0)])
            .with_cycle(vec![frag(0), frag(1), frag(2)]);
        let mut sink = VecSink {
            cap: Some(2),
            ..Default::default()
        };
        let summary = run(driver.clone(), paginator(10), &mut sink).await;

        assert_eq!(summary.stop, StopReason::CapReached);
        assert_eq!(sink.fragments.len(), 2);
        assert_eq!(driver.reveal_clicks(), 1);
    }

    #[tokio::test]
    async fn test_max_cycles_bound() {
        let driver = MockDriver::new().signed_in().with_growing_feed();
        let mut sink = VecSink::default();
        let summary = run(driver.clone(), paginator(3), &mut sink).await;

        assert_eq!(summary.stop, StopReason::MaxCycles);
        assert_eq!(summary.reveal_cycles, 3);
        assert_eq!(driver.reveal_clicks(), 3);
    }

    #[tokio::test]
    async fn test_transient_capture_failures_keep_partial_results() {
        let driver = MockDriver::new()
            .signed_in()
            .with_cycle(vec![frag(0)])
            .with_cycle(vec![frag(0), frag(1)]);
        let mut sink = VecSink::default();

        let manager = SessionManager::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate());
        let session = manager.open(None).await.unwrap();
        let paginator = paginator(10);

        // first capture succeeds, then every capture fails
        driver.fail_captures_after(1, DriverError::Transport("reset".into()));
        let summary = paginator
            .drive(&session, &mut sink, &CancellationToken::new())
            .await;

        assert_eq!(
            summary.stop,
            StopReason::Exhausted(ExhaustionCause::TransientFailures)
        );
        assert_eq!(sink.fragments.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reveal_is_not_clicked_again() {
        let driver = MockDriver::new()
            .signed_in()
            .with_cycle(vec![frag(0)])
            .with_cycle(vec![frag(0), frag(1)]);
        driver.fail_next_reveal(DriverError::Transport("response lost".into()));
        let mut sink = VecSink::default();
        let summary = run(driver.clone(), paginator(10), &mut sink).await;

        assert_eq!(
            summary.stop,
            StopReason::Exhausted(ExhaustionCause::TransientFailures)
        );
        let clicks = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::Click { .. }))
            .count();
        assert_eq!(clicks, 1);
        assert_eq!(driver.reveal_clicks(), 1);
        assert_eq!(sink.fragments.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_reveal() {
        let driver = MockDriver::new().signed_in().with_growing_feed();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let manager = SessionManager::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate());
        let session = manager.open(None).await.unwrap();
        let mut sink = VecSink::default();
        let summary = paginator(10).drive(&session, &mut sink, &cancel).await;

        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(driver.reveal_clicks(), 0);
        assert!(!sink.fragments.is_empty());
    }

    #[tokio::test]
    async fn test_scroll_before_reveal() {
        let driver = MockDriver::new()
            .signed_in()
            .with_cycle(vec![frag(0)])
            .with_reveal_limit(0);
        let mut paginator = paginator(10);
        paginator.reveal.scroll_before = true;
        let mut sink = VecSink::default();
        run(driver.clone(), paginator, &mut sink).await;

        let calls = driver.calls();
        let scroll = calls.iter().position(|c| matches!(c, DriverCall::Scroll));
        let click = calls
            .iter()
            .position(|c| matches!(c, DriverCall::Click { selector, .. } if selector == "button.more"));
        assert!(scroll.is_some());
        assert!(scroll < click);
    }
}
