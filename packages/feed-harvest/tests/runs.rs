//! Run lifecycle: session cleanup, rosters, normalization, cancellation and
//! single-profile extraction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use feed_harvest::{
    testing::DriverCall, AuthError, Credentials, DriverError, ExtractionError, FieldSource, HarvestConfig,
    Harvester, InferenceError, MockDriver, MockInference, MockLauncher, NavigationError,
    PageState, RawFragment, RunOutcome, RunState, StopReason, Target,
};
use tokio_util::sync::CancellationToken;

const POST_URL: &str = "https://www.linkedin.com/posts/acme_launch-activity-1";

fn comment(position: usize, body: &str) -> RawFragment {
    RawFragment::new(
        position,
        format!(
            r#"<article class="comments-comment-entity">
                <a class="comments-comment-meta__description-container" href="/in/commenter-{position}/">
                    <h3 class="comments-comment-meta__description">
                        <span class="comments-comment-meta__description-title">Commenter {position}</span>
                    </h3>
                    <div class="comments-comment-meta__description-subtitle">Engineer at Acme</div>
                </a>
                <span class="comments-comment-item__main-content">{body}</span>
            </article>"#
        ),
    )
}

fn card(position: usize, name: &str, slug: &str, headline: &str) -> RawFragment {
    RawFragment::new(
        position,
        format!(
            r#"<div class="org-people-profile-card__profile-info">
                <div class="artdeco-entity-lockup__title">
                    <a href="https://www.linkedin.com/in/{slug}?miniProfileUrn=abc"><div class="lt-line-clamp">{name}</div></a>
                </div>
                <div class="artdeco-entity-lockup__subtitle"><div class="lt-line-clamp">{headline}</div></div>
            </div>"#
        ),
    )
}

const PROFILE_JSON: &str = r#"```json
{
  "Name": "Ada Lovelace",
  "Headline": "Analyst",
  "Location": "London",
  "Experience": [{"Title": "Analyst", "Company": "Engine Co", "Start_Date": "1842", "End_Date": "1843"}],
  "Skills": ["Mathematics", "Notes"]
}
```"#;

#[tokio::test]
async fn test_launch_failure_is_auth_error() {
    let launcher = MockLauncher::new(MockDriver::new().signed_in())
        .failing_launch(DriverError::Launch("no chromium binary".to_string()));

    let result = Harvester::new(launcher, HarvestConfig::immediate())
        .extract_entities(&Target::post_comments(POST_URL), 5, None)
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, ExtractionError::Auth(AuthError::Launch(_))));
    assert_eq!(err.category(), "auth");
}

#[tokio::test]
async fn test_navigation_bounce_closes_session_once() {
    let driver = MockDriver::new().signed_in().with_route(
        POST_URL,
        PageState::new("https://www.linkedin.com/authwall?trk=x", "Sign Up"),
    );

    let result = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .extract_entities(&Target::post_comments(POST_URL), 5, None)
        .await;

    assert!(matches!(
        result,
        Err(ExtractionError::Navigation(NavigationError::AccessDenied { .. }))
    ));
    assert_eq!(driver.close_count(), 1);
    assert_eq!(driver.capture_count(), 0);
}

#[tokio::test]
async fn test_missing_post_is_not_found() {
    let driver = MockDriver::new()
        .signed_in()
        .with_route(POST_URL, PageState::new(POST_URL, "Page not found | LinkedIn"));

    let result = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .extract_entities(&Target::post_comments(POST_URL), 5, None)
        .await;

    assert!(matches!(
        result,
        Err(ExtractionError::Navigation(NavigationError::NotFound { .. }))
    ));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_comment_records_carry_meta() {
    let driver = MockDriver::new()
        .signed_in()
        .with_cycle(vec![comment(0, "Interested! ada@example.com")]);

    let report = Harvester::new(MockLauncher::new(driver), HarvestConfig::immediate())
        .extract_entities(&Target::post_comments(POST_URL), 1, None)
        .await
        .unwrap();

    let record = &report.records[0];
    assert_eq!(record.identity_key().as_str(), "ada@example.com");
    assert_eq!(record.display_name.as_deref(), Some("Commenter 0"));
    assert_eq!(record.headline.as_deref(), Some("Engineer at Acme"));
    assert_eq!(
        record.profile_url.as_deref(),
        Some("https://www.linkedin.com/in/commenter-0/")
    );
}

#[tokio::test]
async fn test_roster_by_company_name() {
    let driver = MockDriver::new()
        .signed_in()
        .with_attribute("a[href*='/company/']", "href", "/company/acme-corp/about/")
        .with_cycle(vec![
            card(0, "Grace Hopper", "grace", "CEO & Founder at Acme"),
            card(1, "LinkedIn Member", "hidden", "Engineer"),
        ])
        .with_cycle(vec![
            card(0, "Grace Hopper", "grace", "CEO & Founder at Acme"),
            card(1, "LinkedIn Member", "hidden", "Engineer"),
            card(2, "Alan Turing", "alan", "Engineer at Acme"),
        ])
        .with_reveal_limit(1);

    let report = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .extract_entities(&Target::company_name("Acme Corp"), 10, None)
        .await
        .unwrap();

    let keys: Vec<&str> = report.records.iter().map(|r| r.identity_key().as_str()).collect();
    assert_eq!(
        keys,
        vec!["https://www.linkedin.com/in/grace", "https://www.linkedin.com/in/alan"]
    );
    assert!(report.records[0].designation_score() >= 2);
    assert_eq!(report.records[1].designation_score(), 0);
    assert_eq!(report.fragments_rejected, 1);

    let calls = driver.calls();
    assert!(calls.contains(&DriverCall::Goto(
        "https://www.linkedin.com/company/acme-corp/people/".to_string()
    )));
    // rosters scroll before every reveal
    let scroll = calls.iter().position(|c| *c == DriverCall::Scroll).unwrap();
    let reveal = calls
        .iter()
        .position(|c| matches!(c, DriverCall::Click { selector, .. } if selector.contains("load-button")))
        .unwrap();
    assert!(scroll < reveal);
}

#[tokio::test]
async fn test_unknown_company_is_not_found() {
    let driver = MockDriver::new().signed_in();

    let result = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .extract_entities(&Target::company_name("Nowhere Ltd"), 10, None)
        .await;

    assert!(matches!(
        result,
        Err(ExtractionError::Navigation(NavigationError::NotFound { .. }))
    ));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_normalization_enriches_records() {
    let driver = MockDriver::new()
        .signed_in()
        .with_cycle(vec![comment(0, "a@x.com"), comment(1, "b@x.com")]);
    let inference = MockInference::new().with_response(PROFILE_JSON);

    let report = Harvester::new(MockLauncher::new(driver), HarvestConfig::immediate().normalize())
        .with_inference(Arc::new(inference.clone()))
        .extract_entities(&Target::post_comments(POST_URL), 2, None)
        .await
        .unwrap();

    assert_eq!(inference.calls().len(), 2);
    assert_eq!(report.normalization_fallbacks, 0);
    assert!(report.states.contains(&RunState::Normalizing));
    for record in &report.records {
        let fields = record.structured.as_ref().unwrap();
        assert_eq!(fields.source, FieldSource::Inference);
        assert_eq!(fields.experience, "Analyst at Engine Co (1842 - 1843)");
        assert_eq!(fields.skills, "Mathematics, Notes");
    }
    // keys survive enrichment
    assert_eq!(report.records[0].identity_key().as_str(), "a@x.com");
}

#[tokio::test]
async fn test_normalization_failure_falls_back() {
    let driver = MockDriver::new()
        .signed_in()
        .with_cycle(vec![comment(0, "a@x.com"), comment(1, "b@x.com")]);
    let inference = MockInference::new().with_failure(InferenceError::Api {
        status: 400,
        message: "bad request".to_string(),
    });

    let report = Harvester::new(MockLauncher::new(driver), HarvestConfig::immediate().normalize())
        .with_inference(Arc::new(inference))
        .extract_entities(&Target::post_comments(POST_URL), 2, None)
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    assert_eq!(report.normalization_fallbacks, 2);
    assert_eq!(report.outcome, RunOutcome::Complete);
    let fields = report.records[1].structured.as_ref().unwrap();
    assert!(fields.is_fallback());
    assert_eq!(fields.name, "Commenter 1");
}

#[tokio::test]
async fn test_cancelled_run_keeps_partial_results() {
    let driver = MockDriver::new().signed_in().with_cycle(vec![comment(0, "a@x.com")]);
    let inference = MockInference::new().with_response(PROFILE_JSON);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Harvester::new(
        MockLauncher::new(driver.clone()),
        HarvestConfig::immediate().normalize(),
    )
    .with_inference(Arc::new(inference.clone()))
    .extract_entities_with_cancel(&Target::post_comments(POST_URL), 5, None, &cancel)
    .await
    .unwrap();

    assert_eq!(report.len(), 1);
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert!(report.is_partial());
    assert!(inference.calls().is_empty());
    assert!(!report.states.contains(&RunState::Normalizing));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_deadline_stops_run() {
    let driver = MockDriver::new().signed_in().with_growing_feed();
    let config = HarvestConfig::immediate()
        .with_politeness_delay(Duration::from_millis(20))
        .with_deadline(Duration::from_millis(60))
        .with_max_cycles(1_000);

    let report = Harvester::new(MockLauncher::new(driver.clone()), config)
        .extract_entities(&Target::post_comments(POST_URL), 5, None)
        .await
        .unwrap();

    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert!(driver.reveal_clicks() < 1_000);
    assert_eq!(driver.close_count(), 1);
}

fn five_commenters() -> MockDriver {
    MockDriver::new().signed_in().with_cycle(
        (0..5)
            .map(|i| comment(i, &format!("reach me at c{}@x.com", i)))
            .collect(),
    )
}

fn slow_inference() -> MockInference {
    MockInference::new()
        .with_response(PROFILE_JSON)
        .with_delay(Duration::from_millis(300))
}

fn all_fallback(report: &feed_harvest::RunReport) -> bool {
    report
        .records
        .iter()
        .all(|r| r.structured.as_ref().is_some_and(|f| f.is_fallback()))
}

#[tokio::test]
async fn test_deadline_during_normalization_keeps_records() {
    let driver = five_commenters();
    let inference = slow_inference();
    let config = HarvestConfig::immediate()
        .normalize()
        .with_deadline(Duration::from_millis(100));

    let started = Instant::now();
    let report = Harvester::new(MockLauncher::new(driver.clone()), config)
        .with_inference(Arc::new(inference.clone()))
        .extract_entities(&Target::post_comments(POST_URL), 5, None)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(report.len(), 5);
    assert_eq!(report.normalization_fallbacks, 5);
    assert!(all_fallback(&report));
    assert_eq!(inference.calls().len(), 1);
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_cancel_during_normalization_keeps_records() {
    let driver = five_commenters();
    let inference = slow_inference();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = Harvester::new(
        MockLauncher::new(driver.clone()),
        HarvestConfig::immediate().normalize(),
    )
    .with_inference(Arc::new(inference.clone()))
    .extract_entities_with_cancel(&Target::post_comments(POST_URL), 5, None, &cancel)
    .await
    .unwrap();

    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(report.len(), 5);
    assert_eq!(report.stop_reason, StopReason::CapReached);
    assert_eq!(report.normalization_fallbacks, 5);
    assert!(all_fallback(&report));
    // keys come from the extractor, not the fallback
    assert_eq!(report.records[4].identity_key().as_str(), "c4@x.com");
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_cancel_during_login_closes_session() {
    let driver = MockDriver::new()
        .with_slow_login(Duration::from_secs(5))
        .with_cycle(vec![comment(0, "a@x.com")]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .extract_entities_with_cancel(
            &Target::post_comments(POST_URL),
            5,
            Some(Credentials::new("ada@example.com", "pw")),
            &cancel,
        )
        .await;

    assert!(matches!(
        result,
        Err(ExtractionError::Auth(AuthError::Interrupted))
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(driver.capture_count(), 0);
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_transient_capture_failure_is_partial() {
    let driver = MockDriver::new()
        .signed_in()
        .with_cycle(vec![comment(0, "a@x.com")])
        .with_cycle(vec![comment(0, "a@x.com"), comment(1, "b@x.com")]);
    driver.fail_captures_after(1, DriverError::Transport("connection reset".to_string()));

    let report = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .extract_entities(&Target::post_comments(POST_URL), 5, None)
        .await
        .unwrap();

    assert_eq!(report.len(), 1);
    assert!(report.is_partial());
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_extract_profile_with_inference() {
    let driver = MockDriver::new()
        .signed_in()
        .with_body_text("Home\nSkip to search\nAda Lovelace\nAnalyst\nLondon\n");
    let inference = MockInference::new().with_response(PROFILE_JSON);

    let profile = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .with_inference(Arc::new(inference.clone()))
        .extract_profile("https://www.linkedin.com/in/ada/", None)
        .await
        .unwrap();

    assert_eq!(profile.profile_url, "https://www.linkedin.com/in/ada/");
    assert_eq!(profile.fields.name, "Ada Lovelace");
    assert_eq!(profile.fields.location, "London");
    assert!(!profile.fields.is_fallback());
    assert!(!profile.cleaned_text.contains("Skip to search"));
    assert!(inference.calls()[0].contains("Ada Lovelace"));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_extract_profile_without_inference() {
    let driver = MockDriver::new()
        .signed_in()
        .with_body_text("Skip to search\nAda Lovelace\nAnalyst at Engine Co\nWrote the first program");

    let profile = Harvester::new(MockLauncher::new(driver), HarvestConfig::immediate())
        .extract_profile("https://www.linkedin.com/in/ada/", None)
        .await
        .unwrap();

    assert!(profile.fields.is_fallback());
    assert_eq!(profile.fields.name, "Ada Lovelace");
    assert_eq!(profile.fields.headline, "Analyst at Engine Co");
    assert_eq!(profile.fields.about, "Wrote the first program");
}

#[tokio::test]
async fn test_extract_profile_empty_page() {
    let driver = MockDriver::new().signed_in();

    let result = Harvester::new(MockLauncher::new(driver.clone()), HarvestConfig::immediate())
        .extract_profile("https://www.linkedin.com/in/ghost/", None)
        .await;

    assert!(matches!(
        result,
        Err(ExtractionError::Navigation(NavigationError::NotFound { .. }))
    ));
    assert_eq!(driver.close_count(), 1);
}

#[tokio::test]
async fn test_extract_profile_rejects_bad_url() {
    let launcher = MockLauncher::new(MockDriver::new().signed_in());
    let harvester = Harvester::new(launcher.clone(), HarvestConfig::immediate());

    let result = harvester.extract_profile("not a url", None).await;

    assert!(matches!(
        result,
        Err(ExtractionError::Navigation(NavigationError::InvalidTarget { .. }))
    ));
    assert_eq!(launcher.launch_count(), 0);
}
