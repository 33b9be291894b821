//! End-to-end story flow without network access.
//!
//! The generator is scripted, so these run in CI:
//! `cargo test -p taleweaver-core --test offline_flow`

use std::collections::HashSet;
use std::sync::Arc;
use taleweaver_core::fallback::FallbackLibrary;
use taleweaver_core::generation::{CharacterView, WorldView};
use taleweaver_core::testing::{
    assert_ai_generated, assert_fallback, assert_has_choices, assert_saved, assert_tagged,
    RecordingSink, ScriptedGenerator, ScriptedOutcome, TestHarness,
};
use taleweaver_core::{
    Choice, ErrorKind, GeneratedContent, GenerationContext, GenerationOrchestrator,
    GenerationRequest, InMemoryCatalog, SaveTrigger, SegmentKind, SessionConfig, StorySession,
};

fn eldoria() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_world(
            WorldView::new(
                "eldoria",
                "Eldoria",
                "Fantasy",
                "A kingdom of ancient forests and sleeping magic",
            )
            .with_tags(["forest", "magic"]),
        )
        .with_character(CharacterView::new("lyra", "Lyra", "a wary half-elf ranger"))
}

// =============================================================================
// Outage: the generator never answers
// =============================================================================

#[tokio::test]
async fn test_forest_story_survives_outage() {
    let generator = Arc::new(ScriptedGenerator::always_failing(
        "Network error: connection refused",
    ));
    let mut orchestrator = GenerationOrchestrator::new(
        generator.clone(),
        taleweaver_core::FallbackContentSelector::new(FallbackLibrary::builtin().unwrap()),
    )
    .with_catalog(Arc::new(eldoria()));

    let opening = orchestrator
        .generate_initial_scene("eldoria", &["lyra".to_string()])
        .await;
    assert_fallback(&opening, ErrorKind::Network);
    assert_tagged(&opening, "fantasy");
    assert_has_choices(&opening);
    assert_eq!(opening.metadata.retry_attempts, 2);
    assert_eq!(generator.calls(), 3);

    let mut seen = HashSet::new();
    let mut previous: Option<String> = None;
    for _ in 0..3 {
        let request = GenerationRequest::new(
            SegmentKind::Scene,
            GenerationContext::new("fantasy").with_tags(["forest"]),
        )
        .with_choices();
        let scene = orchestrator.generate_segment(request).await;

        assert_fallback(&scene, ErrorKind::Network);
        assert_tagged(&scene, "forest");
        assert_has_choices(&scene);
        assert_ne!(previous.as_deref(), Some(scene.content.as_str()));
        seen.insert(scene.content.clone());
        previous = Some(scene.content);
    }
    assert_eq!(seen.len(), 3, "three forest scenes should all be distinct");
}

#[tokio::test]
async fn test_daytime_forest_scene_during_overload() {
    let generator = Arc::new(ScriptedGenerator::always_failing("503 Service Unavailable"));
    let mut orchestrator = GenerationOrchestrator::new(
        generator,
        taleweaver_core::FallbackContentSelector::new(FallbackLibrary::builtin().unwrap()),
    );

    let request = GenerationRequest::new(
        SegmentKind::Scene,
        GenerationContext::new("fantasy").with_tags(["forest", "day"]),
    );
    let result = orchestrator.generate_segment(request).await;

    assert_fallback(&result, ErrorKind::ServiceUnavailable);
    assert_tagged(&result, "forest");
    assert_tagged(&result, "day");
    let entry_id = result.metadata.fallback_entry_id.clone().unwrap();
    assert!(entry_id.starts_with("fantasy-scene-forest"), "got {entry_id}");
    assert!(orchestrator.selector().usage_history().contains(&entry_id));
}

#[tokio::test]
async fn test_auth_failure_falls_back_immediately() {
    let generator = Arc::new(ScriptedGenerator::always_failing(
        "API error (status 401): invalid x-api-key",
    ));
    let mut orchestrator = GenerationOrchestrator::new(
        generator.clone(),
        taleweaver_core::FallbackContentSelector::new(FallbackLibrary::builtin().unwrap()),
    );

    let request = GenerationRequest::new(SegmentKind::Dialogue, GenerationContext::new("horror"));
    let result = orchestrator.generate_segment(request).await;
    assert_fallback(&result, ErrorKind::Auth);
    assert_eq!(result.metadata.retry_attempts, 0);
    assert_eq!(generator.calls(), 1);
    assert!(result.choices.is_none());
}

// =============================================================================
// Recovery: transient failures, then the generator answers
// =============================================================================

#[tokio::test]
async fn test_transient_failures_recover() {
    let generator = ScriptedGenerator::failing_then(
        2,
        "503 Service Unavailable",
        "Sunlight breaks through the canopy.",
    );
    let mut harness = TestHarness::new(generator).unwrap();

    let opening = harness.session.begin("anywhere", &[]).await.unwrap();
    assert_ai_generated(&opening);
    assert_eq!(opening.metadata.retry_attempts, 2);
    assert_eq!(opening.metadata.attempts.len(), 3);
    assert!(!opening.metadata.attempts[0].succeeded());
    assert!(opening.metadata.attempts[2].succeeded());
}

// =============================================================================
// Session: narrative beats drive saves
// =============================================================================

#[tokio::test]
async fn test_session_saves_follow_the_story() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        ScriptedOutcome::Content(GeneratedContent::text(
            "You stand at the edge of the Whispering Wood.",
        )),
        ScriptedOutcome::Content(
            GeneratedContent::text("Two trails wind between the trees.").with_choices(vec![
                Choice::new("Take the mossy trail", "Quiet and slow"),
                Choice::new("Take the rocky trail", "Fast but exposed"),
            ]),
        ),
    ]));
    let sink = RecordingSink::new();
    let mut session = StorySession::with_catalog(
        generator.clone(),
        FallbackLibrary::builtin().unwrap(),
        Arc::new(eldoria()),
        Arc::new(sink.clone()),
        SessionConfig::new().with_session_id("eldoria-run"),
    );

    let opening = session
        .begin("eldoria", &["lyra".to_string()])
        .await
        .unwrap();
    assert_ai_generated(&opening);
    assert_tagged(&opening, "fantasy");

    let request = session
        .next_request(SegmentKind::Transition)
        .with_choices();
    assert_eq!(request.context.theme, "fantasy");
    assert_eq!(request.context.world_id.as_deref(), Some("eldoria"));
    let transition = session.advance(request).await.unwrap();
    let choices = transition.choices.clone().unwrap();
    assert_eq!(choices.len(), 2);

    session.saves().wait_idle().await;
    session.choose(choices[0].clone()).unwrap();
    let status = session.end().await.unwrap();

    let saves = sink.persisted();
    let triggers: Vec<SaveTrigger> = saves.iter().map(|(_, t)| *t).collect();
    assert_eq!(triggers.first(), Some(&SaveTrigger::SceneChange));
    assert_eq!(triggers.last(), Some(&SaveTrigger::Manual));
    assert_saved(&status, saves.len() as u64);

    let (last, _) = saves.last().unwrap();
    assert_eq!(last.session_id, "eldoria-run");
    assert_eq!(last.world_id.as_deref(), Some("eldoria"));
    assert_eq!(last.character_ids, vec!["lyra".to_string()]);
    assert_eq!(last.narrative.len(), 2);
    assert_eq!(last.choices_made[0].text, "Take the mossy trail");
}

#[tokio::test]
async fn test_failed_save_is_reported_and_retried() {
    let mut harness = TestHarness::new(ScriptedGenerator::new(vec![])).unwrap();
    harness.sink.fail_next("Persistence failed: connection reset");

    harness.session.begin("anywhere", &[]).await.unwrap();
    let status = harness.session.saves().wait_idle().await;
    assert!(status.is_error());
    assert!(status.can_retry());
    assert_eq!(status.error.unwrap().kind, ErrorKind::Network);

    harness.session.saves().retry().await.unwrap();
    assert_saved(&harness.session.save_status(), 1);
    assert_eq!(harness.settled_saves().await.len(), 1);
}
