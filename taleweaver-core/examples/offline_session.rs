//! Play a short story and write it to disk.
//!
//! Uses Claude when ANTHROPIC_API_KEY is set, otherwise a generator that
//! always fails, so every beat comes from the fallback library.
//!
//! Run with: `RUST_LOG=taleweaver_core=debug cargo run -p taleweaver-core --example offline_session`

use std::sync::Arc;
use std::time::Duration;
use taleweaver_core::generation::{CharacterView, WorldView};
use taleweaver_core::save::{autosave_path, load_save};
use taleweaver_core::{
    ClaudeGenerator, CoreConfig, FallbackLibrary, GameStateSnapshot, GenerationResult,
    InMemoryCatalog, JsonFileSink, NarrativeGenerator, ScriptedGenerator, SegmentKind,
    SessionConfig, StorySession,
};
use tracing_subscriber::EnvFilter;

fn print_beat(label: &str, result: &GenerationResult) {
    let source = match result.fallback_reason {
        None => "ai".to_string(),
        Some(reason) => format!("fallback: {reason}"),
    };
    println!("\n[{label}] ({source})");
    println!("   {}", result.content);
    for (i, choice) in result.choices.iter().flatten().enumerate() {
        println!("   {}. {}", i + 1, choice.text);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let generator: Arc<dyn NarrativeGenerator> =
        match ClaudeGenerator::from_env_with_timeout(Duration::from_secs(30)) {
            Ok(claude) => Arc::new(claude),
            Err(err) => {
                println!("No Claude client ({err}); running offline.");
                Arc::new(ScriptedGenerator::always_failing(
                    "Network error: offline demo",
                ))
            }
        };

    let catalog = InMemoryCatalog::new()
        .with_world(
            WorldView::new(
                "eldoria",
                "Eldoria",
                "fantasy",
                "A kingdom of ancient forests and sleeping magic",
            )
            .with_tags(["forest", "magic"]),
        )
        .with_character(CharacterView::new("lyra", "Lyra", "a wary half-elf ranger"));

    let save_dir = std::env::temp_dir().join("taleweaver-demo");
    let sink = JsonFileSink::new(autosave_path(&save_dir, "eldoria"));
    let config = SessionConfig::from_core(&CoreConfig::from_env()).with_session_id("eldoria");

    let mut session = StorySession::with_catalog(
        generator,
        FallbackLibrary::builtin()?,
        Arc::new(catalog),
        Arc::new(sink.clone()),
        config,
    );

    let opening = session.begin("eldoria", &["lyra".to_string()]).await?;
    print_beat("opening", &opening);

    let request = session.next_request(SegmentKind::Scene).with_choices();
    let scene = session.advance(request).await?;
    print_beat("scene", &scene);

    if let Some(choice) = scene.choices.as_ref().and_then(|c| c.first()) {
        println!("\n> {}", choice.text);
        session.choose(choice.clone())?;
    }

    let request = session.next_request(SegmentKind::Dialogue);
    let dialogue = session.advance(request).await?;
    print_beat("dialogue", &dialogue);

    let status = session.end().await?;
    println!(
        "\nSession ended: {:?}, {} saves",
        status.state, status.total_saves
    );

    let saved = load_save::<GameStateSnapshot>(sink.path()).await?;
    println!(
        "Save at {} holds {} beats and {} choices ({})",
        sink.path().display(),
        saved.snapshot.narrative.len(),
        saved.snapshot.choices_made.len(),
        saved.saved_at
    );

    Ok(())
}
