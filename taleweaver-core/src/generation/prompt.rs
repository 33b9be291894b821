//! Prompt construction for the Claude-backed generator.

use super::types::GenerationRequest;
use crate::segment::SegmentKind;

fn describe(kind: SegmentKind) -> &'static str {
    match kind {
        SegmentKind::Scene => "a scene description",
        SegmentKind::Dialogue => "a short exchange of dialogue",
        SegmentKind::Action => "the outcome of the player's action",
        SegmentKind::Transition => "a transition to a new place or time",
        SegmentKind::InitialScene => "the opening scene of the story",
        SegmentKind::Choice => "a moment of decision for the player",
    }
}

/// System prompt: narrator role plus the response format.
pub fn system_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "You are the narrator of an interactive {} story. Write vivid, \
         second-person prose that keeps the player at the centre of the action. \
         Never break character or mention that you are an AI.\n\n",
        request.context.theme
    );

    prompt.push_str(
        "Respond with a single JSON object and nothing else, in this shape:\n\
         {\"content\": \"<the narration>\"",
    );
    if request.parameters.include_choices {
        prompt.push_str(
            ", \"choices\": [{\"text\": \"<what the player can do>\", \
             \"outcome\": \"<short hint of the consequence>\"}]}\n\
             Offer two to four distinct choices.",
        );
    } else {
        prompt.push('}');
    }
    prompt
}

/// User prompt: the beat to write and the story so far.
pub fn user_prompt(request: &GenerationRequest) -> String {
    let context = &request.context;
    let mut prompt = format!(
        "Write {} in at most {} characters.\n",
        describe(request.segment_kind),
        request.parameters.max_length
    );

    if !context.tags.is_empty() {
        let tags: Vec<&str> = context.tags.iter().map(String::as_str).collect();
        prompt.push_str(&format!("Story tags: {}\n", tags.join(", ")));
    }

    for note in &context.notes {
        prompt.push_str(note);
        prompt.push('\n');
    }

    if !context.recent_segments.is_empty() {
        prompt.push_str("\nThe story so far:\n");
        for segment in &context.recent_segments {
            prompt.push_str("- ");
            prompt.push_str(segment);
            prompt.push('\n');
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::types::GenerationContext;

    #[test]
    fn test_prompts_carry_context() {
        let request = GenerationRequest::new(
            SegmentKind::Scene,
            GenerationContext::new("fantasy")
                .with_tags(["forest"])
                .with_recent_segments(vec!["You wake by a campfire.".to_string()])
                .with_note("World: Eldoria"),
        )
        .with_choices()
        .with_max_length(300);

        let system = system_prompt(&request);
        assert!(system.contains("fantasy"));
        assert!(system.contains("\"choices\""));

        let user = user_prompt(&request);
        assert!(user.contains("a scene description"));
        assert!(user.contains("300 characters"));
        assert!(user.contains("forest"));
        assert!(user.contains("World: Eldoria"));
        assert!(user.contains("You wake by a campfire."));
    }

    #[test]
    fn test_no_choices_requested() {
        let request = GenerationRequest::new(SegmentKind::Dialogue, GenerationContext::new("horror"));
        assert!(!system_prompt(&request).contains("choices"));
        assert!(!user_prompt(&request).contains("story so far"));
    }
}
