//! Player choices for fallback segments.
//!
//! Curated entries may carry their own choices. Otherwise choices are
//! derived from the entry's tags, and when no tag is recognized a generic
//! set is used so a choice-bearing request never comes back empty.

use super::library::FallbackEntry;
use crate::segment::Choice;

/// Most choices derived for one segment.
const MAX_DERIVED_CHOICES: usize = 3;

/// Tag → (choice text, outcome hint).
const TAG_CHOICES: &[(&str, &str, &str)] = &[
    ("forest", "Follow the hidden trail deeper into the woods", "Discover what the forest hides"),
    ("town", "Ask around for news", "Learn what the locals know"),
    ("tavern", "Buy a round and listen to the gossip", "Pick up a rumour or two"),
    ("city", "Blend into the crowd", "Move unseen through the streets"),
    ("ruins", "Search the ruins carefully", "Uncover something long buried"),
    ("magic", "Study the source of the magic", "Understand the power at work"),
    ("combat", "Stand your ground and fight", "Face the threat head-on"),
    ("danger", "Fall back to safety", "Regroup before the danger closes in"),
    ("stealth", "Stay hidden and watch", "Gain the advantage of surprise"),
    ("chase", "Keep running", "Put distance between you and your pursuer"),
    ("travel", "Press on without resting", "Reach your destination sooner"),
    ("rest", "Make camp for the night", "Recover your strength"),
    ("clue", "Examine the clue closely", "Piece together what really happened"),
    ("suspect", "Confront the suspect", "Force the truth into the open"),
    ("companion", "Ask your companion what they think", "Hear another perspective"),
    ("ship", "Check the ship's systems", "Find out what is failing"),
    ("space", "Scan the surrounding space", "Spot what is out there"),
    ("house", "Explore the next room", "Learn more about the house"),
    ("night", "Wait for daylight", "Face what comes with clearer eyes"),
    ("crossroads", "Take the left path", "See where the unfamiliar road leads"),
    ("warning", "Heed the warning", "Avoid a danger you cannot yet see"),
];

/// Choices used when nothing more specific can be derived.
pub fn generic_choices() -> Vec<Choice> {
    vec![
        Choice::new("Press forward", "Continue toward your goal"),
        Choice::new("Look around carefully", "Notice something you missed"),
        Choice::new("Take a moment to think", "Reconsider your next move"),
    ]
}

/// Choices derived from tags alone, in table order.
pub fn choices_from_tags<'a, I>(tags: I) -> Vec<Choice>
where
    I: IntoIterator<Item = &'a String>,
{
    let tags: Vec<&String> = tags.into_iter().collect();
    TAG_CHOICES
        .iter()
        .filter(|(tag, _, _)| tags.iter().any(|t| t.as_str() == *tag))
        .take(MAX_DERIVED_CHOICES)
        .map(|(_, text, outcome)| Choice::new(*text, *outcome))
        .collect()
}

/// Choices for a fallback entry: curated, then tag-derived, then generic.
pub fn choices_for_entry(entry: &FallbackEntry) -> Vec<Choice> {
    if !entry.choices.is_empty() {
        return entry.choices.clone();
    }

    let derived = choices_from_tags(&entry.tags);
    if derived.is_empty() {
        generic_choices()
    } else {
        derived
    }
}
