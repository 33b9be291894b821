//! Built-in curated content shipped with the crate.

use super::library::{FallbackEntry, FallbackLibrary, LibraryError};
use crate::segment::{Choice, SegmentKind, GENERIC_THEME};

use crate::segment::SegmentKind::{
    Action, Choice as ChoiceBeat, Dialogue, InitialScene, Scene, Transition,
};

type Row = (SegmentKind, &'static str, &'static str, &'static [&'static str]);

const GENERIC: &[Row] = &[
    (Scene, "generic-scene-1", "The world around you holds its breath. Somewhere ahead, the next part of your story is waiting to be written.", &["quiet", "day"]),
    (Scene, "generic-scene-2", "Shadows lengthen as the light fades. You take stock of your surroundings and of the road that brought you here.", &["dusk", "travel"]),
    (Scene, "generic-scene-3", "A gentle wind carries unfamiliar sounds. Every direction seems to promise something different.", &["outdoors", "wind"]),
    (Dialogue, "generic-dialogue-1", "\"We should keep moving,\" a voice says quietly. \"Whatever is out there won't wait for us.\"", &["companion", "urgent"]),
    (Dialogue, "generic-dialogue-2", "\"I've heard stories about this place,\" someone murmurs. \"Not all of them end well.\"", &["rumor", "warning"]),
    (Dialogue, "generic-dialogue-3", "\"Tell me what you saw,\" they ask, leaning closer. \"Leave nothing out.\"", &["question", "trust"]),
    (Action, "generic-action-1", "You act without hesitation. The moment passes in a blur, and when it settles, the situation has changed.", &["fast", "risk"]),
    (Action, "generic-action-2", "Carefully, deliberately, you make your move. Your patience is rewarded with a small but real advantage.", &["careful", "stealth"]),
    (Action, "generic-action-3", "You push forward with everything you have. It is not graceful, but it works.", &["combat", "strength"]),
    (Transition, "generic-transition-1", "Time passes. The path winds on, and with every step the last place you stood feels further behind.", &["travel", "time"]),
    (Transition, "generic-transition-2", "The scene shifts. What comes next will ask something new of you.", &["change"]),
    (Transition, "generic-transition-3", "You rest briefly, gather your thoughts, and set out again.", &["rest", "travel"]),
    (InitialScene, "generic-opening-1", "Your story begins at a threshold. Behind you lies everything familiar; ahead, everything that matters.", &["beginning", "threshold"]),
    (InitialScene, "generic-opening-2", "The first light of a new day finds you ready. Whatever comes, it starts here.", &["beginning", "day"]),
    (ChoiceBeat, "generic-choice-1", "Two paths open before you, and each asks for a different kind of courage.", &["crossroads"]),
    (ChoiceBeat, "generic-choice-2", "A decision cannot be put off any longer. All eyes turn toward you.", &["pressure", "companion"]),
];

const FANTASY: &[Row] = &[
    (Scene, "fantasy-scene-forest-1", "Sunlight filters through the ancient canopy, dappling the mossy forest floor. Birdsong echoes between trunks wider than any cottage.", &["forest", "day", "nature"]),
    (Scene, "fantasy-scene-forest-2", "Mist clings to the roots of the old forest. Somewhere deeper in, a twig snaps, and the birds fall silent.", &["forest", "dawn", "danger"]),
    (Scene, "fantasy-scene-forest-3", "The forest path opens onto a sunlit glade where wildflowers circle a weathered standing stone.", &["forest", "day", "magic"]),
    (Scene, "fantasy-scene-tavern", "The tavern is warm and loud. A bard tunes a lute by the hearth while travellers trade rumours over mugs of ale.", &["tavern", "night", "town"]),
    (Scene, "fantasy-scene-ruins", "Crumbling towers rise from the hillside, their stones etched with runes that glow faintly as you approach.", &["ruins", "magic", "dusk"]),
    (Dialogue, "fantasy-dialogue-1", "The old ranger spits into the fire. \"Those woods have eyes, friend. Keep to the path and keep your blade close.\"", &["forest", "warning", "ranger"]),
    (Dialogue, "fantasy-dialogue-2", "\"A quest, is it?\" The innkeeper chuckles. \"Everyone who sits at that table has a quest. Few come back to finish their ale.\"", &["tavern", "rumor"]),
    (Dialogue, "fantasy-dialogue-3", "The wizard's eyes narrow. \"Magic always takes its price. The question is whether you are willing to pay it.\"", &["magic", "mentor"]),
    (Action, "fantasy-action-1", "You draw your blade as the wolf lunges from the undergrowth. Steel flashes in the forest gloom.", &["forest", "combat", "beast"]),
    (Action, "fantasy-action-2", "You trace the rune in the air. It flares with pale fire and the sealed door groans open.", &["magic", "ruins"]),
    (Action, "fantasy-action-3", "You slip between the market stalls, the stolen map tucked under your cloak, as the guards shout behind you.", &["town", "stealth", "chase"]),
    (Transition, "fantasy-transition-1", "The road leaves the forest behind and climbs into the hills. By nightfall, the lights of a distant keep come into view.", &["forest", "travel", "night"]),
    (Transition, "fantasy-transition-2", "Days pass on the king's road. Your boots wear thin, but your resolve does not.", &["travel", "time"]),
    (InitialScene, "fantasy-opening-1", "Your journey begins at the edge of the Whispering Wood, where the village elders say the old magic still sleeps.", &["forest", "beginning", "magic"]),
    (InitialScene, "fantasy-opening-2", "The bells of the capital ring as you pass beneath its gate, a stranger with a purpose no one here yet knows.", &["town", "beginning", "day"]),
    (ChoiceBeat, "fantasy-choice-1", "The path forks at a lightning-struck oak: one way leads deeper into the forest, the other toward the river.", &["forest", "crossroads"]),
    (ChoiceBeat, "fantasy-choice-2", "The dragon lowers its head until its eye is level with yours. It is waiting for your answer.", &["dragon", "danger"]),
];

const SCIFI: &[Row] = &[
    (Scene, "scifi-scene-1", "The station's observation deck hums softly. Beyond the glass, a gas giant turns in silent, banded splendour.", &["station", "space", "quiet"]),
    (Scene, "scifi-scene-2", "Neon rain slicks the streets of the lower city. Drones drift overhead, scanning faces in the crowd.", &["city", "night", "surveillance"]),
    (Scene, "scifi-scene-3", "Red dust swirls around the abandoned colony dome. Its airlock light still blinks a patient amber.", &["planet", "ruins", "danger"]),
    (Dialogue, "scifi-dialogue-1", "\"Navigation's fried,\" the pilot mutters, slapping the console. \"We're flying on instinct and spare parts.\"", &["ship", "crew", "danger"]),
    (Dialogue, "scifi-dialogue-2", "The AI's voice is calm. \"I would advise against that course of action. Probability of success: eleven percent.\"", &["ai", "warning"]),
    (Action, "scifi-action-1", "You seal the bulkhead a heartbeat before the hull breach tears through the corridor behind you.", &["ship", "danger", "fast"]),
    (Action, "scifi-action-2", "Your fingers fly across the interface. Firewalls fall one after another until the vault's data is yours.", &["hacking", "stealth"]),
    (Transition, "scifi-transition-1", "The jump drive spools up. Stars smear into light, and then you are somewhere else entirely.", &["ship", "travel", "space"]),
    (Transition, "scifi-transition-2", "Hours blur together in the transit tube as the city's levels flash past outside.", &["city", "travel"]),
    (InitialScene, "scifi-opening-1", "You wake in a cryo pod to warning lights and an empty ship. The last log entry is three hundred years old.", &["ship", "beginning", "mystery"]),
    (InitialScene, "scifi-opening-2", "Your contract arrives at midnight: one job, no questions, and a payout big enough to buy your way off-world.", &["city", "beginning", "night"]),
    (ChoiceBeat, "scifi-choice-1", "Two distress signals, two directions, and fuel enough for only one.", &["space", "crossroads"]),
];

const HORROR: &[Row] = &[
    (Scene, "horror-scene-1", "The house is too quiet. Every door in the hallway stands open except the last one, and something behind it is breathing.", &["house", "night", "dread"]),
    (Scene, "horror-scene-2", "Fog swallows the forest road. Your headlights catch shapes between the trees that are gone when you look again.", &["forest", "night", "fog"]),
    (Dialogue, "horror-dialogue-1", "\"Don't go down there,\" the caretaker whispers, gripping your sleeve. \"Not after dark. Not ever.\"", &["warning", "basement"]),
    (Dialogue, "horror-dialogue-2", "The voice on the radio is your own, calmly describing where you are standing right now.", &["radio", "dread"]),
    (Action, "horror-action-1", "You run. Branches tear at your face, and behind you the footsteps match yours exactly.", &["forest", "chase", "fast"]),
    (Action, "horror-action-2", "You hold your breath and press yourself into the closet's darkness as the door handle slowly turns.", &["house", "stealth", "hide"]),
    (Transition, "horror-transition-1", "The clock strikes three. Outside, the streetlights go out one by one.", &["night", "time", "dread"]),
    (Transition, "horror-transition-2", "Dawn comes grey and reluctant, and it brings no comfort.", &["dawn", "time"]),
    (InitialScene, "horror-opening-1", "The inheritance letter said the house was yours. It did not mention that someone was still living in it.", &["house", "beginning", "mystery"]),
    (InitialScene, "horror-opening-2", "Your car dies on the forest road just past the sign for a town that isn't on any map.", &["forest", "beginning", "night"]),
    (ChoiceBeat, "horror-choice-1", "The cellar door is unlocked. The front door is not. You have seconds to decide.", &["house", "pressure"]),
];

const MYSTERY: &[Row] = &[
    (Scene, "mystery-scene-1", "Rain streaks the office window. On the desk, the victim's diary lies open to a page with one line torn away.", &["office", "rain", "clue"]),
    (Scene, "mystery-scene-2", "The manor's library smells of pipe smoke and old paper. One book on the shelf has no dust on it at all.", &["manor", "clue", "indoors"]),
    (Dialogue, "mystery-dialogue-1", "\"I was in the garden all evening,\" the butler insists, though his shoes are perfectly dry.", &["suspect", "lie", "manor"]),
    (Dialogue, "mystery-dialogue-2", "\"You're asking the wrong questions,\" the informant says, stubbing out a cigarette. \"Ask who benefits.\"", &["informant", "city", "clue"]),
    (Action, "mystery-action-1", "You kneel by the fireplace and sift the ashes. A fragment of a letter survives, bearing half a signature.", &["clue", "manor", "careful"]),
    (Action, "mystery-action-2", "You follow the suspect through the crowded market, always three stalls behind, never quite out of sight.", &["city", "stealth", "chase"]),
    (Transition, "mystery-transition-1", "By morning the papers have the story wrong, and the killer has one more night's head start.", &["time", "city"]),
    (Transition, "mystery-transition-2", "The train to the coast is nearly empty. You spend the journey rereading your notes.", &["travel", "clue"]),
    (InitialScene, "mystery-opening-1", "The telegram is only four words long: COME AT ONCE. MURDER. It is signed by a man buried last week.", &["beginning", "clue", "manor"]),
    (InitialScene, "mystery-opening-2", "Your first case as an investigator starts in a rain-soaked alley with a body and no name.", &["beginning", "city", "rain"]),
    (ChoiceBeat, "mystery-choice-1", "Every suspect is in the drawing room. It is time to name one of them.", &["suspect", "pressure"]),
];

/// Assemble the built-in library.
pub fn builtin_library() -> Result<FallbackLibrary, LibraryError> {
    let mut library = FallbackLibrary::new();

    let themes: [(&str, &[Row]); 5] = [
        (GENERIC_THEME, GENERIC),
        ("fantasy", FANTASY),
        ("sci-fi", SCIFI),
        ("horror", HORROR),
        ("mystery", MYSTERY),
    ];

    for (theme, rows) in themes {
        for &(kind, id, body, tags) in rows {
            let mut entry = FallbackEntry::new(id, body, tags.iter().copied());
            if id == "fantasy-choice-1" {
                entry = entry.with_choices(vec![
                    Choice::new("Follow the forest trail", "Deeper into the old woods"),
                    Choice::new("Head for the river", "Toward the fishing village"),
                ]);
            }
            library.add_entry(theme, kind, entry)?;
        }
    }

    Ok(library)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        let library = builtin_library().unwrap();
        assert!(library.len() > 50);
        assert_eq!(
            library.themes(),
            vec!["fantasy", "generic", "horror", "mystery", "sci-fi"]
        );
    }

    #[test]
    fn test_generic_covers_every_kind() {
        let library = builtin_library().unwrap();
        for kind in SegmentKind::ALL {
            assert!(
                library.bucket(GENERIC_THEME, kind).len() >= 2,
                "generic bucket for {kind} should have at least two entries"
            );
        }
    }

    #[test]
    fn test_fantasy_has_forest_scenes() {
        let library = builtin_library().unwrap();
        let forest = library
            .bucket("fantasy", SegmentKind::Scene)
            .iter()
            .filter(|e| e.tags.contains("forest"))
            .count();
        assert!(forest >= 3);
    }
}
