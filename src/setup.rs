//! Novel setup records and their random synthesis.
//!
//! A [`NovelSetup`] is the durable identity of one generation job: who the
//! story is about, where it happens, and every summary produced so far. It
//! travels with the text through checkpoints, so everything here is serde.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

/// Genres the synthesis tables know about. Unknown genres still work; they
/// fall back to the generic pools.
pub const GENRES: &[&str] = &[
    "fantasy",
    "scifi",
    "mystery",
    "romance",
    "horror",
    "adventure",
    "historical",
    "urban",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protagonist {
    pub name: String,
    pub age: u32,
    pub traits: Vec<String>,
    pub strength: String,
    pub weakness: String,
    pub background: String,
    pub goal: String,
    pub motivation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldBuilding {
    pub setting: String,
    pub era: String,
    pub social_structure: String,
    pub theme: String,
}

/// One immutable summarization result, appended as the text grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Accumulated text length when this summary was produced.
    pub length_at_creation: usize,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub genre: String,
    pub language: String,
}

/// Durable identity and creative brief of one generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovelSetup {
    pub id: Uuid,
    pub genre: String,
    pub language: String,
    pub protagonist: Protagonist,
    pub world: WorldBuilding,
    pub themes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub summaries: Vec<Summary>,
    pub created_at: DateTime<Utc>,
}

impl NovelSetup {
    /// Synthesize a fresh setup for `genre` from the random tables.
    pub fn synthesize<R: Rng + ?Sized>(genre: &str, language: &str, rng: &mut R) -> Self {
        Self {
            id: Uuid::new_v4(),
            genre: genre.to_string(),
            language: language.to_string(),
            protagonist: Protagonist::synthesize(genre, rng),
            world: WorldBuilding::synthesize(genre, rng),
            themes: pick_many(theme_pool(genre), 2, rng),
            custom_prompt: None,
            summaries: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The most recent summary, if any summarization has happened yet.
    pub fn latest_summary(&self) -> Option<&Summary> {
        self.summaries.last()
    }
}

impl Protagonist {
    fn synthesize<R: Rng + ?Sized>(genre: &str, rng: &mut R) -> Self {
        let (names, age_range) = protagonist_pool(genre);
        Self {
            name: pick(names, rng),
            age: rng.gen_range(age_range.clone()),
            traits: pick_many(TRAITS, 3, rng),
            strength: pick(STRENGTHS, rng),
            weakness: pick(WEAKNESSES, rng),
            background: pick(BACKGROUNDS, rng),
            goal: pick(GOALS, rng),
            motivation: pick(MOTIVATIONS, rng),
        }
    }
}

impl WorldBuilding {
    fn synthesize<R: Rng + ?Sized>(genre: &str, rng: &mut R) -> Self {
        let world = world_pool(genre);
        Self {
            setting: pick(world.settings, rng),
            era: pick(world.eras, rng),
            social_structure: pick(world.structures, rng),
            theme: pick(theme_pool(genre), rng),
        }
    }
}

/// Pick a uniformly random genre.
pub fn random_genre<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(GENRES, rng)
}

/// A validated user-supplied prompt template, with the `[NAME]`-style
/// placeholders it references.
#[derive(Debug, Clone)]
pub struct CustomPrompt {
    pub template: String,
    pub placeholders: Vec<String>,
}

/// Validate a custom prompt override. Anything under 20 chars is rejected
/// as almost certainly a mistake.
pub fn validate_custom_prompt(raw: &str) -> Result<CustomPrompt, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.chars().count() < 20 {
        return Err(ConfigError::InvalidValue {
            key: "custom_prompt".to_string(),
            message: format!("too short ({} chars, need at least 20)", trimmed.chars().count()),
        });
    }

    let re = regex::Regex::new(r"\[([A-Z][A-Z0-9_]*)\]").map_err(|e| ConfigError::InvalidValue {
        key: "custom_prompt".to_string(),
        message: e.to_string(),
    })?;
    let mut placeholders: Vec<String> = re
        .captures_iter(trimmed)
        .map(|c| c[1].to_string())
        .collect();
    placeholders.sort();
    placeholders.dedup();

    Ok(CustomPrompt {
        template: trimmed.to_string(),
        placeholders,
    })
}

fn pick<R: Rng + ?Sized>(pool: &[&str], rng: &mut R) -> String {
    pool.choose(rng).copied().unwrap_or_default().to_string()
}

fn pick_many<R: Rng + ?Sized>(pool: &[&str], n: usize, rng: &mut R) -> Vec<String> {
    pool.choose_multiple(rng, n.min(pool.len()))
        .map(|s| s.to_string())
        .collect()
}

struct WorldPool {
    settings: &'static [&'static str],
    eras: &'static [&'static str],
    structures: &'static [&'static str],
}

fn protagonist_pool(genre: &str) -> (&'static [&'static str], std::ops::Range<u32>) {
    match genre {
        "fantasy" => (
            &["Aldric", "Lyra", "Theron", "Seraphine", "Kael", "Morwen"],
            16..45,
        ),
        "scifi" => (
            &["Nova", "Orion", "Vesper", "Cassian", "Echo", "Darian"],
            20..60,
        ),
        "mystery" => (
            &["Evelyn", "Marcus", "Adele", "Victor", "Iris", "Nathaniel"],
            28..65,
        ),
        "romance" => (
            &["Clara", "Julian", "Elise", "Adrian", "Margot", "Sebastian"],
            20..45,
        ),
        "horror" => (
            &["Abigail", "Thomas", "Eleanor", "Silas", "Ruth", "Edgar"],
            18..55,
        ),
        "historical" => (
            &["Eleanora", "Frederick", "Beatrice", "Edmund", "Constance", "Henry"],
            18..60,
        ),
        _ => (
            &["Alex", "Morgan", "Riley", "Jordan", "Casey", "Quinn"],
            18..50,
        ),
    }
}

fn world_pool(genre: &str) -> WorldPool {
    match genre {
        "fantasy" => WorldPool {
            settings: &[
                "a mountain kingdom riven by old oaths",
                "an archipelago where magic flows with the tides",
                "a walled city built atop a sleeping titan",
            ],
            eras: &["an age of fading magic", "the aftermath of a god-war", "a long dynastic peace"],
            structures: &["feudal houses bound by blood-debt", "guilds that outrank kings", "a priesthood holding the only maps"],
        },
        "scifi" => WorldPool {
            settings: &[
                "a generation ship three centuries from port",
                "a terraformed moon with a failing dome",
                "orbital habitats strung along a dead world",
            ],
            eras: &["the first contact decade", "after the network collapse", "the late expansion era"],
            structures: &["corporate charters in place of nations", "an AI-arbitrated council", "clans organized by ship of origin"],
        },
        "mystery" => WorldPool {
            settings: &[
                "a fog-bound port city of old money",
                "a university town with too many locked doors",
                "a resort island out of season",
            ],
            eras: &["the interwar years", "the present day", "the end of the last century"],
            structures: &["a police force nobody trusts", "families that own the courts", "a press hungrier than the law"],
        },
        "horror" => WorldPool {
            settings: &[
                "a valley town the highways forgot",
                "a renovated asylum turned hotel",
                "a fishing village with a sealed church",
            ],
            eras: &["the present day", "the 1920s", "an unplaceable rural decade"],
            structures: &["a town council that meets at night", "one family owning every deed", "a congregation that predates the town"],
        },
        _ => WorldPool {
            settings: &[
                "a sprawling city of contrasts",
                "a small community with long memories",
                "a frontier where rules are still being written",
            ],
            eras: &["the present day", "a generation ago", "the near future"],
            structures: &["old institutions under strain", "new money against old names", "communities governing themselves"],
        },
    }
}

fn theme_pool(genre: &str) -> &'static [&'static str] {
    match genre {
        "fantasy" => &["the price of power", "oaths against conscience", "what magic costs the ordinary"],
        "scifi" => &["what survives translation to machines", "home as a direction, not a place", "progress and its orphans"],
        "mystery" => &["the crimes respectability hides", "truth as a destructive force", "justice outside the law"],
        "romance" => &["love against obligation", "second chances", "the courage to be known"],
        "horror" => &["inherited guilt", "the rot beneath normalcy", "faith turned inward"],
        _ => &["identity under pressure", "loyalty and its limits", "the cost of ambition"],
    }
}

const TRAITS: &[&str] = &[
    "stubborn", "observant", "wry", "guarded", "impulsive", "meticulous",
    "loyal", "restless", "skeptical", "compassionate",
];
const STRENGTHS: &[&str] = &[
    "reads people instantly",
    "never forgets a detail",
    "keeps a cool head in chaos",
    "earns trust quickly",
    "improvises under pressure",
];
const WEAKNESSES: &[&str] = &[
    "trusts too slowly",
    "cannot leave a question unanswered",
    "carries every failure",
    "acts before asking",
    "hides weakness until it breaks",
];
const BACKGROUNDS: &[&str] = &[
    "raised far from where the story finds them",
    "trained for a life they abandoned",
    "the only one who walked away from a disaster",
    "heir to a name that opens and closes doors",
    "self-taught in everything that matters",
];
const GOALS: &[&str] = &[
    "to undo a harm they caused",
    "to find the person who vanished",
    "to claim a place that was promised",
    "to expose what everyone pretends not to see",
    "to get home, whatever home now means",
];
const MOTIVATIONS: &[&str] = &[
    "a debt owed to the dead",
    "a promise made too young to keep",
    "proof that they are not their family",
    "the one person who believed in them",
    "fear of becoming what they fight",
];
