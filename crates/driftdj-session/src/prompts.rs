//! Prompt model, presets and bootstrap
//!
//! Prompts persist as a JSON array; a fresh install is seeded with a
//! random handful of genre presets, two of them active.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Genre texts offered for new prompts
pub const PROMPT_TEXT_PRESETS: [&str; 16] = [
    "Bossa Nova",
    "Minimal Techno",
    "Drum and Bass",
    "Post Punk",
    "Shoegaze",
    "Funk",
    "Chiptune",
    "Lush Strings",
    "Sparkling Arpeggios",
    "Staccato Rhythms",
    "Punchy Kick",
    "Dubstep",
    "K Pop",
    "Neo Soul",
    "Trip Hop",
    "Thrash",
];

/// Display palette; bootstrap keeps colors distinct while it can
pub const PROMPT_COLORS: [&str; 8] = [
    "#9900ff", "#5200ff", "#ff25f6", "#2af6de", "#ffdd28", "#3dffab", "#d8ff3e", "#d9b2ff",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub prompt_id: String,
    pub text: String,
    /// Blend weight, 0 (muted) to 2
    pub weight: f64,
    pub color: String,
    /// Locked prompts refuse removal
    #[serde(default)]
    pub locked: bool,
}

/// Pick a random palette color not yet in `used`
///
/// Falls back to any palette color once all eight are taken.
pub fn unused_color(used: &[String], rng: &mut StdRng) -> String {
    let available: Vec<&str> = PROMPT_COLORS
        .iter()
        .copied()
        .filter(|c| !used.iter().any(|u| u == c))
        .collect();
    let pool = if available.is_empty() {
        &PROMPT_COLORS[..]
    } else {
        &available[..]
    };
    // The pools are never empty, but a silent fallback beats a panic
    pool.choose(rng).copied().unwrap_or(PROMPT_COLORS[0]).to_string()
}

/// Build the first-run prompt set
///
/// Up to four preset texts chosen at random with distinct colors, two
/// of them given weight 1 so the stream starts audible.
pub fn default_prompts(rng: &mut StdRng) -> Vec<Prompt> {
    let count = 4.min(PROMPT_TEXT_PRESETS.len());

    let mut texts: Vec<&str> = PROMPT_TEXT_PRESETS.to_vec();
    texts.shuffle(rng);

    let mut used_colors: Vec<String> = Vec::new();
    let mut prompts: Vec<Prompt> = Vec::with_capacity(count);
    for (i, text) in texts.iter().take(count).enumerate() {
        let color = unused_color(&used_colors, rng);
        used_colors.push(color.clone());
        prompts.push(Prompt {
            prompt_id: format!("prompt-{}", i),
            text: text.to_string(),
            weight: 0.0,
            color,
            locked: false,
        });
    }

    // Activate two at random
    let mut order: Vec<usize> = (0..prompts.len()).collect();
    order.shuffle(rng);
    for &idx in order.iter().take(2) {
        prompts[idx].weight = 1.0;
    }

    prompts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_default_prompts_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let prompts = default_prompts(&mut rng);

        assert_eq!(prompts.len(), 4);

        // Distinct texts and colors
        for i in 0..prompts.len() {
            for j in (i + 1)..prompts.len() {
                assert_ne!(prompts[i].text, prompts[j].text);
                assert_ne!(prompts[i].color, prompts[j].color);
            }
        }

        // Exactly two active
        let active = prompts.iter().filter(|p| p.weight == 1.0).count();
        assert_eq!(active, 2);
        assert!(prompts.iter().all(|p| !p.locked));
    }

    #[test]
    fn test_unused_color_avoids_used() {
        let mut rng = StdRng::seed_from_u64(3);
        let used: Vec<String> = PROMPT_COLORS[..7].iter().map(|c| c.to_string()).collect();

        for _ in 0..20 {
            assert_eq!(unused_color(&used, &mut rng), PROMPT_COLORS[7]);
        }
    }

    #[test]
    fn test_unused_color_exhausted_palette_still_returns() {
        let mut rng = StdRng::seed_from_u64(3);
        let used: Vec<String> = PROMPT_COLORS.iter().map(|c| c.to_string()).collect();

        let color = unused_color(&used, &mut rng);
        assert!(PROMPT_COLORS.contains(&color.as_str()));
    }

    #[test]
    fn test_prompt_json_defaults_locked_false() {
        let json = r##"{"promptId":"prompt-0","text":"Funk","weight":1.0,"color":"#9900ff"}"##;
        let prompt: Prompt = serde_json::from_str(json).unwrap();
        assert!(!prompt.locked);
    }
}
