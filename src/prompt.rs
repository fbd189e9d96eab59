/// Keys the model is asked to fill, in output order.
pub(crate) const PROMPT_FIELDS: [&str; 7] = [
    "subject_description",
    "action_and_movement",
    "environment_and_context",
    "camera_technique",
    "lighting_and_atmosphere",
    "technical_specs",
    "negative_prompt",
];

/// What each field should describe when reading frames.
const VISUAL_HINTS: [&str; 7] = [
    "Detailed description of character/object appearance, clothing, and textures",
    "Specific micro-movements and major actions happening over time",
    "Setting details, weather, time of day, and background elements",
    "Camera gear, focal length, angles, and specific movements (pan, tilt, zoom)",
    "Lighting setup (rim light, volumetric, etc.) and emotional mood",
    "Resolution and quality keywords (8k, photorealistic, unreal engine 5, etc.)",
    "What to avoid (e.g., distortion, bad anatomy, blur)",
];

/// What each field should describe when inventing a scene from a keyword.
const KEYWORD_HINTS: [&str; 7] = [
    "Hyper-detailed description of the subject envisioned from the keyword",
    "Dynamic, fluid motion description extrapolated from the input",
    "Rich, immersive world building details",
    "Cinematic camera choices (e.g., FPV drone, low angle dolly)",
    "Atmospheric lighting description",
    "Quality boosters (8k, masterpiece, trending on artstation, etc.)",
    "Common artifacts to avoid",
];

fn json_skeleton(hints: &[&str; 7]) -> String {
    let fields = PROMPT_FIELDS
        .iter()
        .zip(hints)
        .map(|(key, hint)| format!("  \"{key}\": \"{hint}\""))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{{\n{fields}\n}}")
}

/// Instruction sent after the frames of an image or video.
pub(crate) fn visual_instruction() -> String {
    format!(
        r#"ROLE: Elite Video Prompt Reverse Engineer.
TASK: Analyze the provided image(s) and deconstruct them into a HIGH-QUALITY JSON PROMPT for AI video generators (Sora, Hailuo, Runway).

REQUIREMENTS:
1. Strict JSON format: output ONLY a valid JSON object, no markdown outside it.
2. High fidelity: use professional terminology (anamorphic lens, sub-surface scattering, dynamic motion blur).
3. Density: describe every value with a phrase, never a single word.

JSON STRUCTURE TO POPULATE:
{}"#,
        json_skeleton(&VISUAL_HINTS)
    )
}

/// Instruction that asks the model to grow `keyword` into a full scene.
pub(crate) fn text_instruction(keyword: &str) -> String {
    format!(
        r#"ROLE: Creative AI Video Prompt Enhancer.
TASK: Take the user's simple input: "{keyword}" and imagine a masterpiece video scene around it. Expand it into a HIGH-QUALITY JSON PROMPT.

REQUIREMENTS:
1. Expand and enhance: "cat running" becomes "A majestic Maine Coon cat sprinting through a neon-lit cyberpunk alleyway...".
2. Strict JSON format: output ONLY a valid JSON object.
3. High fidelity: inject professional video production keywords.

JSON STRUCTURE TO POPULATE:
{}"#,
        json_skeleton(&KEYWORD_HINTS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_instructions_name_all_seven_fields() {
        let visual = visual_instruction();
        let text = text_instruction("cat running");
        for key in PROMPT_FIELDS {
            assert!(visual.contains(&format!("\"{key}\"")), "{key}");
            assert!(text.contains(&format!("\"{key}\"")), "{key}");
        }
    }

    #[test]
    fn text_instruction_embeds_the_keyword() {
        let text = text_instruction("giant cat asleep on a skyscraper");
        assert!(text.contains("\"giant cat asleep on a skyscraper\""));
        assert!(!visual_instruction().contains("giant cat"));
    }

    #[test]
    fn each_mode_describes_the_fields_its_own_way() {
        let visual = visual_instruction();
        let text = text_instruction("cat running");

        assert!(text.contains("envisioned from the keyword"));
        assert!(text.contains("\"camera_technique\": \"Cinematic camera choices"));
        assert!(!visual.contains("envisioned from the keyword"));
        assert!(visual.contains("\"subject_description\": \"Detailed description"));
        assert!(!text.contains("bad anatomy"));
    }
}
