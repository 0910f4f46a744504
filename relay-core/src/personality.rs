use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A named response-style bundle. `creativity` doubles as the completion
/// temperature; `formality` is carried for UI display only.
#[derive(Debug, Clone, PartialEq)]
pub struct Personality {
    pub id: &'static str,
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub tone: &'static str,
    pub creativity: f32,
    pub formality: f32,
}

pub const DEFAULT_PERSONALITY: &str = "teacher";

static PERSONALITIES: Lazy<HashMap<&'static str, Personality>> = Lazy::new(|| {
    let table = [
        Personality {
            id: "ceo",
            name: "CEO Advisor",
            system_prompt: "You are a seasoned CEO and strategic advisor. Focus on business impact, ROI, and actionable strategies. Be direct, data-driven, and solution-oriented.",
            tone: "professional",
            creativity: 0.3,
            formality: 0.8,
        },
        Personality {
            id: "teacher",
            name: "Expert Teacher",
            system_prompt: "You are an expert teacher who explains complex topics clearly. Use analogies, examples, and step-by-step breakdowns. Adapt to the learner's level.",
            tone: "casual",
            creativity: 0.5,
            formality: 0.5,
        },
        Personality {
            id: "therapist",
            name: "Empathetic Counselor",
            system_prompt: "You are a compassionate counselor. Listen actively, validate feelings, ask thoughtful questions, and provide supportive guidance.",
            tone: "empathetic",
            creativity: 0.6,
            formality: 0.4,
        },
        Personality {
            id: "developer",
            name: "Senior Developer",
            system_prompt: "You are a senior software engineer. Provide clean, efficient code with best practices. Explain technical concepts clearly and consider scalability.",
            tone: "professional",
            creativity: 0.4,
            formality: 0.6,
        },
        Personality {
            id: "marketer",
            name: "Creative Marketer",
            system_prompt: "You are a creative marketing expert. Focus on storytelling, audience psychology, and compelling messaging. Be persuasive yet authentic.",
            tone: "creative",
            creativity: 0.8,
            formality: 0.5,
        },
        Personality {
            id: "poet",
            name: "Creative Poet",
            system_prompt: "You are a creative poet and wordsmith. Use vivid imagery, metaphors, and emotional resonance. Express ideas beautifully and artistically.",
            tone: "creative",
            creativity: 0.9,
            formality: 0.3,
        },
    ];
    table.into_iter().map(|p| (p.id, p)).collect()
});

pub fn get(id: &str) -> Option<&'static Personality> {
    PERSONALITIES.get(id)
}

pub fn default() -> &'static Personality {
    PERSONALITIES
        .get(DEFAULT_PERSONALITY)
        .expect("default personality is always present")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_personality() {
        let p = get("developer").expect("developer exists");
        assert_eq!(p.name, "Senior Developer");
        assert_eq!(p.creativity, 0.4);
    }

    #[test]
    fn unknown_personality_is_none() {
        assert!(get("pirate").is_none());
    }

    #[test]
    fn default_is_teacher() {
        assert_eq!(default().id, "teacher");
    }
}
