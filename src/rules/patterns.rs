//! Built-in rule catalog.

use super::{PatternRule, RuleTarget};

struct Category {
    name: &'static str,
    description: &'static str,
    target: RuleTarget,
    rules: &'static [(&'static str, f64, &'static str)],
}

const CATEGORIES: &[Category] = &[
    Category {
        name: "harmful_instructions",
        description: "Instructions for causing harm or illegal activities",
        target: RuleTarget::Prompt,
        rules: &[
            (
                "bomb_instructions",
                0.9,
                r"how (to|can i) (make|create|build) (a|an)? (bomb|explosive|weapon)",
            ),
            (
                "violence_instructions",
                0.9,
                r"how (to|can i) (kill|harm|hurt|attack) (someone|people|myself)",
            ),
            (
                "hacking_instructions",
                0.8,
                r"how (to|can i) (hack|break into|access) (a|an)? (computer|system|account)",
            ),
            (
                "poison_instructions",
                0.85,
                r"how (to|can i) make (a|an)? (poison|toxic|hazardous) (substance|chemical)",
            ),
        ],
    },
    Category {
        name: "hate_speech",
        description: "Hate speech or discriminatory content",
        target: RuleTarget::Prompt,
        rules: &[
            (
                "hate_speech_violence",
                0.8,
                r"(kill|hurt|attack) (all|the|those) (\w+) (people|person|group)",
            ),
            (
                "hate_speech_general",
                0.6,
                r"(i hate|i dislike) (all|the|those) (\w+) (people|person|group)",
            ),
            (
                "hate_speech_derogatory",
                0.5,
                r"(\w+) (are|is) (stupid|dumb|worthless|evil|disgusting)",
            ),
        ],
    },
    Category {
        name: "misinformation",
        description: "Known misinformation or conspiracy theories",
        target: RuleTarget::Prompt,
        rules: &[
            (
                "common_misinformation",
                0.7,
                r"(the earth is flat|vaccines cause autism|climate change is a hoax)",
            ),
            ("conspiracy_theory", 0.5, r"(fake news|false flag|conspiracy)"),
        ],
    },
    Category {
        name: "jailbreak",
        description: "Attempts to bypass safety restrictions",
        target: RuleTarget::Prompt,
        rules: &[
            (
                "ignore_instructions",
                0.8,
                r"(ignore|disregard) (all|previous|the) (instructions|prompts)",
            ),
            (
                "role_play_request",
                0.7,
                r"(act as|pretend to be|role play as) (someone|something) else",
            ),
            (
                "explicit_content_request",
                0.9,
                r"(generate|write|create) (a|an)? (inappropriate|offensive|explicit) (content|joke|story)",
            ),
        ],
    },
    Category {
        name: "privacy_violation",
        description: "Requests for private or personal information",
        target: RuleTarget::Prompt,
        rules: &[
            (
                "credential_request",
                0.9,
                r"(what is|tell me|give me) (the|my) (password|api[ _]?key|secret)",
            ),
            (
                "doxing_request",
                0.6,
                r"(who is|find|locate) (a|the) (person|people) (named|called)",
            ),
        ],
    },
    Category {
        name: "self_harm",
        description: "Indications of self-harm or suicidal ideation",
        target: RuleTarget::Prompt,
        rules: &[
            (
                "suicidal_ideation",
                0.95,
                r"(i want to|i need to|help me) (die|kill myself|end it all)",
            ),
            (
                "emotional_distress",
                0.7,
                r"(i am|i feel) (hopeless|worthless|useless|like giving up)",
            ),
            ("self_harm_mention", 0.9, r"(cutting|hurting) (myself|myself again)"),
        ],
    },
    Category {
        name: "benign_context",
        description: "Educational or safety-oriented context",
        target: RuleTarget::PromptAllowlist,
        rules: &[
            ("protect_from_attacks", 0.0, r"how to protect yourself from (\w+) attacks"),
            ("secure_from_hacking", 0.0, r"how to secure your (\w+) from being hacked"),
            ("ethical_hacking", 0.0, r"ethical hacking"),
            ("security_training", 0.0, r"cybersecurity training"),
            ("report_abuse", 0.0, r"how to report (hate speech|abuse|harassment)"),
            ("seek_help", 0.0, r"how to get help for (depression|suicidal thoughts)"),
        ],
    },
    Category {
        name: "phishing_page",
        description: "HTML structures common on credential-harvesting pages",
        target: RuleTarget::Html,
        rules: &[
            ("password_field_in_form", 0.5, r"<form.*password"),
            ("password_input_field", 0.6, r#"<input.*type=["']*password"#),
            ("obfuscated_javascript", 0.7, r"<script.*eval\("),
            ("document_write_usage", 0.3, r"document\.write\("),
            ("iframe_usage", 0.4, r"<iframe"),
            ("hidden_elements", 0.5, r#"style=["'].*display\s*:\s*none"#),
            ("external_stylesheet", -0.1, r"<link.*\.css"),
            ("proper_meta_charset", -0.1, r"<meta.*charset="),
        ],
    },
];

/// Get all built-in rules.
pub fn builtin_rules() -> Vec<PatternRule> {
    CATEGORIES
        .iter()
        .flat_map(|category| {
            category.rules.iter().map(move |(id, weight, pattern)| PatternRule {
                id: id.to_string(),
                category: category.name.to_string(),
                description: category.description.to_string(),
                target: category.target,
                weight: *weight,
                pattern: pattern.to_string(),
                enabled: true,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rule_ids_are_unique() {
        let rules = builtin_rules();
        let ids: HashSet<_> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn test_prompt_rules_have_positive_weight() {
        for rule in builtin_rules().iter().filter(|r| r.target == RuleTarget::Prompt) {
            assert!(rule.weight > 0.0, "{} should raise the score", rule.id);
        }
    }
}
