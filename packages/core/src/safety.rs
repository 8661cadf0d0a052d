// ABOUTME: Rule-based distress safety net
// ABOUTME: Screens user text for distress keywords before any conversational reply

use tracing::warn;

/// Keywords that short-circuit conversational features
const DISTRESS_KEYWORDS: &[&str] = &[
    "suicide",
    "je veux mourir",
    "inutile",
    "je veux en finir",
    "désespéré",
];

/// Returns true when the message contains a distress keyword (case-insensitive)
pub fn detect_distress(message: &str) -> bool {
    let lowered = message.to_lowercase();
    let found = DISTRESS_KEYWORDS.iter().any(|k| lowered.contains(k));
    if found {
        warn!("Distress keyword detected, safety response takes precedence");
    }
    found
}

/// Fixed supportive reply shown instead of any generated answer
pub fn safety_response() -> &'static str {
    "Je vois que tu vis un moment difficile. \
     Je suis là pour t'écouter, mais si tu es dans cette détresse parles-en à un proche \
     ou à un professionnel de santé. Tu n'es pas seul, crois-moi."
}
