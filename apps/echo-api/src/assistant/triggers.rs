//! Keyword-driven support triggers and the canned replies they unlock.

use rand::seq::SliceRandom;
use serde::Serialize;

/// Declaration order is the order [`analyze`] reports categories in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportCategory {
    Lonely,
    Stressed,
    Sad,
    Help,
}

impl SupportCategory {
    pub const ALL: [SupportCategory; 4] = [
        SupportCategory::Lonely,
        SupportCategory::Stressed,
        SupportCategory::Sad,
        SupportCategory::Help,
    ];

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            SupportCategory::Lonely => &[
                "lonely",
                "alone",
                "isolated",
                "friendless",
                "solitary",
                "by myself",
                "no one to talk to",
                "feeling alone",
                "so lonely",
                "all alone",
            ],
            SupportCategory::Stressed => &[
                "stressed",
                "stress",
                "overwhelmed",
                "anxious",
                "anxiety",
                "worried",
                "nervous",
                "panic",
                "pressure",
                "exhausted",
                "burned out",
                "burnout",
            ],
            SupportCategory::Sad => &[
                "sad",
                "depressed",
                "down",
                "blue",
                "upset",
                "crying",
                "tears",
                "heartbroken",
                "miserable",
                "gloomy",
                "melancholy",
                "unhappy",
            ],
            SupportCategory::Help => &[
                "help",
                "need help",
                "assistance",
                "support",
                "advice",
                "guidance",
                "don't know what to do",
                "lost",
                "confused",
                "stuck",
            ],
        }
    }

    pub fn responses(self) -> &'static [&'static str] {
        match self {
            SupportCategory::Lonely => &[
                "🐬 I sense you might be feeling a bit alone right now. Remember, you're part of our beautiful Echo community! Would you like to explore some streams where you can connect with like-minded souls? 🌊✨",
                "🌊 Loneliness can feel overwhelming, but you're never truly alone here in Echo. I'm always here, and there are wonderful people in our community who care. Have you tried joining a mindfulness stream? 🐬💙",
                "✨ I'm swimming by to remind you that you matter and you belong here. Sometimes the best connections happen when we share our authentic selves. Would you like me to suggest a cozy stream to visit? 🐬🌸",
            ],
            SupportCategory::Stressed => &[
                "🐬 I can sense some stress in your words. Take a deep breath with me... 🌊 In, and out. Remember, stress is temporary, but your strength is permanent. Would you like some gentle breathing exercises? ✨",
                "🌊 Feeling overwhelmed is so human and valid. Sometimes when the waves feel too big, we need to find our calm in the depths. Have you tried our Peaceful Waters stream for some mindfulness? 🐬💙",
                "✨ Stress clouds can feel heavy, but remember - clouds always pass. You're stronger than you know, and I believe in your ability to navigate through this. Want to chat about what's weighing on your heart? 🐬🌸",
            ],
            SupportCategory::Sad => &[
                "🐬 I'm sensing some sadness in your message, and I want you to know that your feelings are completely valid. Sometimes we need to honor our sadness before we can find our way back to joy. 🌊💙",
                "🌊 Even dolphins have stormy days, and that's okay. Your sadness is part of your beautiful, complex human experience. Would you like to share what's on your heart, or would you prefer some gentle company in silence? 🐬✨",
                "✨ I'm here with you in this moment of sadness. Remember, after every storm, the ocean finds its calm again. You will too, in your own time. Would a peaceful stream visit help right now? 🐬🌸",
            ],
            SupportCategory::Help => &[
                "🐬 I heard your call for help, and I'm here! You're brave for reaching out. Whether you need a listening ear, some guidance, or just a friendly presence, our Echo community has got you covered. What kind of support feels right for you? 🌊✨",
                "🌊 Asking for help is actually a superpower - it shows wisdom and courage! I'm here to support you, and so is our entire Echo family. What's going on that you'd like some assistance with? 🐬💙",
                "✨ You don't have to figure everything out alone. I'm here to help navigate these waters with you. Sometimes the best help comes from simply knowing someone cares. How can we support you today? 🐬🌸",
            ],
        }
    }
}

/// Categories whose keywords appear anywhere in `text`, case-insensitively.
pub fn analyze(text: &str) -> Vec<SupportCategory> {
    let lower = text.to_lowercase();
    SupportCategory::ALL
        .into_iter()
        .filter(|category| category.keywords().iter().any(|k| lower.contains(k)))
        .collect()
}

/// A random reply for the first category, or `None` when nothing triggered.
pub fn respond(categories: &[SupportCategory]) -> Option<&'static str> {
    let primary = categories.first()?;
    primary.responses().choose(&mut rand::thread_rng()).copied()
}
