//! Conversational purchase flow.

pub mod assistant;
pub mod dialogue;
pub mod intent;

pub use assistant::{ChatAssistant, ChatMessage, Sender};
pub use dialogue::{transition, Action, Dialogue, DialogueState, PurchaseDraft, Turn, TRANSITIONS};
pub use intent::{ClassifyContext, Intent, IntentClassifier, IntentKind, KeywordClassifier, Topic};
