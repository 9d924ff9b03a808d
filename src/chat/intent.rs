use bigdecimal::BigDecimal;

use crate::domain::Meter;
use crate::services::calculator::parse_amount;
use crate::validation::{sanitize_string, PAYMENT_METHODS};

use super::dialogue::DialogueState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Rates,
    Payment,
    Meter,
    Receipt,
    Limits,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    StartPurchase,
    ProvideAmount(BigDecimal),
    /// Meter id, already resolved against the offered meters.
    SelectMeter(String),
    /// Payment method id from the accepted catalog.
    SelectPaymentMethod(String),
    Confirm,
    Cancel,
    Ask(Topic),
    Thanks,
    Unknown,
}

/// Data-free discriminant of [`Intent`], the key of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentKind {
    StartPurchase,
    ProvideAmount,
    SelectMeter,
    SelectPaymentMethod,
    Confirm,
    Cancel,
    Ask,
    Thanks,
    Unknown,
}

impl Intent {
    pub fn kind(&self) -> IntentKind {
        match self {
            Intent::StartPurchase => IntentKind::StartPurchase,
            Intent::ProvideAmount(_) => IntentKind::ProvideAmount,
            Intent::SelectMeter(_) => IntentKind::SelectMeter,
            Intent::SelectPaymentMethod(_) => IntentKind::SelectPaymentMethod,
            Intent::Confirm => IntentKind::Confirm,
            Intent::Cancel => IntentKind::Cancel,
            Intent::Ask(_) => IntentKind::Ask,
            Intent::Thanks => IntentKind::Thanks,
            Intent::Unknown => IntentKind::Unknown,
        }
    }
}

/// What a classifier may look at besides the raw text.
pub struct ClassifyContext<'a> {
    pub state: DialogueState,
    pub meters: &'a [Meter],
}

/// Maps free text to an intent. Swap implementations to change how
/// users are understood without touching the dialogue flow.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, input: &str, ctx: &ClassifyContext<'_>) -> Intent;
}

const CANCEL_WORDS: &[&str] = &["cancel", "stop", "abort", "never mind", "nevermind"];
const CONFIRM_WORDS: &[&str] = &["yes", "y", "confirm", "ok", "okay", "sure", "proceed"];
const DECLINE_WORDS: &[&str] = &["no", "n", "nope"];

/// Keyword matching over lowercased input. Cancel words match whole words only.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    fn slot_intent(&self, text: &str, ctx: &ClassifyContext<'_>) -> Option<Intent> {
        match ctx.state {
            DialogueState::Idle => None,
            DialogueState::AwaitingAmount => parse_amount(text).ok().map(Intent::ProvideAmount),
            DialogueState::AwaitingMeterSelection => {
                resolve_meter(text, ctx.meters).map(Intent::SelectMeter)
            }
            DialogueState::AwaitingPaymentMethod => {
                resolve_payment_method(text).map(Intent::SelectPaymentMethod)
            }
            DialogueState::AwaitingConfirmation => {
                if CONFIRM_WORDS.contains(&text) {
                    Some(Intent::Confirm)
                } else if DECLINE_WORDS.contains(&text) {
                    Some(Intent::Cancel)
                } else {
                    None
                }
            }
        }
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, input: &str, ctx: &ClassifyContext<'_>) -> Intent {
        let text = sanitize_string(input).to_lowercase();
        if text.is_empty() {
            return Intent::Unknown;
        }

        if mentions_any_word(&text, CANCEL_WORDS) {
            return Intent::Cancel;
        }

        if let Some(intent) = self.slot_intent(&text, ctx) {
            return intent;
        }

        if contains_any(&text, &["buy", "purchase", "top up", "recharge"]) {
            Intent::StartPurchase
        } else if contains_any(&text, &["rate", "price", "cost"]) {
            Intent::Ask(Topic::Rates)
        } else if contains_any(&text, &["payment", "pay"]) {
            Intent::Ask(Topic::Payment)
        } else if contains_any(&text, &["meter", "device"]) {
            Intent::Ask(Topic::Meter)
        } else if contains_any(&text, &["receipt", "invoice"]) {
            Intent::Ask(Topic::Receipt)
        } else if contains_any(&text, &["minimum", "maximum", "limit"]) {
            Intent::Ask(Topic::Limits)
        } else if contains_any(&text, &["help", "how"]) {
            Intent::Ask(Topic::Help)
        } else if contains_any(&text, &["thank"]) {
            Intent::Thanks
        } else {
            Intent::Unknown
        }
    }
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

/// Whole-word match; a multi-word phrase must appear as consecutive words.
fn mentions_any_word(text: &str, phrases: &[&str]) -> bool {
    let words = split_words(text);
    phrases.iter().any(|phrase| {
        let wanted = split_words(phrase);
        !wanted.is_empty() && words.windows(wanted.len()).any(|window| window == wanted.as_slice())
    })
}

fn split_words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect()
}

/// A meter by 1-based position, id, or location.
fn resolve_meter(text: &str, meters: &[Meter]) -> Option<String> {
    if let Ok(index) = text.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| meters.get(i))
            .map(|meter| meter.id.clone());
    }

    meters
        .iter()
        .find(|meter| meter.id.eq_ignore_ascii_case(text))
        .or_else(|| {
            meters
                .iter()
                .filter(|meter| !meter.location.trim().is_empty())
                .find(|meter| text.contains(&meter.location.to_lowercase()))
        })
        .map(|meter| meter.id.clone())
}

/// A payment method by 1-based position, id, or display name.
fn resolve_payment_method(text: &str) -> Option<String> {
    if let Ok(index) = text.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| PAYMENT_METHODS.get(i))
            .map(|(id, _)| id.to_string());
    }

    PAYMENT_METHODS
        .iter()
        .find(|(id, name)| text == *id || text.contains(&name.to_lowercase()) || text.contains(id))
        .map(|(id, _)| id.to_string())
}
