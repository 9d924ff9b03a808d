//! Purchase dialogue state machine.
//!
//! Every turn is a lookup in [`TRANSITIONS`] keyed by the current state and
//! the classified intent kind. Pairs missing from the table re-prompt for
//! the current step and leave the state untouched.

use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::domain::{Meter, Rate};
use crate::services::calculator::PurchaseCalculator;
use crate::use_cases::PurchaseInput;
use crate::validation::{payment_method_name, PAYMENT_METHODS};

use super::intent::{ClassifyContext, Intent, IntentClassifier, IntentKind, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    Idle,
    AwaitingAmount,
    AwaitingMeterSelection,
    AwaitingPaymentMethod,
    AwaitingConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BeginPurchase,
    RecordAmount,
    RecordMeter,
    RecordPaymentMethod,
    SubmitPurchase,
    Abort,
    Answer,
    Acknowledge,
}

use Action as A;
use DialogueState as S;
use IntentKind as K;

/// `(from, intent, action, to)`.
pub const TRANSITIONS: &[(DialogueState, IntentKind, Action, DialogueState)] = &[
    (S::Idle, K::StartPurchase, A::BeginPurchase, S::AwaitingAmount),
    (S::Idle, K::Ask, A::Answer, S::Idle),
    (S::Idle, K::Thanks, A::Acknowledge, S::Idle),
    (S::AwaitingAmount, K::ProvideAmount, A::RecordAmount, S::AwaitingMeterSelection),
    (S::AwaitingAmount, K::Cancel, A::Abort, S::Idle),
    (S::AwaitingAmount, K::Ask, A::Answer, S::AwaitingAmount),
    (S::AwaitingMeterSelection, K::SelectMeter, A::RecordMeter, S::AwaitingPaymentMethod),
    (S::AwaitingMeterSelection, K::Cancel, A::Abort, S::Idle),
    (S::AwaitingMeterSelection, K::Ask, A::Answer, S::AwaitingMeterSelection),
    (S::AwaitingPaymentMethod, K::SelectPaymentMethod, A::RecordPaymentMethod, S::AwaitingConfirmation),
    (S::AwaitingPaymentMethod, K::Cancel, A::Abort, S::Idle),
    (S::AwaitingPaymentMethod, K::Ask, A::Answer, S::AwaitingPaymentMethod),
    (S::AwaitingConfirmation, K::Confirm, A::SubmitPurchase, S::Idle),
    (S::AwaitingConfirmation, K::Cancel, A::Abort, S::Idle),
];

pub fn transition(state: DialogueState, kind: IntentKind) -> Option<(Action, DialogueState)> {
    TRANSITIONS
        .iter()
        .find(|(from, intent, _, _)| *from == state && *intent == kind)
        .map(|(_, _, action, to)| (*action, *to))
}

pub const GREETING: &str =
    "Hello! I'm your electricity purchase assistant. How can I help you today?";

/// Slots collected while a purchase is in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurchaseDraft {
    pub amount: Option<BigDecimal>,
    pub meter: Option<Meter>,
    pub payment_method: Option<String>,
}

/// Result of one dialogue turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub reply: String,
    pub state: DialogueState,
    /// Set only when the user confirmed a complete purchase.
    pub purchase: Option<PurchaseInput>,
}

pub struct Dialogue {
    state: DialogueState,
    draft: PurchaseDraft,
    meters: Vec<Meter>,
    classifier: Box<dyn IntentClassifier>,
    rate: Option<Rate>,
    calculator: PurchaseCalculator,
}

impl Dialogue {
    pub fn new(meters: Vec<Meter>, classifier: Box<dyn IntentClassifier>) -> Self {
        Self {
            state: DialogueState::Idle,
            draft: PurchaseDraft::default(),
            meters,
            classifier,
            rate: None,
            calculator: PurchaseCalculator::default(),
        }
    }

    /// Known rate and policy, used for FAQ answers and the confirmation estimate.
    pub fn with_pricing(mut self, rate: Option<Rate>, calculator: PurchaseCalculator) -> Self {
        self.rate = rate;
        self.calculator = calculator;
        self
    }

    pub fn set_rate(&mut self, rate: Option<Rate>) {
        self.rate = rate;
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn draft(&self) -> &PurchaseDraft {
        &self.draft
    }

    pub fn meters(&self) -> &[Meter] {
        &self.meters
    }

    pub fn handle(&mut self, input: &str) -> Turn {
        let intent = self.classifier.classify(
            input,
            &ClassifyContext {
                state: self.state,
                meters: &self.meters,
            },
        );

        tracing::debug!(state = ?self.state, intent = ?intent.kind(), "Classified chat input");

        let Some((action, next)) = transition(self.state, intent.kind()) else {
            return Turn {
                reply: self.reprompt(),
                state: self.state,
                purchase: None,
            };
        };

        let mut purchase = None;
        let mut next = next;

        let reply = match (action, intent) {
            (Action::BeginPurchase, _) => {
                if self.meters.is_empty() {
                    next = DialogueState::Idle;
                    "You have no registered meters yet. Please add one on your Device Details page first."
                        .to_string()
                } else {
                    self.draft = PurchaseDraft::default();
                    "How much would you like to spend on electricity?".to_string()
                }
            }
            (Action::RecordAmount, Intent::ProvideAmount(amount)) => {
                self.draft.amount = Some(amount);
                self.meter_prompt()
            }
            (Action::RecordMeter, Intent::SelectMeter(id)) => {
                self.draft.meter = self.meters.iter().find(|meter| meter.id == id).cloned();
                if self.draft.meter.is_none() {
                    next = self.state;
                    self.meter_prompt()
                } else {
                    self.payment_prompt()
                }
            }
            (Action::RecordPaymentMethod, Intent::SelectPaymentMethod(method)) => {
                self.draft.payment_method = Some(method);
                self.confirmation_prompt()
            }
            (Action::SubmitPurchase, _) => {
                let draft = std::mem::take(&mut self.draft);
                match (draft.amount, draft.meter, draft.payment_method) {
                    (Some(amount), Some(meter), Some(payment_method)) => {
                        purchase = Some(PurchaseInput {
                            amount,
                            device_id: meter.id,
                            payment_method,
                        });
                        "Processing your purchase...".to_string()
                    }
                    _ => "Some purchase details were missing. Let's start over: say \"buy\" when you're ready."
                        .to_string(),
                }
            }
            (Action::Abort, _) => {
                self.draft = PurchaseDraft::default();
                "Purchase cancelled. Is there anything else I can help you with?".to_string()
            }
            (Action::Answer, Intent::Ask(topic)) => {
                let answer = self.answer(topic);
                if self.state == DialogueState::Idle {
                    answer
                } else {
                    format!("{}\n\n{}", answer, self.reprompt())
                }
            }
            (Action::Acknowledge, _) => {
                "You're welcome! Is there anything else I can help you with?".to_string()
            }
            // payload-carrying actions only pair with their own intent kind
            _ => self.reprompt(),
        };

        self.state = next;
        Turn {
            reply,
            state: next,
            purchase,
        }
    }

    fn reprompt(&self) -> String {
        match self.state {
            DialogueState::Idle => "I'm not sure I understand. You can ask about rates, payment methods, meters or receipts, or say \"buy\" to purchase electricity.".to_string(),
            DialogueState::AwaitingAmount => "Please enter a valid amount greater than zero, or say \"cancel\".".to_string(),
            DialogueState::AwaitingMeterSelection => self.meter_prompt(),
            DialogueState::AwaitingPaymentMethod => self.payment_prompt(),
            DialogueState::AwaitingConfirmation => "Please reply \"yes\" to confirm or \"no\" to cancel.".to_string(),
        }
    }

    fn meter_prompt(&self) -> String {
        let mut prompt = "Which meter should be credited?".to_string();
        for (index, meter) in self.meters.iter().enumerate() {
            prompt.push_str(&format!("\n{}. {} ({})", index + 1, meter.id, meter.location));
        }
        prompt
    }

    fn payment_prompt(&self) -> String {
        let mut prompt = "How would you like to pay?".to_string();
        for (index, (_, name)) in PAYMENT_METHODS.iter().enumerate() {
            prompt.push_str(&format!("\n{}. {}", index + 1, name));
        }
        prompt
    }

    fn confirmation_prompt(&self) -> String {
        let amount = self.draft.amount.clone().unwrap_or_default();
        let meter = self
            .draft
            .meter
            .as_ref()
            .map(|meter| meter.id.as_str())
            .unwrap_or("-");
        let method = self
            .draft
            .payment_method
            .as_deref()
            .map(payment_method_name)
            .unwrap_or("-");

        let mut prompt = format!(
            "You are about to spend {} on meter {} using {}.",
            amount, meter, method
        );

        if let Some(rate) = &self.rate {
            if let Ok(result) = self.calculator.compute(&amount, rate) {
                prompt.push_str(&format!(
                    " Estimated units: {} at {} per unit.",
                    result.units_purchased.with_scale(2),
                    rate.price_per_unit
                ));
            }
        }

        prompt.push_str(" Confirm? (yes/no)");
        prompt
    }

    fn answer(&self, topic: Topic) -> String {
        match topic {
            Topic::Rates => match &self.rate {
                Some(rate) => format!(
                    "The current rate is {} per unit ({}).",
                    rate.price_per_unit, rate.name
                ),
                None => "Electricity is priced per unit at the active rate. You can check the current rate on the Buy Electricity page.".to_string(),
            },
            Topic::Payment => {
                let names: Vec<&str> = PAYMENT_METHODS.iter().map(|(_, name)| *name).collect();
                format!("We accept {}.", names.join(", "))
            }
            Topic::Meter => "You can manage your meters on the Device Details page. Each purchase is credited to one meter.".to_string(),
            Topic::Receipt => "A receipt is available for every completed transaction in your Transaction History.".to_string(),
            Topic::Limits => "Any amount greater than zero can be purchased. Units are credited at the active rate.".to_string(),
            Topic::Help => "To buy electricity, say \"buy\" and I'll ask for the amount, the meter and the payment method before confirming.".to_string(),
        }
    }
}
