//! Async chat front end: runs the dialogue and executes confirmed purchases.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::{Meter, Session};
use crate::use_cases::PurchaseElectricity;

use super::dialogue::{Dialogue, DialogueState, GREETING};
use super::intent::IntentClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

pub struct ChatAssistant {
    session: Session,
    dialogue: Dialogue,
    purchases: Arc<PurchaseElectricity>,
    history: Vec<ChatMessage>,
}

impl ChatAssistant {
    pub fn new(
        session: Session,
        meters: Vec<Meter>,
        purchases: Arc<PurchaseElectricity>,
        classifier: Box<dyn IntentClassifier>,
    ) -> Self {
        let dialogue = Dialogue::new(meters, classifier)
            .with_pricing(None, purchases.calculator().clone());

        let mut assistant = Self {
            session,
            dialogue,
            purchases,
            history: Vec::new(),
        };
        assistant.push(Sender::Bot, GREETING.to_string());
        assistant
    }

    /// Load the active rate for rate answers and estimates. A failed lookup
    /// only degrades those answers.
    pub async fn refresh_rate(&mut self) {
        match self.purchases.active_rate().await {
            Ok(rate) => self.dialogue.set_rate(Some(rate)),
            Err(e) => {
                tracing::warn!(error = %e, "Active rate unavailable for chat");
                self.dialogue.set_rate(None);
            }
        }
    }

    pub fn state(&self) -> DialogueState {
        self.dialogue.state()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn greeting(&self) -> &'static str {
        GREETING
    }

    /// Handle one user message and return the bot reply. A confirmed purchase
    /// is executed here; its outcome only changes the reply text.
    pub async fn send(&mut self, message: &str) -> String {
        self.push(Sender::User, message.to_string());

        let turn = self.dialogue.handle(message);
        let reply = match turn.purchase {
            None => turn.reply,
            Some(input) => {
                let device_id = input.device_id.clone();
                match self.purchases.execute(&self.session, input).await {
                    Ok(output) => format!(
                        "Purchase successful! {} units credited to meter {}. Transaction ID: {}.",
                        output.quote.result.units_purchased.with_scale(2),
                        device_id,
                        output.transaction.id
                    ),
                    Err(e) => {
                        tracing::warn!(
                            user_id = %self.session.user_id,
                            error = %e,
                            "Chat purchase failed"
                        );
                        format!("Sorry, the purchase could not be completed: {}. Please try again later.", e)
                    }
                }
            }
        };

        self.push(Sender::Bot, reply.clone());
        reply
    }

    fn push(&mut self, sender: Sender, text: String) {
        self.history.push(ChatMessage {
            sender,
            text,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryBackend;
    use crate::chat::KeywordClassifier;
    use crate::domain::Rate;
    use crate::services::calculator::PurchasePolicy;
    use bigdecimal::BigDecimal;

    fn assistant(backend: &InMemoryBackend) -> ChatAssistant {
        let purchases = PurchaseElectricity::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            PurchasePolicy::default(),
        );
        ChatAssistant::new(
            Session::new("7", "jane"),
            vec![Meter::new("MET-12345", "Main Entrance")],
            Arc::new(purchases),
            Box::new(KeywordClassifier),
        )
    }

    #[tokio::test]
    async fn test_failed_purchase_only_changes_reply() {
        let backend = InMemoryBackend::new(Some(Rate::new("Standard", BigDecimal::from(100))), vec![]);
        let mut chat = assistant(&backend);
        chat.refresh_rate().await;

        for message in ["buy", "1000", "1", "credit"] {
            chat.send(message).await;
        }
        backend.set_offline(true).await;

        let reply = chat.send("yes").await;
        assert!(reply.starts_with("Sorry"));
        assert_eq!(chat.state(), DialogueState::Idle);
        assert!(backend.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_records_both_sides() {
        let backend = InMemoryBackend::new(None, vec![]);
        let mut chat = assistant(&backend);
        chat.send("thanks").await;

        let history = chat.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].text, GREETING);
        assert_eq!(history[1].sender, Sender::User);
        assert_eq!(history[2].sender, Sender::Bot);
    }
}
