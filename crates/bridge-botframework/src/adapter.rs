//! Channel adapter
//!
//! Bot Framework activity と TurnHandler を橋渡しする。

use std::sync::Arc;

use bridge_core::{TurnHandler, TurnOutcome};
use tracing::{debug, error, warn};

use crate::connector::ActivitySender;
use crate::error::ChannelError;
use crate::types::Activity;

/// Channel id of the Bot Framework Emulator
pub const EMULATOR_CHANNEL_ID: &str = "emulator";
/// Trace activity name for delivery failures
pub const TURN_ERROR_TRACE_NAME: &str = "OnTurnError Trace";
/// Trace activity label for delivery failures
pub const TURN_ERROR_TRACE_LABEL: &str = "TurnError";
/// Value type of the error trace
pub const ERROR_VALUE_TYPE: &str = "https://www.botframework.com/schemas/error";
/// Messages sent to the user after a delivery failure
pub const TURN_ERROR_MESSAGES: [&str; 2] = [
    "The bot encountered an error or bug.",
    "To continue to run this bot, please fix the bot source code.",
];

/// Runs one turn per inbound activity
pub struct BotAdapter {
    turn_handler: Arc<TurnHandler>,
}

impl BotAdapter {
    pub fn new(turn_handler: Arc<TurnHandler>) -> Self {
        Self { turn_handler }
    }

    pub fn turn_handler(&self) -> &Arc<TurnHandler> {
        &self.turn_handler
    }

    /// Handle one inbound activity and deliver the reply through `sender`
    ///
    /// Activities that are not user messages are acknowledged without a reply.
    /// A delivery failure triggers [`Self::on_turn_error`]; nothing propagates
    /// to the caller.
    pub async fn process(&self, activity: &Activity, sender: &dyn ActivitySender) -> TurnOutcome {
        let Some((user_id, text)) = activity.user_message() else {
            debug!("Skipping {} activity", activity.activity_type);
            return TurnOutcome::Ignored;
        };

        let outcome = self.turn_handler.handle_turn(user_id, text).await;

        if let Some(reply) = outcome.text() {
            if let Err(e) = sender.send(&activity.reply(reply)).await {
                self.on_turn_error(activity, sender, &e).await;
            }
        }

        outcome
    }

    /// Report an unhandled turn error to the log and to the conversation
    pub async fn on_turn_error(
        &self,
        activity: &Activity,
        sender: &dyn ActivitySender,
        error: &ChannelError,
    ) {
        error!("[onTurnError] unhandled error: {}", error);

        // Only the Emulator renders trace activities
        if activity.channel_id.as_deref() == Some(EMULATOR_CHANNEL_ID) {
            let trace = activity.trace(
                TURN_ERROR_TRACE_NAME,
                serde_json::Value::String(error.to_string()),
                ERROR_VALUE_TYPE,
                TURN_ERROR_TRACE_LABEL,
            );
            if let Err(e) = sender.send(&trace).await {
                warn!("Failed to deliver turn error trace: {}", e);
            }
        }

        for text in TURN_ERROR_MESSAGES {
            if let Err(e) = sender.send(&activity.reply(text)).await {
                warn!("Failed to deliver turn error notice: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{message_activity, turn_handler, RecordingSender};
    use crate::types::activity_types;
    use bridge_core::SessionRegistry;

    #[tokio::test]
    async fn test_message_gets_reply() {
        let adapter = BotAdapter::new(turn_handler(false));
        let sender = RecordingSender::new();
        let activity = message_activity("user-1", "hi", "http://localhost:1");

        let outcome = adapter.process(&activity, &sender).await;

        assert_eq!(outcome, TurnOutcome::Replied("echo: hi".to_string()));
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text.as_deref(), Some("echo: hi"));
        assert_eq!(sent[0].reply_to_id, activity.id);
        assert_eq!(sent[0].recipient.as_ref().unwrap().id, "user-1");
    }

    #[tokio::test]
    async fn test_non_message_skipped() {
        let adapter = BotAdapter::new(turn_handler(false));
        let sender = RecordingSender::new();
        let mut activity = message_activity("user-1", "hi", "http://localhost:1");
        activity.activity_type = activity_types::CONVERSATION_UPDATE.to_string();

        let outcome = adapter.process(&activity, &sender).await;

        assert!(outcome.is_ignored());
        assert!(sender.sent().is_empty());
        assert!(adapter.turn_handler().registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_text_skipped() {
        let adapter = BotAdapter::new(turn_handler(false));
        let sender = RecordingSender::new();
        let activity = message_activity("user-1", "", "http://localhost:1");

        assert!(adapter.process(&activity, &sender).await.is_ignored());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_delivers_apology() {
        let adapter = BotAdapter::new(turn_handler(true));
        let sender = RecordingSender::new();
        let activity = message_activity("user-1", "hi", "http://localhost:1");

        adapter.process(&activity, &sender).await;

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].text.as_deref(),
            Some("Sorry, there was an error processing your request.")
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_reports_turn_error() {
        let adapter = BotAdapter::new(turn_handler(false));
        let sender = RecordingSender::failing_first();
        let activity = message_activity("user-1", "hi", "http://localhost:1");

        let outcome = adapter.process(&activity, &sender).await;
        assert!(matches!(outcome, TurnOutcome::Replied(_)));

        let sent = sender.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].activity_type, activity_types::TRACE);
        assert_eq!(sent[0].name.as_deref(), Some(TURN_ERROR_TRACE_NAME));
        assert_eq!(sent[0].label.as_deref(), Some(TURN_ERROR_TRACE_LABEL));
        assert_eq!(sent[0].value_type.as_deref(), Some(ERROR_VALUE_TYPE));
        assert_eq!(sent[1].text.as_deref(), Some(TURN_ERROR_MESSAGES[0]));
        assert_eq!(sent[2].text.as_deref(), Some(TURN_ERROR_MESSAGES[1]));
    }

    #[tokio::test]
    async fn test_turn_error_stops_when_channel_is_down() {
        let adapter = BotAdapter::new(turn_handler(false));
        let sender = RecordingSender::always_failing();
        let activity = message_activity("user-1", "hi", "http://localhost:1");

        adapter.process(&activity, &sender).await;

        assert!(sender.sent().is_empty());
        // reply, trace, first notice
        assert_eq!(sender.attempts(), 3);
    }

    #[tokio::test]
    async fn test_turn_error_trace_only_on_emulator() {
        let adapter = BotAdapter::new(turn_handler(false));
        let sender = RecordingSender::failing_first();
        let mut activity = message_activity("user-1", "hi", "http://localhost:1");
        activity.channel_id = Some("msteams".to_string());

        adapter.process(&activity, &sender).await;

        let sent = sender.sent();
        let kinds: Vec<_> = sent.iter().map(|a| a.activity_type.as_str()).collect();
        assert_eq!(kinds, vec![activity_types::MESSAGE, activity_types::MESSAGE]);
        assert_eq!(sent[0].text.as_deref(), Some(TURN_ERROR_MESSAGES[0]));
        assert_eq!(sent[1].text.as_deref(), Some(TURN_ERROR_MESSAGES[1]));
    }

    #[tokio::test]
    async fn test_rejected_trace_does_not_block_notices() {
        let adapter = BotAdapter::new(turn_handler(false));
        // Fails the reply and the trace
        let sender = RecordingSender::failing_first_n(2);
        let activity = message_activity("user-1", "hi", "http://localhost:1");

        adapter.process(&activity, &sender).await;

        let texts: Vec<_> = sender.sent().into_iter().filter_map(|a| a.text).collect();
        assert_eq!(texts, TURN_ERROR_MESSAGES.map(String::from).to_vec());
    }
}
