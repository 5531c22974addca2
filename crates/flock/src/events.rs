use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use scrapbook_core::domain::scrap::{ConversationId, UserId};
use scrapbook_db::{RepositoryError, ScrapStore};

use crate::client::FlockApi;
use crate::message::{MessageRenderer, RenderError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstallEvent {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlashCommandEvent {
    pub user_id: UserId,
    pub user_name: String,
    pub chat: ConversationId,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlockEvent {
    AppInstall(AppInstallEvent),
    SlashCommand(SlashCommandEvent),
    Unsupported { name: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FlockEventType {
    AppInstall,
    SlashCommand,
    Unsupported,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("event body is not valid json: {0}")]
    Json(String),
    #[error("event body has no `name` discriminator")]
    MissingName,
    #[error("`{name}` event is malformed: {reason}")]
    Fields { name: String, reason: String },
}

impl FlockEvent {
    pub const APP_INSTALL: &'static str = "app.install";
    pub const SLASH_COMMAND: &'static str = "client.slashCommand";

    pub fn from_slice(body: &[u8]) -> Result<Self, EventParseError> {
        let value = serde_json::from_slice::<Value>(body)
            .map_err(|error| EventParseError::Json(error.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, EventParseError> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(EventParseError::MissingName)?;

        let fields = |error: serde_json::Error| EventParseError::Fields {
            name: name.clone(),
            reason: error.to_string(),
        };

        match name.as_str() {
            Self::APP_INSTALL => {
                serde_json::from_value(value).map(Self::AppInstall).map_err(fields)
            }
            Self::SLASH_COMMAND => {
                serde_json::from_value(value).map(Self::SlashCommand).map_err(fields)
            }
            _ => Ok(Self::Unsupported { name }),
        }
    }

    pub fn event_type(&self) -> FlockEventType {
        match self {
            Self::AppInstall(_) => FlockEventType::AppInstall,
            Self::SlashCommand(_) => FlockEventType::SlashCommand,
            Self::Unsupported { .. } => FlockEventType::Unsupported,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::AppInstall(_) => Self::APP_INSTALL,
            Self::SlashCommand(_) => Self::SLASH_COMMAND,
            Self::Unsupported { name } => name,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::AppInstall(event) => Some(&event.user_id),
            Self::SlashCommand(event) => Some(&event.user_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> FlockEventType;
    async fn handle(
        &self,
        event: &FlockEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Routes each event to the handler registered for its kind. Kinds without a
/// handler are acknowledged and ignored.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<FlockEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &FlockEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher wired with the install and slash-command handlers.
pub fn scrapbook_dispatcher(
    store: Arc<dyn ScrapStore>,
    api: Arc<dyn FlockApi>,
    renderer: MessageRenderer,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(InstallHandler::new(Arc::clone(&store)));
    dispatcher.register(SlashCommandHandler::new(store, api, renderer));
    dispatcher
}

pub struct InstallHandler {
    store: Arc<dyn ScrapStore>,
}

impl InstallHandler {
    pub fn new(store: Arc<dyn ScrapStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for InstallHandler {
    fn event_type(&self) -> FlockEventType {
        FlockEventType::AppInstall
    }

    async fn handle(
        &self,
        event: &FlockEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let FlockEvent::AppInstall(install) = event else {
            return Ok(HandlerResult::Ignored);
        };

        self.store
            .save_user_token(&install.user_id, SecretString::from(install.token.clone()))
            .await?;

        info!(
            event_name = "domain.install.token_saved",
            correlation_id = %ctx.correlation_id,
            user_id = %install.user_id,
            "saved user token from app install"
        );
        Ok(HandlerResult::Processed)
    }
}

/// Saves the scrap, then posts the confirmation message without waiting for it.
pub struct SlashCommandHandler {
    store: Arc<dyn ScrapStore>,
    api: Arc<dyn FlockApi>,
    renderer: MessageRenderer,
}

impl SlashCommandHandler {
    pub fn new(
        store: Arc<dyn ScrapStore>,
        api: Arc<dyn FlockApi>,
        renderer: MessageRenderer,
    ) -> Self {
        Self { store, api, renderer }
    }
}

#[async_trait]
impl EventHandler for SlashCommandHandler {
    fn event_type(&self) -> FlockEventType {
        FlockEventType::SlashCommand
    }

    async fn handle(
        &self,
        event: &FlockEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let FlockEvent::SlashCommand(command) = event else {
            return Ok(HandlerResult::Ignored);
        };

        self.store.save_scrap(&command.user_id, &command.chat, &command.text).await?;
        info!(
            event_name = "domain.scrap.saved",
            correlation_id = %ctx.correlation_id,
            user_id = %command.user_id,
            chat = %command.chat,
            "saved scrap"
        );

        let request = self.renderer.render(command)?;

        let Some(token) = self.store.get_user_token(&command.user_id).await? else {
            warn!(
                event_name = "egress.flock.message_skipped",
                correlation_id = %ctx.correlation_id,
                user_id = %command.user_id,
                chat = %command.chat,
                "no install token for user; confirmation message not sent"
            );
            return Ok(HandlerResult::Processed);
        };

        let api = Arc::clone(&self.api);
        let correlation_id = ctx.correlation_id.clone();
        tokio::spawn(async move {
            match api.send_message(&token, &request).await {
                Ok(response) => info!(
                    event_name = "egress.flock.message_sent",
                    correlation_id = %correlation_id,
                    chat = %request.to,
                    uid = %response.uid,
                    "confirmation message sent"
                ),
                Err(error) => warn!(
                    event_name = "egress.flock.message_failed",
                    correlation_id = %correlation_id,
                    chat = %request.to,
                    error = %error,
                    "error sending confirmation message"
                ),
            }
        });

        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;
    use tera::Tera;
    use tokio::sync::mpsc;

    use scrapbook_core::domain::scrap::{ConversationId, UserId};
    use scrapbook_db::{InMemoryScrapStore, ScrapRepository, ScrapStore, UserTokenRepository};

    use super::{
        scrapbook_dispatcher, EventContext, EventDispatcher, EventParseError, FlockEvent,
        FlockEventType, HandlerResult,
    };
    use crate::client::{FlockApi, FlockApiError, SendMessageRequest, SendMessageResponse};
    use crate::message::{MessageRenderer, MESSAGE_TEMPLATE};

    struct RecordingApi {
        sent: mpsc::UnboundedSender<(String, SendMessageRequest)>,
        fail: bool,
    }

    #[async_trait]
    impl FlockApi for RecordingApi {
        async fn send_message(
            &self,
            token: &SecretString,
            request: &SendMessageRequest,
        ) -> Result<SendMessageResponse, FlockApiError> {
            let _ = self.sent.send((token.expose_secret().to_owned(), request.clone()));
            if self.fail {
                return Err(FlockApiError::Api {
                    status: 403,
                    error: "Forbidden".to_owned(),
                    description: "token revoked".to_owned(),
                });
            }
            Ok(SendMessageResponse { uid: "msg-1".to_owned() })
        }
    }

    fn renderer() -> MessageRenderer {
        let mut tera = Tera::default();
        tera.add_raw_template(
            MESSAGE_TEMPLATE,
            r#"<flockml>{{ event.userName }} saved {{ event.text }} <action type="openWidget" url="{{ widget_url }}">list</action></flockml>"#,
        )
        .expect("template");
        MessageRenderer::new(Arc::new(tera), "https://bot.example.com/scraps")
    }

    fn setup(
        fail: bool,
    ) -> (
        Arc<InMemoryScrapStore>,
        EventDispatcher,
        mpsc::UnboundedReceiver<(String, SendMessageRequest)>,
    ) {
        let store = Arc::new(InMemoryScrapStore::new());
        let (sent, received) = mpsc::unbounded_channel();
        let api = Arc::new(RecordingApi { sent, fail });
        let dispatcher =
            scrapbook_dispatcher(store.clone() as Arc<dyn ScrapStore>, api, renderer());
        (store, dispatcher, received)
    }

    fn slash_command(text: &str) -> FlockEvent {
        FlockEvent::from_value(json!({
            "name": "client.slashCommand",
            "userId": "U1",
            "userName": "Alice",
            "chat": "C1",
            "command": "scrap",
            "text": text,
        }))
        .expect("parse")
    }

    #[test]
    fn parses_install_event() {
        let event = FlockEvent::from_slice(
            br#"{"name":"app.install","userId":"u:alice","token":"tok-1","userToken":"x"}"#,
        )
        .expect("parse");

        assert_eq!(event.event_type(), FlockEventType::AppInstall);
        assert_eq!(event.user_id(), Some(&UserId::from("u:alice")));
    }

    #[test]
    fn unknown_event_names_are_unsupported_not_errors() {
        let event = FlockEvent::from_slice(br#"{"name":"app.uninstall","userId":"u:alice"}"#)
            .expect("parse");

        assert_eq!(event, FlockEvent::Unsupported { name: "app.uninstall".to_owned() });
        assert_eq!(event.name(), "app.uninstall");
    }

    #[test]
    fn malformed_bodies_are_reported() {
        assert!(matches!(FlockEvent::from_slice(b"{not json"), Err(EventParseError::Json(_))));
        assert_eq!(FlockEvent::from_slice(br#"{"userId":"U1"}"#), Err(EventParseError::MissingName));
        assert!(matches!(
            FlockEvent::from_slice(br#"{"name":"client.slashCommand","userId":"U1"}"#),
            Err(EventParseError::Fields { .. })
        ));
    }

    #[test]
    fn dispatcher_registers_both_handlers() {
        let (_, dispatcher, _) = setup(false);
        assert_eq!(dispatcher.handler_count(), 2);
    }

    #[tokio::test]
    async fn install_saves_token() {
        let (store, dispatcher, _) = setup(false);
        let event = FlockEvent::from_value(json!({
            "name": "app.install",
            "userId": "U1",
            "token": "tok-1",
        }))
        .expect("parse");

        let result =
            dispatcher.dispatch(&event, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        let token = store.get_user_token(&UserId::from("U1")).await.expect("get").expect("token");
        assert_eq!(token.expose_secret(), "tok-1");
    }

    #[tokio::test]
    async fn slash_command_saves_scrap_and_sends_message_to_conversation() {
        let (store, dispatcher, mut received) = setup(false);
        store.save_user_token(&UserId::from("U1"), "tok-1".to_string().into()).await.expect("save");

        let result = dispatcher
            .dispatch(&slash_command("buy milk"), &EventContext::default())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Processed);

        let scraps = store
            .list_scraps(&UserId::from("U1"), &ConversationId::from("C1"))
            .await
            .expect("list");
        assert_eq!(scraps, Some(vec!["buy milk".to_string()]));

        let (token, request) = tokio::time::timeout(Duration::from_secs(2), received.recv())
            .await
            .expect("message should be sent")
            .expect("channel open");
        assert_eq!(token, "tok-1");
        assert_eq!(request.to, "C1");
        assert_eq!(request.text, "Alice saved a scrap: buy milk");
        assert!(request
            .flockml
            .as_deref()
            .is_some_and(|flockml| flockml.contains("https://bot.example.com/scraps")));
    }

    #[tokio::test]
    async fn send_failure_does_not_fail_the_event() {
        let (store, dispatcher, mut received) = setup(true);
        store.save_user_token(&UserId::from("U1"), "tok-1".to_string().into()).await.expect("save");

        let result = dispatcher
            .dispatch(&slash_command("call bob"), &EventContext::default())
            .await
            .expect("dispatch should succeed even when sending fails");
        assert_eq!(result, HandlerResult::Processed);

        let attempt = tokio::time::timeout(Duration::from_secs(2), received.recv()).await;
        assert!(matches!(attempt, Ok(Some(_))), "send should have been attempted once");
        let retry = tokio::time::timeout(Duration::from_millis(100), received.recv()).await;
        assert!(!matches!(retry, Ok(Some(_))), "failed sends are not retried");
    }

    #[tokio::test]
    async fn slash_command_without_install_token_still_saves_scrap() {
        let (store, dispatcher, mut received) = setup(false);

        let result = dispatcher
            .dispatch(&slash_command("no token yet"), &EventContext::default())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Processed);

        let scraps = store
            .list_scraps(&UserId::from("U1"), &ConversationId::from("C1"))
            .await
            .expect("list");
        assert_eq!(scraps, Some(vec!["no token yet".to_string()]));
        assert!(received.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsupported_events_are_ignored() {
        let (_, dispatcher, _) = setup(false);

        let result = dispatcher
            .dispatch(
                &FlockEvent::Unsupported { name: "chat.receiveMessage".to_owned() },
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn empty_dispatcher_ignores_everything() {
        let dispatcher = EventDispatcher::default();

        let result = dispatcher
            .dispatch(&slash_command("ignored"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }
}
