//! Backend speaking to a `parley-server` over HTTP, plus the WebSocket
//! event stream.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parley_shared::api::{ChangedResponse, CountResponse, LoadMoreQuery};
use parley_shared::constants::ACTOR_HEADER;
use parley_shared::protocol::Envelope;
use parley_shared::types::{ConversationId, MessageId, UserId};
use parley_shared::views::{ConversationSummary, MessageView, OpenedConversation, TimelinePage};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::{ClientError, Result};

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    user: UserId,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, user: UserId) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header(ACTOR_HEADER, self.user.to_string())
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header(ACTOR_HEADER, self.user.to_string())
    }

    /// Send a text message. Attachments go through the same multipart
    /// endpoint with a `file` part.
    pub async fn send_text(&self, receiver: UserId, content: &str) -> Result<MessageView> {
        let form = reqwest::multipart::Form::new()
            .text("receiver_id", receiver.to_string())
            .text("content", content.to_string());
        decode(self.post("/messages").multipart(form)).await
    }

    /// Open the WebSocket stream of this user's channel. Frames are decoded
    /// into envelopes on a background task; the receiver closes when the
    /// socket does.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Envelope>> {
        let ws_url = match self.base_url.strip_prefix("http") {
            Some(rest) => format!("ws{rest}/ws"),
            None => format!("{}/ws", self.base_url),
        };

        let mut request = ws_url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(ACTOR_HEADER, HeaderValue::from(self.user.0));

        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        info!(url = %ws_url, user = %self.user, "event stream connected");

        let (tx, rx) = mpsc::unbounded_channel();
        let (_, mut read) = stream.split();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match Envelope::from_json(&text) {
                        Ok(envelope) => {
                            if tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "undecodable event frame"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "event stream failed");
                        break;
                    }
                }
            }
            debug!("event stream closed");
        });

        Ok(rx)
    }
}

async fn decode<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[async_trait]
impl Backend for HttpBackend {
    fn user(&self) -> UserId {
        self.user
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        decode(self.get("/conversations")).await
    }

    async fn open_conversation(&self, conversation: ConversationId) -> Result<OpenedConversation> {
        decode(self.get(&format!("/conversations/{conversation}"))).await
    }

    async fn load_more(
        &self,
        conversation: ConversationId,
        before: DateTime<Utc>,
    ) -> Result<TimelinePage> {
        decode(
            self.get(&format!("/conversations/{conversation}/load-more"))
                .query(&LoadMoreQuery { before }),
        )
        .await
    }

    async fn mark_seen(&self, message: MessageId) -> Result<bool> {
        let response: ChangedResponse = decode(self.post(&format!("/messages/{message}/seen"))).await?;
        Ok(response.changed)
    }

    async fn mark_calls_seen(&self, conversation: ConversationId) -> Result<usize> {
        let response: CountResponse =
            decode(self.post(&format!("/conversations/{conversation}/calls/mark-seen"))).await?;
        Ok(response.count)
    }
}
