//! Push notification sender.
//!
//! Posts a notification for a device token to an HTTP notification API,
//! which relays it to the push provider.

use crate::error::{ClientError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Notification API used when none is configured.
pub const DEFAULT_PUSH_API: &str = "http://localhost:8000/send-notification";

/// Button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Action identifier reported back when clicked.
    pub action: String,
    /// Button label.
    pub title: String,
}

/// Notification content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// URL opened when the notification is clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Category understood by the receiving app.
    #[serde(rename = "type")]
    pub kind: String,
    /// Extra key/value data.
    pub data: Value,
    /// Action buttons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<NotificationAction>>,
}

impl Default for Notification {
    fn default() -> Self {
        Self {
            title: "Notification Title".to_string(),
            message: "You have a new message.".to_string(),
            link: None,
            kind: "default".to_string(),
            data: Value::Object(Map::new()),
            actions: None,
        }
    }
}

impl Notification {
    /// Notification with `title` and `message` and default everything else.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the click-through link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the category.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the extra data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Add an action button.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>, title: impl Into<String>) -> Self {
        self.actions.get_or_insert_with(Vec::new).push(NotificationAction {
            action: action.into(),
            title: title.into(),
        });
        self
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    token: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Result reported by the notification API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    /// Whether the notification was accepted.
    pub success: bool,
    /// Detail from the server, usually the failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize)]
struct PushResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the notification API.
#[derive(Debug, Clone)]
pub struct PushNotifier {
    api: String,
    http: Client,
}

impl PushNotifier {
    /// Create a notifier posting to `api`.
    pub fn new(api: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            api: api.into(),
            http,
        })
    }

    /// Notification API URL.
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Send `notification` to the device behind `token`.
    ///
    /// A response with `success: false` is returned as an outcome, not an
    /// error; its message falls back to the response's `error` field.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidInput`] for an empty token; nothing is sent.
    /// - [`ClientError::Http`] if the request fails or the body is not JSON.
    pub async fn send(&self, token: &str, notification: &Notification) -> Result<PushOutcome> {
        if token.trim().is_empty() {
            return Err(ClientError::InvalidInput("Missing token".into()));
        }

        let response: PushResponse = self
            .http
            .post(&self.api)
            .json(&PushRequest {
                token,
                notification,
            })
            .send()
            .await?
            .json()
            .await?;

        let outcome = PushOutcome {
            success: response.success,
            message: response.message.or(response.error),
        };
        if outcome.success {
            info!(api = %self.api, "Notification sent");
        } else {
            warn!(
                api = %self.api,
                message = outcome.message.as_deref().unwrap_or("unknown"),
                "Notification API reported failure"
            );
        }
        Ok(outcome)
    }
}
