//! Push payloads and notification clicks.

use bytes::Bytes;
use pwakit_common::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::{AgentConfig, NotificationConfig};

const EXPLORE_ACTION: &str = "explore";
const CLOSE_ACTION: &str = "close";

/// An incoming push message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushMessage {
    pub data: Option<Bytes>,
}

impl PushMessage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: Some(Bytes::from(text.into())),
        }
    }

    /// Payload as text, if present and valid UTF-8.
    pub fn data_text(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|d| String::from_utf8(d.to_vec()).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Arrival time in milliseconds since the Unix epoch.
    pub date_of_arrival: i64,
    pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// A notification the host should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// A user interaction with a displayed notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    /// Action button pressed, `None` for a click on the body.
    pub action: Option<String>,
}

impl NotificationClick {
    pub fn body() -> Self {
        Self::default()
    }

    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
        }
    }
}

/// What the host should do after a click. The notification is always closed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    OpenWindow { url: Url },
    Dismiss,
}

/// Builds notifications from pushes and routes clicks.
#[derive(Debug, Clone)]
pub struct Notifier {
    settings: NotificationConfig,
    explore_url: Url,
    root_url: Url,
}

impl Notifier {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let settings = config.notifications.clone();
        Ok(Self {
            explore_url: config.resolve(&settings.explore_route)?,
            root_url: config.resolve(&settings.root_route)?,
            settings,
        })
    }

    pub fn on_push(&self, message: &PushMessage) -> Notification {
        let body = message
            .data_text()
            .unwrap_or_else(|| self.settings.default_body.clone());
        debug!(has_payload = message.data.is_some(), "Building notification");

        Notification {
            title: self.settings.title.clone(),
            body,
            icon: self.settings.icon.clone(),
            badge: self.settings.badge.clone(),
            vibrate: self.settings.vibrate.clone(),
            data: NotificationData {
                date_of_arrival: chrono::Utc::now().timestamp_millis(),
                primary_key: 1,
            },
            actions: vec![
                NotificationAction {
                    action: EXPLORE_ACTION.to_string(),
                    title: self.settings.explore_title.clone(),
                    icon: self.settings.explore_icon.clone(),
                },
                NotificationAction {
                    action: CLOSE_ACTION.to_string(),
                    title: self.settings.close_title.clone(),
                    icon: self.settings.close_icon.clone(),
                },
            ],
        }
    }

    pub fn on_click(&self, click: &NotificationClick) -> ClientAction {
        match click.action.as_deref() {
            Some(EXPLORE_ACTION) => ClientAction::OpenWindow {
                url: self.explore_url.clone(),
            },
            Some(CLOSE_ACTION) => ClientAction::Dismiss,
            _ => ClientAction::OpenWindow {
                url: self.root_url.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> Notifier {
        let config =
            AgentConfig::default().with_origin(Url::parse("https://shop.test/").unwrap());
        Notifier::new(&config).unwrap()
    }

    #[test]
    fn test_push_with_payload() {
        let notification = notifier().on_push(&PushMessage::text("Order shipped"));
        assert_eq!(notification.title, "FTC Marketplace");
        assert_eq!(notification.body, "Order shipped");
        assert_eq!(notification.vibrate, vec![100, 50, 100]);
        assert_eq!(notification.data.primary_key, 1);
        assert!(notification.data.date_of_arrival > 0);

        let actions: Vec<&str> = notification
            .actions
            .iter()
            .map(|a| a.action.as_str())
            .collect();
        assert_eq!(actions, vec!["explore", "close"]);
        assert_eq!(notification.actions[0].title, "View Details");
    }

    #[test]
    fn test_push_without_payload_uses_default_body() {
        let notification = notifier().on_push(&PushMessage::empty());
        assert_eq!(notification.body, "New update from FTC!");
        assert_eq!(notification.icon, "/assets/img/icon-192x192.png");
        assert_eq!(notification.badge, "/assets/img/badge-72x72.png");
    }

    #[test]
    fn test_click_routing() {
        let notifier = notifier();
        assert_eq!(
            notifier.on_click(&NotificationClick::action("explore")),
            ClientAction::OpenWindow {
                url: Url::parse("https://shop.test/products").unwrap()
            }
        );
        assert_eq!(
            notifier.on_click(&NotificationClick::action("close")),
            ClientAction::Dismiss
        );
        assert_eq!(
            notifier.on_click(&NotificationClick::body()),
            ClientAction::OpenWindow {
                url: Url::parse("https://shop.test/").unwrap()
            }
        );
        assert_eq!(
            notifier.on_click(&NotificationClick::action("snooze")),
            notifier.on_click(&NotificationClick::body())
        );
    }

    #[test]
    fn test_client_action_json() {
        let json = serde_json::to_value(ClientAction::Dismiss).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "dismiss" }));
    }
}
