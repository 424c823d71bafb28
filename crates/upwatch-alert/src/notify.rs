//! Outbound notification channels.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use upwatch_core::NotifierConfig;
use upwatch_state::Recipient;

use crate::error::NotifyError;

/// Delivers a text to one phone number.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

/// Writes alerts to the log instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError> {
        info!(%phone, %text, "alert");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// HTTP SMS gateway taking the message as GET query parameters.
#[derive(Debug, Clone)]
pub struct SmsGatewayNotifier {
    http: reqwest::Client,
    url: String,
    client: String,
    password: String,
    sender: String,
}

impl SmsGatewayNotifier {
    pub fn new(url: &str, client: &str, password: &str, sender: &str) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Setup(e.to_string()))?;
        Ok(Self {
            http,
            url: url.to_string(),
            client: client.to_string(),
            password: password.to_string(),
            sender: sender.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for SmsGatewayNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("client", self.client.as_str()),
                ("password", self.password.as_str()),
                ("phone", phone),
                ("from", self.sender.as_str()),
                ("text", text),
            ])
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(format!("HTTP {status}")));
        }
        debug!(%phone, %status, "sms accepted by gateway");
        Ok(())
    }

    fn name(&self) -> &str {
        "sms_gateway"
    }
}

/// Build the notifier selected in configuration.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config {
        NotifierConfig::Log => Ok(Arc::new(LogNotifier)),
        NotifierConfig::SmsGateway {
            url,
            client,
            password,
            sender,
        } => Ok(Arc::new(SmsGatewayNotifier::new(
            url, client, password, sender,
        )?)),
    }
}

/// Per-recipient results of one alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Send `text` to every recipient who can receive it.
///
/// A failed delivery is logged and does not stop the others.
pub async fn deliver_to_all(
    notifier: &dyn Notifier,
    recipients: &[Recipient],
    text: &str,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for recipient in recipients.iter().filter(|r| r.can_receive()) {
        let Some(phone) = recipient.phone.as_deref() else {
            continue;
        };
        match notifier.send(phone, text).await {
            Ok(()) => {
                debug!(recipient = %recipient.id, channel = notifier.name(), "alert delivered");
                report.delivered += 1;
            }
            Err(e) => {
                warn!(recipient = %recipient.id, channel = notifier.name(), error = %e, "alert delivery failed");
                report.failed += 1;
            }
        }
    }
    if report.attempted() == 0 {
        warn!("no recipient with notifications enabled and a phone number");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    /// Records every send; fails for listed phone numbers.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        failing: Vec<String>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError> {
            if self.failing.iter().any(|p| p == phone) {
                return Err(NotifyError::Rejected("blocked".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), text.to_string()));
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn recipient(id: &str, phone: Option<&str>, enabled: bool) -> Recipient {
        Recipient {
            id: id.to_string(),
            name: id.to_string(),
            phone: phone.map(str::to_string),
            notifications_enabled: enabled,
        }
    }

    #[tokio::test]
    async fn delivers_only_to_reachable_recipients() {
        let notifier = RecordingNotifier::default();
        let recipients = vec![
            recipient("a", Some("+1"), true),
            recipient("b", None, true),
            recipient("c", Some("+3"), false),
        ];

        let report = deliver_to_all(&notifier, &recipients, "hello").await;
        assert_eq!(report, DeliveryReport { delivered: 1, failed: 0 });
        assert_eq!(notifier.sent.lock().unwrap()[0].0, "+1");
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let notifier = RecordingNotifier {
            failing: vec!["+1".to_string()],
            ..Default::default()
        };
        let recipients = vec![
            recipient("a", Some("+1"), true),
            recipient("b", Some("+2"), true),
            recipient("c", Some("+3"), true),
        ];

        let report = deliver_to_all(&notifier, &recipients, "down").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.attempted(), 3);
    }

    #[tokio::test]
    async fn sms_gateway_sends_query_parameters() {
        let router = Router::new().route(
            "/httpsms/send",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let ok = params.get("client").map(String::as_str) == Some("acme")
                    && params.get("password").map(String::as_str) == Some("secret")
                    && params.get("from").map(String::as_str) == Some("UPWATCH")
                    && params.get("text").map(String::as_str) == Some("API DOWN\nOrders");
                match params.get("phone").map(String::as_str) {
                    Some("+15550100") if ok => StatusCode::OK,
                    _ => StatusCode::BAD_REQUEST,
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let notifier = SmsGatewayNotifier::new(
            &format!("http://{addr}/httpsms/send"),
            "acme",
            "secret",
            "UPWATCH",
        )
        .unwrap();

        notifier.send("+15550100", "API DOWN\nOrders").await.unwrap();
        let err = notifier.send("+19999999", "API DOWN\nOrders").await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(_)));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_transport_error() {
        let notifier =
            SmsGatewayNotifier::new("http://127.0.0.1:1/send", "acme", "secret", "UPWATCH").unwrap();
        let err = notifier.send("+1", "x").await.unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }

    #[test]
    fn from_config_selects_channel() {
        let notifier = from_config(&NotifierConfig::Log).unwrap();
        assert_eq!(notifier.name(), "log");

        let notifier = from_config(&NotifierConfig::SmsGateway {
            url: "https://sms.example.com/httpsms/send".into(),
            client: "acme".into(),
            password: "secret".into(),
            sender: "UPWATCH".into(),
        })
        .unwrap();
        assert_eq!(notifier.name(), "sms_gateway");
    }
}
