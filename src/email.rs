//! Outage email rendering and delivery.
//!
//! Grounded on `original_source/app/services/email_client.py`'s `BrevoEmailClient`
//! (JSON payload shape, `test_mode` short circuit) and
//! `outage_notification_service.py::_send_outage_email`'s workspace-name
//! collapsing rule. The teacher has no email analog; the `EmailProvider`
//! trait mirrors this codebase's other adapter seams
//! (`persistence::PersistenceBackend`) — an `#[async_trait]` object behind
//! an `Arc`, shared across the Notification Coordinator.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

/// One endpoint in a flush buffer, resolved to display names for the email body.
#[derive(Debug, Clone)]
pub struct BufferedEndpoint {
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub workspace_name: String,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Builds the subject/body for a flush: singular/plural endpoint count,
/// workspace name collapsed to `"Multiple Workspaces"` when the buffer spans
/// more than one.
pub fn render_outage_email(endpoints: &[BufferedEndpoint]) -> RenderedEmail {
    let count = endpoints.len();
    let distinct_workspaces: std::collections::HashSet<&str> =
        endpoints.iter().map(|e| e.workspace_name.as_str()).collect();

    let workspace_label = if distinct_workspaces.len() > 1 {
        "Multiple Workspaces".to_string()
    } else {
        endpoints
            .first()
            .map(|e| e.workspace_name.clone())
            .unwrap_or_else(|| "Unknown Workspace".to_string())
    };

    let subject = if count == 1 {
        format!("1 endpoint down in \"{}\"", workspace_label)
    } else {
        format!("{} endpoints down in \"{}\"", count, workspace_label)
    };

    let mut html = format!(
        "<h2>{}</h2><p>The following endpoints are currently failing:</p><ul>",
        subject
    );
    let mut text = format!("{}\n\nThe following endpoints are currently failing:\n", subject);
    for endpoint in endpoints {
        html.push_str(&format!(
            "<li><strong>{}</strong> ({}) — {} consecutive failures</li>",
            endpoint.endpoint_name, endpoint.workspace_name, endpoint.consecutive_failures
        ));
        text.push_str(&format!(
            "- {} ({}) — {} consecutive failures\n",
            endpoint.endpoint_name, endpoint.workspace_name, endpoint.consecutive_failures
        ));
    }
    html.push_str("</ul>");

    RenderedEmail { subject, html, text }
}

/// Adapter the Notification Coordinator sends through. Implementations must
/// never panic; a failed send simply returns `false`, which resets the
/// caller's state machine to Ready.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_outage_email(&self, to: &str, email: &RenderedEmail) -> bool;
}

/// Always succeeds without making a network call — the engine's default
/// when no email provider is configured, and what tests use.
#[derive(Debug, Default)]
pub struct NoopEmailProvider;

#[async_trait]
impl EmailProvider for NoopEmailProvider {
    async fn send_outage_email(&self, to: &str, email: &RenderedEmail) -> bool {
        debug!(to, subject = %email.subject, "noop email provider: would send outage email");
        true
    }
}

/// Posts to a transactional email HTTP API. Payload shape mirrors the
/// original's Brevo client: sender/recipient envelope, `htmlContent` and
/// `textContent` fields.
pub struct HttpEmailProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

impl HttpEmailProvider {
    pub fn new(api_url: String, api_key: String, sender_email: String, sender_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            sender_email,
            sender_name,
        }
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send_outage_email(&self, to: &str, email: &RenderedEmail) -> bool {
        let payload = json!({
            "sender": { "name": self.sender_name, "email": self.sender_email },
            "to": [{ "email": to }],
            "subject": email.subject,
            "htmlContent": email.html,
            "textContent": email.text,
        });

        let result = self
            .client
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), to, "outage email send rejected by provider");
                false
            }
            Err(err) => {
                warn!(error = %err, to, "outage email send failed");
                false
            }
        }
    }
}
