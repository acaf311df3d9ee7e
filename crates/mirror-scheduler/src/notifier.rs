//! Webhook notifier: posts a JSON summary to a single URL with HTTP
//! Basic credentials. Fire-and-forget — failures are logged, never
//! propagated, matching `NotificationManager::notify_job_completed`.

use std::time::Duration;

use mirror_common::config::WebhookConfig;
use serde_json::Value;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookNotifier {
    http: reqwest::Client,
    config: Option<WebhookConfig>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builder should not fail with static config");

        Self { http, config: config.enabled.then(|| config.clone()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Posts `payload` to the configured webhook. Always returns without
    /// propagating an error; every outcome is logged.
    pub async fn notify(&self, payload: Value) {
        let Some(config) = &self.config else { return };

        let result = self
            .http
            .post(&config.url)
            .basic_auth(&config.username, Some(&config.password))
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("webhook notification delivered");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "webhook notification rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhook notification failed to send");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_config() -> WebhookConfig {
        WebhookConfig { enabled: false, username: String::new(), password: String::new(), url: String::new() }
    }

    #[tokio::test]
    async fn disabled_notifier_is_a_noop() {
        let notifier = WebhookNotifier::new(&disabled_config());
        assert!(!notifier.is_enabled());
        notifier.notify(serde_json::json!({"ok": true})).await;
    }

    #[tokio::test]
    async fn enabled_notifier_posts_basic_auth_json() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/hook"))
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let config = WebhookConfig {
            enabled: true,
            username: "bot".into(),
            password: "secret".into(),
            url: format!("{}/hook", server.uri()),
        };
        let notifier = WebhookNotifier::new(&config);
        notifier.notify(serde_json::json!({"job": "full_sweep"})).await;
    }
}
