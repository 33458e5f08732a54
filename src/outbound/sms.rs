//! SMS gateway transport
//!
//! Form-encoded Messages API with basic auth, in the shape of the major
//! hosted gateways.

use super::SendError;
use crate::runtime::SmsTransport;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub struct SmsClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl SmsClient {
    pub fn new(account_sid: String, auth_token: String, base_url: &str) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SendError::unknown(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            account_sid,
            auth_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SmsTransport for SmsClient {
    async fn send_sms(&self, to: &str, from: &str, body: &str) -> Result<(), SendError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::from_status(status, body));
        }
        Ok(())
    }
}
