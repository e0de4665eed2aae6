pub mod error;

pub use error::{ClientError, Result};

use std::time::Duration;

use async_trait::async_trait;
use driftlog_common::{Event, ListResponse, TimeResponse};
use serde::Serialize;

/// The five lab endpoints, as seen from a session.
///
/// `LabClient` talks HTTP; tests substitute in-memory implementations.
#[async_trait]
pub trait LabApi: Send + Sync {
    /// Send one event to the stream endpoint. The response body is not consumed.
    async fn send_stream(&self, event: &Event) -> Result<()>;

    /// Upload a whole batch of buffered events.
    async fn send_bulk(&self, events: &[Event]) -> Result<()>;

    /// Fetch the server's stream records and bulk snapshot.
    async fn list(&self) -> Result<ListResponse>;

    /// Clear all server-side state for this user.
    async fn reset(&self) -> Result<()>;

    /// Ask the server for its current time.
    async fn server_time(&self) -> Result<TimeResponse>;
}

#[derive(Serialize)]
struct BulkBody<'a> {
    events: &'a [Event],
}

pub struct LabClient {
    client: reqwest::Client,
    base_url: String,
    user: String,
}

impl LabClient {
    pub fn new(base_url: &str, user: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name)
    }

    fn user_query(&self) -> [(&'static str, &str); 1] {
        [("user", self.user.as_str())]
    }
}

/// Turn a non-success response into `ClientError::Api`, keeping the body verbatim.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

#[async_trait]
impl LabApi for LabClient {
    async fn send_stream(&self, event: &Event) -> Result<()> {
        let resp = self
            .client
            .post(self.endpoint("stream"))
            .query(&self.user_query())
            .json(event)
            .send()
            .await?;

        check(resp).await?;
        Ok(())
    }

    async fn send_bulk(&self, events: &[Event]) -> Result<()> {
        tracing::info!(count = events.len(), user = %self.user, "Uploading bulk events");

        let resp = self
            .client
            .post(self.endpoint("bulk"))
            .query(&self.user_query())
            .json(&BulkBody { events })
            .send()
            .await?;

        check(resp).await?;
        Ok(())
    }

    async fn list(&self) -> Result<ListResponse> {
        let resp = self
            .client
            .get(self.endpoint("list"))
            .query(&self.user_query())
            .send()
            .await?;

        let body = check(resp).await?.text().await?;
        let list: ListResponse = serde_json::from_str(&body)?;
        tracing::debug!(
            stream = list.stream.len(),
            bulk = list.bulk.events.len(),
            "Fetched server records"
        );
        Ok(list)
    }

    async fn reset(&self) -> Result<()> {
        let resp = self
            .client
            .post(self.endpoint("reset"))
            .query(&self.user_query())
            .send()
            .await?;

        check(resp).await?;
        tracing::info!(user = %self.user, "Server logs reset");
        Ok(())
    }

    async fn server_time(&self) -> Result<TimeResponse> {
        let resp = self
            .client
            .get(self.endpoint("time"))
            .query(&self.user_query())
            .send()
            .await?;

        let body = check(resp).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}
