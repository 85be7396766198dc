use log::debug;
use model::Metrics;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Credentials, Registry, Subscription, TaskAssignment};
use crate::error::{Result, SessionErr};

const GROUP_HEADER: &str = "Group";

#[derive(Serialize)]
struct RegisterRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
}

#[derive(Deserialize)]
struct RegisterResponse {
    token: String,
}

/// Talks to a registry over its json http api.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base: String,
    http: Client,
}

impl HttpRegistry {
    /// Creates a new `HttpRegistry`.
    ///
    /// # Arguments
    /// * `base` - The registry's base url, e.g. `http://registry:8080`.
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(base, Client::new())
    }

    pub fn with_client(base: impl Into<String>, http: Client) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { base, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    fn authorized(&self, req: RequestBuilder, creds: &Credentials) -> RequestBuilder {
        req.header(GROUP_HEADER, &creds.group)
            .header(header::AUTHORIZATION, &creds.client)
    }
}

/// Turns a non-success answer into the matching error.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(SessionErr::Auth(format!("{status}: {body}")))
        }
        _ => Err(SessionErr::Transient(format!("{status}: {body}"))),
    }
}

impl Registry for HttpRegistry {
    async fn register(&self, group: &str, params: Option<&Value>) -> Result<String> {
        let response = self
            .http
            .post(self.url("register"))
            .header(GROUP_HEADER, group)
            .json(&RegisterRequest { params })
            .send()
            .await?;

        let body: RegisterResponse = check(response).await?.json().await?;
        Ok(body.token)
    }

    async fn subscribe(&self, creds: &Credentials, subscription: &Subscription) -> Result<()> {
        let req = self.http.post(self.url("subscribe")).json(subscription);
        check(self.authorized(req, creds).send().await?).await?;
        Ok(())
    }

    async fn poll_task(&self, creds: &Credentials) -> Result<TaskAssignment> {
        let req = self.http.get(self.url("task"));
        let response = self.authorized(req, creds).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionErr::Transient(format!("no task available: {status}")));
        }

        Ok(response.json().await?)
    }

    async fn fetch_payload(&self, creds: &Credentials, task: &TaskAssignment) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(task.url())
            .header(header::AUTHORIZATION, &creds.client)
            .send()
            .await?;

        let payload = check(response).await?.bytes().await?;
        debug!(size = payload.len(); "fetched task payload");
        Ok(payload.to_vec())
    }

    async fn report_update(
        &self,
        creds: &Credentials,
        task: &TaskAssignment,
        update: Vec<u8>,
    ) -> Result<()> {
        let response = self
            .http
            .post(task.url())
            .header(header::AUTHORIZATION, &creds.client)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(update)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn report_metrics(
        &self,
        creds: &Credentials,
        task: &TaskAssignment,
        metrics: &Metrics,
    ) -> Result<()> {
        let response = self
            .http
            .post(task.url())
            .header(header::AUTHORIZATION, &creds.client)
            .json(metrics)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn unsubscribe(&self, creds: &Credentials) -> Result<()> {
        let req = self.http.post(self.url("unsubscribe")).json(&serde_json::json!({}));
        check(self.authorized(req, creds).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Answers every request with `status_line` and an empty body.
    async fn serve_status(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = vec![0; 4096];
                let _ = stream.read(&mut request).await;

                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        format!("http://{addr}")
    }

    fn creds() -> Credentials {
        Credentials {
            group: "group-1".into(),
            client: "tok-1".into(),
        }
    }

    #[tokio::test]
    async fn test_refused_poll_is_retryable() {
        let registry = HttpRegistry::new(serve_status("401 Unauthorized").await);

        let err = registry.poll_task(&creds()).await.unwrap_err();

        assert!(matches!(err, SessionErr::Transient(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_poll_is_retryable() {
        let registry = HttpRegistry::new(serve_status("404 Not Found").await);

        let err = registry.poll_task(&creds()).await.unwrap_err();

        assert!(matches!(err, SessionErr::Transient(_)));
    }
}
