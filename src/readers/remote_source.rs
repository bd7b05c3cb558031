use crate::config::Settings;
use crate::error::{PipelineError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{error, info};

/// HTTP client for the SMN forecast web service.
pub struct RemoteSource {
    client: Client,
    url: String,
}

impl RemoteSource {
    pub fn new(url: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| PipelineError::Fetch(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.source_url,
            settings.request_timeout(),
            &settings.user_agent,
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw response body; usually a gzip-compressed JSON document.
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        info!(url = %self.url, "Requesting weather data");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            error!(url = %self.url, error = %e, "Weather service unreachable");
            PipelineError::Fetch(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Fetch(format!(
                "Response code: {}. Response message: {}",
                status.as_u16(),
                body
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Fetch(format!("could not read response body: {}", e)))?;

        info!(bytes = body.len(), "Weather data received");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port
    async fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/webservices/?method=1", address)
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let url = serve_once("200 OK", b"[{\"ides\": 1}]").await;
        let source = RemoteSource::new(&url, Duration::from_secs(5), "Custom").unwrap();

        let body = source.fetch().await.unwrap();
        assert_eq!(body, b"[{\"ides\": 1}]".to_vec());
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let url = serve_once("503 Service Unavailable", b"maintenance").await;
        let source = RemoteSource::new(&url, Duration::from_secs(5), "Custom").unwrap();

        match source.fetch().await {
            Err(PipelineError::Fetch(message)) => {
                assert!(message.contains("503"));
                assert!(message.contains("maintenance"));
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let source = RemoteSource::new(
            &format!("http://{}/", address),
            Duration::from_secs(2),
            "Custom",
        )
        .unwrap();
        assert!(matches!(
            source.fetch().await,
            Err(PipelineError::Fetch(_))
        ));
    }
}
