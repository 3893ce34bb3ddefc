//! HTTP request builder

use super::Response;
use crate::error::Result;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::time::{Duration, Instant};
use url::Url;

/// Builder for HTTP requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: Url,
    headers: HeaderMap,
    timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) http_client: Option<reqwest::Client>,
}

impl RequestBuilder {
    /// Create a new request builder.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            http_client: None,
        }
    }

    /// Set the HTTP client to use
    pub(crate) fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set a header, returning an error if the name or value is invalid.
    ///
    /// # Errors
    /// Returns an error if the header name or value contains invalid characters.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key_str = key.into();
        let value_str = value.into();

        let key = key_str
            .parse::<HeaderName>()
            .map_err(|_| crate::error::Error::InvalidHeaderName(key_str.clone()))?;
        let value = value_str
            .parse::<HeaderValue>()
            .map_err(|_| crate::error::Error::InvalidHeaderValue(key_str.clone()))?;

        Ok(self.header_value(key, value))
    }

    /// Set an already-validated header.
    pub fn header_value(mut self, key: HeaderName, mut value: HeaderValue) -> Self {
        if key == http::header::AUTHORIZATION || key.as_str() == "zsessionid" {
            value.set_sensitive(true);
        }
        self.headers.insert(key, value);
        self
    }

    /// Append query parameters to the request URL.
    pub fn query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        {
            let mut pairs = self.url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key.as_ref(), value.as_ref());
            }
        }
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max retries.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Send the request and get a response.
    ///
    /// Retryable failures (5xx, 429, timeouts) are retried up to
    /// `max_retries` times with exponential backoff, honoring `Retry-After`.
    pub async fn send(self) -> Result<Response> {
        let client = self.http_client.ok_or_else(|| {
            crate::error::Error::HttpClient("No HTTP client configured".to_string())
        })?;

        let mut req = client
            .request(self.method.clone(), self.url.as_str())
            .timeout(self.timeout);

        for (key, value) in &self.headers {
            req = req.header(key, value);
        }

        let started = Instant::now();
        let mut attempt = 0;
        loop {
            match req
                .try_clone()
                .ok_or_else(|| {
                    crate::error::Error::HttpClient("Could not clone request".to_string())
                })?
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    let headers = resp.headers().clone();
                    let body = resp
                        .bytes()
                        .await
                        .map_err(|e| crate::error::Error::Connection(e.to_string()))?
                        .to_vec();

                    let response =
                        Response::new(status, headers, body, attempt, started.elapsed());

                    if response.is_error() && attempt < self.max_retries {
                        let error = crate::error::Error::from_response(
                            status.as_u16(),
                            &String::from_utf8_lossy(response.body()),
                            response.headers(),
                        );

                        if error.is_retryable() {
                            attempt += 1;
                            let delay = error
                                .retry_after()
                                .unwrap_or_else(|| Duration::from_secs(2u64.pow(attempt - 1)));
                            tracing::debug!(
                                attempt,
                                status = status.as_u16(),
                                delay_ms = delay.as_millis(),
                                "Retrying request"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }

                    return Ok(response);
                }
                Err(e) if e.is_timeout() => {
                    if attempt >= self.max_retries {
                        return Err(crate::error::Error::Timeout(self.timeout));
                    }
                    attempt += 1;
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt - 1))).await;
                }
                Err(e) => {
                    return Err(crate::error::Error::Connection(e.to_string()));
                }
            }
        }
    }

    /// Get the method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> RequestBuilder {
        RequestBuilder::new(
            Method::GET,
            Url::parse("https://rally.example.com/slm/webservice/v2.0/defect").unwrap(),
        )
    }

    #[test]
    fn test_query_params_are_encoded() {
        let request = builder().query([("query", "(State = Submitted)"), ("fetch", "true")]);
        let url = request.url().as_str();
        assert!(url.contains("query=%28State+%3D+Submitted%29"));
        assert!(url.contains("fetch=true"));
    }

    #[test]
    fn test_header_rejects_invalid_name() {
        let result = builder().header("bad header", "value");
        assert!(matches!(
            result,
            Err(crate::error::Error::InvalidHeaderName(_))
        ));
    }

    #[test]
    fn test_auth_headers_are_sensitive() {
        let request = builder().header("zsessionid", "_secret").unwrap();
        assert!(request.headers()["zsessionid"].is_sensitive());
    }

    #[test]
    fn test_opaque_header_values_pass_through() {
        let value = HeaderValue::from_bytes(b"caf\xe9").unwrap();
        let request = builder().header_value(HeaderName::from_static("x-team"), value.clone());
        assert_eq!(request.headers()["x-team"], value);
    }

    #[tokio::test]
    async fn test_send_without_client_fails() {
        let result = builder().send().await;
        assert!(matches!(result, Err(crate::error::Error::HttpClient(_))));
    }
}
