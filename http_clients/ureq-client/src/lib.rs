use anyhow::Result;
use async_trait::async_trait;
use chatcore::net::{HttpClient, HttpRequest, HttpResponse};

/// HTTP client implementation using `ureq` for synchronous HTTP requests.
/// Since `ureq` is blocking, all requests are wrapped in `tokio::task::spawn_blocking`.
#[derive(Debug, Clone, Default)]
pub struct UreqHttpClient;

impl UreqHttpClient {
    pub fn new() -> Self {
        Self
    }
}

/// ureq reports 4xx/5xx as errors; the `HttpClient` contract wants them
/// back as responses so callers can tell a refused request from a dead one.
fn into_response(result: Result<ureq::http::Response<ureq::Body>, ureq::Error>) -> Result<HttpResponse> {
    match result {
        Ok(response) => {
            let status_code = response.status().as_u16();
            let body = response.into_body().read_to_vec()?;
            Ok(HttpResponse { status_code, body })
        }
        Err(ureq::Error::StatusCode(status_code)) => Ok(HttpResponse {
            status_code,
            body: Vec::new(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        tokio::task::spawn_blocking(move || {
            let result = match request.method.as_str() {
                "GET" => {
                    let mut req = ureq::get(&request.url);
                    for (key, value) in &request.headers {
                        req = req.header(key, value);
                    }
                    req.call()
                }
                "POST" => {
                    let mut req = ureq::post(&request.url);
                    for (key, value) in &request.headers {
                        req = req.header(key, value);
                    }
                    match request.body {
                        Some(body) => req.send(&body[..]),
                        None => req.send_empty(),
                    }
                }
                method => {
                    return Err(anyhow::anyhow!("Unsupported HTTP method: {}", method));
                }
            };
            into_response(result)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_become_responses() {
        let response = into_response(Err(ureq::Error::StatusCode(401))).unwrap();
        assert_eq!(response.status_code, 401);
        assert!(!response.is_success());
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected() {
        let mut request = HttpRequest::get("http://127.0.0.1:1/");
        request.method = "DELETE".to_string();
        let err = UreqHttpClient::new().execute(request).await.unwrap_err();
        assert!(err.to_string().contains("DELETE"));
    }
}
