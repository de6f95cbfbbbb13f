use crate::http::{HttpClient, HttpRequest, HttpResponse};
use std::collections::HashMap;
use std::sync::Mutex;

/// Answers requests by URL path suffix and records every request it sees.
/// Unscripted paths fail as if the server were unreachable.
#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<HashMap<String, (u16, String)>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, status_code: u16, body: impl Into<String>) {
        self.responses
            .lock()
            .expect("mutex should not be poisoned")
            .insert(path.to_string(), (status_code, body.into()));
    }

    pub fn forget(&self, path: &str) {
        self.responses
            .lock()
            .expect("mutex should not be poisoned")
            .remove(path);
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        self.requests
            .lock()
            .expect("mutex should not be poisoned")
            .push(request.clone());
        let responses = self.responses.lock().expect("mutex should not be poisoned");
        let scripted = responses
            .iter()
            .find(|(path, _)| request.url.ends_with(path.as_str()))
            .map(|(_, response)| response.clone());
        match scripted {
            Some((status_code, body)) => Ok(HttpResponse {
                status_code,
                body: body.into_bytes(),
            }),
            None => Err(anyhow::anyhow!("connection refused: {}", request.url)),
        }
    }
}
