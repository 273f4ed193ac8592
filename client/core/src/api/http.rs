//! REST implementation of [`GameMasterApi`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{ApiError, GameMasterApi};
use crate::messages::{
    DeleteResponse, EditRequest, FieldMap, FieldsPayload, HistoryResponse, MessageId,
    ServerConfigMap, ServerConfigPayload, StatusResponse, STATUS_SUCCESS,
};

/// HTTP client for the peer's REST endpoints
#[derive(Clone, Debug)]
pub struct HttpApi {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpApi {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`)
    ///
    /// # Errors
    ///
    /// `ApiError::Request` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Base URL of the peer
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .http_client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        decode(check_status(response)?).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let mut request = self.http_client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        decode(check_status(response)?).await
    }
}

fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound);
    }
    if !status.is_success() {
        warn!(status = %status, url = %response.url(), "Request failed");
        return Err(ApiError::HttpStatus(status.as_u16()));
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}

fn require_success(response: &StatusResponse) -> Result<(), ApiError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ApiError::Rejected {
            status: response.status.clone(),
        })
    }
}

#[async_trait]
impl GameMasterApi for HttpApi {
    async fn fetch_history(&self) -> Result<HistoryResponse, ApiError> {
        let history: HistoryResponse = self.get("get_chat_history").await?;
        debug!(
            count = history.history.len(),
            next_message_id = history.next_message_id,
            "Fetched transcript"
        );
        Ok(history)
    }

    async fn edit_message(&self, id: MessageId, content: &str) -> Result<(), ApiError> {
        let body = EditRequest {
            id,
            content: content.to_string(),
        };
        let response: StatusResponse = self.post("edit_message", Some(&body)).await?;
        require_success(&response)
    }

    async fn delete_message(&self, id: MessageId) -> Result<MessageId, ApiError> {
        let response = self
            .http_client
            .delete(self.url(&format!("delete_message/{id}")))
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let response: DeleteResponse = decode(check_status(response)?).await?;

        if response.status == STATUS_SUCCESS {
            Ok(response.next_message_id)
        } else {
            Err(ApiError::Rejected {
                status: response.status,
            })
        }
    }

    async fn fetch_fields(&self) -> Result<FieldMap, ApiError> {
        let payload: FieldsPayload = self.get("get_template_fields").await?;
        Ok(payload.fields)
    }

    async fn update_fields(&self, fields: &FieldMap) -> Result<(), ApiError> {
        let body = FieldsPayload {
            fields: fields.clone(),
        };
        let response: StatusResponse = self.post("update_template_fields", Some(&body)).await?;
        require_success(&response)
    }

    async fn save_game(&self) -> Result<(), ApiError> {
        let response: StatusResponse = self.post::<(), _>("save_game", None).await?;
        require_success(&response)
    }

    async fn fetch_server_config(&self) -> Result<ServerConfigMap, ApiError> {
        let payload: ServerConfigPayload = self.get("get_config").await?;
        Ok(payload.config)
    }

    async fn update_server_config(&self, config: &ServerConfigMap) -> Result<(), ApiError> {
        let body = ServerConfigPayload {
            config: config.clone(),
        };
        let response: StatusResponse = self.post("update_config", Some(&body)).await?;
        require_success(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api_for(server: &MockServer) -> HttpApi {
        HttpApi::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get_chat_history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "history": [
                    {"role": "user", "content": "hello", "id": 0},
                    {"role": "assistant", "content": "Greetings.", "id": 1}
                ],
                "next_message_id": 2
            })))
            .mount(&server)
            .await;

        let history = api_for(&server).await.fetch_history().await.unwrap();
        assert_eq!(history.next_message_id, 2);
        assert_eq!(history.history[1].role, Role::Assistant);
        assert_eq!(history.history[1].content, "Greetings.");
    }

    #[tokio::test]
    async fn test_edit_sends_id_and_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/edit_message"))
            .and(body_json(json!({"id": 4, "content": "I draw my sword"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        let result = api_for(&server)
            .await
            .edit_message(4, "I draw my sword")
            .await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_edit_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/edit_message"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Message not found"})))
            .mount(&server)
            .await;

        let result = api_for(&server).await.edit_message(99, "x").await;
        assert_eq!(result, Err(ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/save_game"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "error"})))
            .mount(&server)
            .await;

        let result = api_for(&server).await.save_game().await;
        assert_eq!(
            result,
            Err(ApiError::Rejected {
                status: "error".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_delete_returns_next_id() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete_message/7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "success", "next_message_id": 7})),
            )
            .mount(&server)
            .await;

        let next = api_for(&server).await.delete_message(7).await.unwrap();
        assert_eq!(next, 7);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/delete_message/3"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = api_for(&server).await.delete_message(3).await;
        assert_eq!(result, Err(ApiError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_fields_roundtrip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get_template_fields"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fields": {"location": "Tavern", "quest": "Find the ring"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/update_template_fields"))
            .and(body_json(json!({"fields": {"location": "Forest"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server).await;
        let fields = api.fetch_fields().await.unwrap();
        assert_eq!(fields.get("location").map(String::as_str), Some("Tavern"));

        let mut update = FieldMap::new();
        update.insert("location".to_string(), "Forest".to_string());
        assert_eq!(api.update_fields(&update).await, Ok(()));
    }

    #[tokio::test]
    async fn test_server_config() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get_config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "config": {"temperature": 0.7, "max_tokens": 512}
            })))
            .mount(&server)
            .await;

        let config = api_for(&server).await.fetch_server_config().await.unwrap();
        assert_eq!(config.get("max_tokens"), Some(&json!(512)));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/get_chat_history"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let result = api_for(&server).await.fetch_history().await;
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = HttpApi::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8000");
        assert_eq!(api.url("save_game"), "http://localhost:8000/api/save_game");
    }
}
