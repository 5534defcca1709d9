/// Request body extractors that reject with `MeterError`
use crate::error::MeterError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;

/// JSON body whose rejections surface as `400 InvalidArgument`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = MeterError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// JSON body that may be left out entirely
///
/// An empty body yields `None`. Anything else must be well-formed JSON of
/// the expected shape, sent as `application/json`.
#[derive(Debug, Clone, Default)]
pub struct OptionalJsonBody<T>(pub Option<T>);

#[async_trait]
impl<S, T> FromRequest<S> for OptionalJsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = MeterError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let json_content = has_json_content_type(req.headers());
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|_| MeterError::InvalidArgument("Request body could not be read".to_string()))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJsonBody(None));
        }
        if !json_content {
            return Err(MeterError::InvalidArgument(
                "Expected request with Content-Type: application/json".to_string(),
            ));
        }

        let Json(value) = Json::<T>::from_bytes(&bytes)?;
        Ok(OptionalJsonBody(Some(value)))
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::HeaderValue};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        amount: i64,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_json_body_mistyped_field_is_invalid_argument() {
        let err = JsonBody::<Payload>::from_request(
            request(Some("application/json"), r#"{"amount":"ten"}"#),
            &(),
        )
        .await
        .unwrap_err();

        match err {
            MeterError::InvalidArgument(message) => assert!(!message.contains("i64")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_json_body_requires_content_type() {
        let result = JsonBody::<Payload>::from_request(request(None, r#"{"amount":1}"#), &()).await;
        assert!(matches!(result, Err(MeterError::InvalidArgument(_))));

        let JsonBody(payload) = JsonBody::<Payload>::from_request(
            request(Some("application/json; charset=utf-8"), r#"{"amount":1}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(payload.amount, 1);
    }

    #[tokio::test]
    async fn test_optional_body_empty_is_none() {
        let OptionalJsonBody(payload) =
            OptionalJsonBody::<Payload>::from_request(request(None, ""), &())
                .await
                .unwrap();
        assert!(payload.is_none());

        let OptionalJsonBody(payload) =
            OptionalJsonBody::<Payload>::from_request(request(Some("application/json"), "  "), &())
                .await
                .unwrap();
        assert!(payload.is_none());
    }

    #[tokio::test]
    async fn test_optional_body_malformed_is_rejected() {
        for (content_type, body) in [
            (Some("application/json"), r#"{"amount":"x"}"#),
            (Some("application/json"), "{not json"),
            (None, r#"{"amount":1}"#),
        ] {
            let result =
                OptionalJsonBody::<Payload>::from_request(request(content_type, body), &()).await;
            assert!(matches!(result, Err(MeterError::InvalidArgument(_))), "{:?}", body);
        }
    }

    #[test]
    fn test_json_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!has_json_content_type(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        assert!(has_json_content_type(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!has_json_content_type(&headers));
    }
}
