//! Response bodies.
//!
//! Every bridge response is HTTP 200 with a JSON body: `{"receiptId": ...}`
//! on success, `{"exception": ...}` otherwise. Clients rely on the body, not
//! the status code, to tell the two apart.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::broker::ReceiptId;
use crate::http::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeResponse {
    Receipt {
        #[serde(rename = "receiptId")]
        receipt_id: String,
    },
    Exception {
        exception: String,
    },
}

impl BridgeResponse {
    pub fn receipt(id: &ReceiptId) -> Self {
        BridgeResponse::Receipt {
            receipt_id: id.to_string(),
        }
    }

    pub fn exception(reason: impl Into<String>) -> Self {
        BridgeResponse::Exception {
            exception: reason.into(),
        }
    }
}

impl From<Result<ReceiptId, BridgeError>> for BridgeResponse {
    fn from(result: Result<ReceiptId, BridgeError>) -> Self {
        match result {
            Ok(id) => BridgeResponse::receipt(&id),
            Err(e) => BridgeResponse::exception(e.to_string()),
        }
    }
}

impl IntoResponse for BridgeResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_body() {
        let body = serde_json::to_string(&BridgeResponse::receipt(&ReceiptId::from("r1"))).unwrap();
        assert_eq!(body, r#"{"receiptId":"r1"}"#);
    }

    #[test]
    fn error_bodies() {
        let timeout: BridgeResponse = Err(BridgeError::TimedOut).into();
        assert_eq!(
            serde_json::to_value(&timeout).unwrap(),
            serde_json::json!({"exception": "timeout. unable to confirm message send"})
        );

        let bad: BridgeResponse = Err(BridgeError::BadRequest("missing message".into())).into();
        assert_eq!(
            serde_json::to_value(&bad).unwrap(),
            serde_json::json!({"exception": "bad request: missing message"})
        );
    }

    #[test]
    fn always_ok_status() {
        let response = BridgeResponse::exception("boom").into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(axum::http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
