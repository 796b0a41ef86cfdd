use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Unwraps a JSON body, turning extractor rejections into the crate's error body.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))
}

pub fn query_params<T>(
    params: Result<axum::extract::Query<T>, QueryRejection>,
) -> Result<T, ServiceError> {
    params
        .map(|axum::extract::Query(params)| params)
        .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))
}

/// Order ids are validated here, at the transport boundary.
pub fn parse_order_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::ValidationError(format!("'{}' is not a valid order id", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_must_be_uuids() {
        let id = Uuid::new_v4();
        assert_eq!(parse_order_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_order_id("order-1"),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
