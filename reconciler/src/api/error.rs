// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::reconciliation::ReconcileError;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    code: &'static str,
    message: String,
    retryable: bool,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Reconcile(ReconcileError::TransientError(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Reconcile(ReconcileError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Reconcile(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Reconcile(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            Self::Reconcile(err) => err.user_message(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::BadRequest(_) => false,
            Self::Reconcile(err) => err.is_retryable(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            ok: false,
            code: self.code(),
            message: self.message(),
            retryable: self.retryable(),
        };
        (self.status(), Json(body)).into_response()
    }
}
