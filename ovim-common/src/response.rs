use std::fmt::{Debug, Display};

use axum::{Json, http::StatusCode, response::Response};
use owo_colors::OwoColorize;
use serde::Serialize;

pub fn print_error<T: Display>(e: T) {
    eprintln!("{}", format!("error: {e}").red());
}

pub fn print_warning<T: Display>(e: T) {
    eprintln!("{}", format!("warning: {e}").yellow());
}

#[derive(Serialize)]
struct ErrorBody {
    reason: String,
}

fn err_resp<T: Display + Debug>(e: T, code: StatusCode) -> Response {
    use axum::response::IntoResponse;
    let reason = e.to_string();
    print_error(&e);
    (
        code,
        Json(ErrorBody {
            reason,
        }),
    )
        .into_response()
}

pub fn not_found<T: Display + Debug>(e: T) -> Response {
    err_resp(e, StatusCode::NOT_FOUND)
}

pub fn bad_request<T: Display + Debug>(e: T) -> Response {
    err_resp(e, StatusCode::BAD_REQUEST)
}

pub fn conflict<T: Display + Debug>(e: T) -> Response {
    err_resp(e, StatusCode::CONFLICT)
}

pub fn internal_server_error<T: Display + Debug>(e: T) -> Response {
    err_resp(e, StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn service_unavailable<T: Display + Debug>(e: T) -> Response {
    err_resp(e, StatusCode::SERVICE_UNAVAILABLE)
}
