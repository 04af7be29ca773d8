use rocket::{catch, serde::json::Json, Request};
use serde::Serialize;

#[derive(Serialize)]
pub struct ErrorMessage {
    error: String,
    status: u16,
}

fn message(error: &str, status: u16) -> Json<ErrorMessage> {
    Json(ErrorMessage { error: error.into(), status })
}

#[catch(400)]
pub fn bad_request(_req: &Request) -> Json<ErrorMessage> {
    message("Invalid request parameters.", 400)
}

#[catch(401)]
pub fn unauthorized(_req: &Request) -> Json<ErrorMessage> {
    message("Unauthorized. Please log in.", 401)
}

#[catch(403)]
pub fn forbidden(req: &Request) -> Json<ErrorMessage> {
    let error = match req.uri().path().segments().next() {
        Some("api") if req.uri().path().segments().nth(1) == Some("admin") => "Admin access required.",
        _ => "Access forbidden.",
    };
    message(error, 403)
}

#[catch(404)]
pub fn not_found(_req: &Request) -> Json<ErrorMessage> {
    message("The requested resource was not found.", 404)
}

#[catch(409)]
pub fn conflict(_req: &Request) -> Json<ErrorMessage> {
    message("The request conflicts with the current election state.", 409)
}

#[catch(422)]
pub fn unprocessable(_req: &Request) -> Json<ErrorMessage> {
    message("Malformed request body.", 422)
}

#[catch(429)]
pub fn too_many_requests(_req: &Request) -> Json<ErrorMessage> {
    message("Rate limit exceeded. Please wait before trying again.", 429)
}

#[catch(500)]
pub fn internal_error(_req: &Request) -> Json<ErrorMessage> {
    message("An internal server error occurred.", 500)
}

#[catch(503)]
pub fn service_unavailable(_req: &Request) -> Json<ErrorMessage> {
    message("The election ledger is temporarily unavailable.", 503)
}
