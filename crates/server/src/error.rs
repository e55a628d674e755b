//! Maps dispatcher-level errors to the wire-visible [`protocol::Response`].

use common::GodisError;
use protocol::Response;

/// Converts any [`GodisError`] into the error response the wire sends back.
/// Every variant becomes a message-carrying `Response::Error`; none of them
/// close the connection or propagate as a panic.
pub fn to_response(err: GodisError) -> Response {
    Response::Error {
        message: err.to_string(),
    }
}
