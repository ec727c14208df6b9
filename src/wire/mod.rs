//! XML request envelope and response parsing.

mod request;
pub mod response;

pub use request::{build_request, escape_value};
pub use response::{parse_response, Response, ResponseError};

use serde::Serialize;

pub const XXF_NS: &str = "http://orbeon.org/oxf/xml/xforms";

/// Opaque session tokens round-tripped with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateTokens {
    pub static_state: String,
    pub dynamic_state: String,
    /// Dynamic state the page was loaded with.
    pub initial_dynamic_state: Option<String>,
}
