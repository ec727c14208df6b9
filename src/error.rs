use serde::Serialize;
use thiserror::Error;

use crate::apply::ApplyError;
use crate::config::ConfigError;
use crate::dom::DomError;
use crate::event::EventError;
use crate::transport::TransportError;
use crate::wire::ResponseError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Dom(#[from] DomError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed response: {0}")]
    Response(#[from] ResponseError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("server error: {title}")]
    Server { title: String, body: String },
    #[error("no form with id '{0}'")]
    UnknownForm(String),
    #[error("element '{0}' is not a control")]
    NotAControl(String),
    #[error("value change has no target control")]
    MissingTarget,
    #[error("client task has stopped")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Transport,
    Protocol,
    Server,
    Application,
    Usage,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_) => ErrorKind::Transport,
            ClientError::Response(_) => ErrorKind::Protocol,
            ClientError::Apply(ApplyError::Malformed(_)) => ErrorKind::Protocol,
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::Apply(_) | ClientError::Dom(_) => ErrorKind::Application,
            ClientError::Event(_)
            | ClientError::Config(_)
            | ClientError::UnknownForm(_)
            | ClientError::NotAControl(_)
            | ClientError::MissingTarget
            | ClientError::Closed => ErrorKind::Usage,
        }
    }
}

/// What the user (or log) is told about a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub form: String,
    pub kind: ErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl ErrorReport {
    pub fn new(form: &str, error: &ClientError) -> Self {
        let detail = match error {
            ClientError::Server { body, .. } if !body.is_empty() => Some(body.clone()),
            ClientError::Apply(apply) => apply.location().map(|at| format!("at {at}")),
            _ => None,
        };
        Self {
            form: form.to_string(),
            kind: error.kind(),
            message: error.to_string(),
            detail,
        }
    }
}
