use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("client init failed: {0}")]
    Client(String),

    #[error("api resource not found for {0}")]
    UnknownKind(String),

    #[error("{id} is invalid, error: {reason}")]
    Validation { id: String, reason: String },

    #[error("{id} immutable field detected, error: {reason}")]
    Immutable { id: String, reason: String },

    #[error("{id} field manager conflict, error: {reason}")]
    Conflict { id: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{id} {op} failed, error: {source}")]
    Transport {
        id: String,
        op: &'static str,
        #[source]
        source: kube::Error,
    },

    #[error("timeout waiting for: [{}]", pending.join(", "))]
    Deadline { pending: Vec<String> },

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// True when the wrapped API error is a 404.
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// True when the server rejected a server-side apply because an immutable
/// field changed. The API server reports this as an Invalid status whose
/// message names the field.
pub(crate) fn is_immutable_error(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.message.contains("immutable"))
}

pub(crate) fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}
