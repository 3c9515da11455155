use std::sync::Arc;
use thiserror::Error;

use crate::models::forms::FieldError;
use crate::services::remote::RemoteError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Utilisateur non authentifié")]
    Unauthenticated,
    #[error("{}", summarize_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("{0} introuvable")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// A multi-step loan flow failed at `step`. `compensated` tells whether the
    /// steps committed before it were undone.
    #[error("{source}")]
    Flow {
        flow: &'static str,
        step: &'static str,
        source: RemoteError,
        compensated: bool,
    },
}

impl ServiceError {
    /// Recover an error shared between coalesced cache loads. The last holder
    /// gets it back as is; the others get an equivalent copy.
    pub fn from_shared(shared: Arc<ServiceError>) -> Self {
        Arc::try_unwrap(shared).unwrap_or_else(|shared| match shared.as_ref() {
            ServiceError::Unauthenticated => ServiceError::Unauthenticated,
            ServiceError::Validation(fields) => ServiceError::Validation(fields.clone()),
            ServiceError::NotFound(what) => ServiceError::NotFound(*what),
            ServiceError::InvalidState(msg) => ServiceError::InvalidState(msg.clone()),
            ServiceError::Remote(RemoteError::Api {
                status,
                message,
                code,
            }) => ServiceError::Remote(RemoteError::Api {
                status: *status,
                message: message.clone(),
                code: code.clone(),
            }),
            other => ServiceError::Remote(RemoteError::api(502, other.to_string())),
        })
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Remote(RemoteError::Decode(e))
    }
}

impl From<Vec<FieldError>> for ServiceError {
    fn from(errors: Vec<FieldError>) -> Self {
        ServiceError::Validation(errors)
    }
}

fn summarize_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_error_keeps_backend_details() {
        let shared = Arc::new(ServiceError::Remote(RemoteError::Api {
            status: 403,
            message: "permission denied".to_string(),
            code: Some("42501".to_string()),
        }));
        let _other_holder = shared.clone();

        match ServiceError::from_shared(shared) {
            ServiceError::Remote(RemoteError::Api { status, message, code }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "permission denied");
                assert_eq!(code.as_deref(), Some("42501"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_sole_holder_gets_error_back() {
        let shared = Arc::new(ServiceError::NotFound("Prêt"));
        assert!(matches!(
            ServiceError::from_shared(shared),
            ServiceError::NotFound("Prêt")
        ));
    }
}
