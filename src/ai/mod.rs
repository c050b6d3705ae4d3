pub mod detector;
pub mod vision;

pub use detector::DetectorClient;
pub use vision::VisionClient;

use thiserror::Error;

/// Errors from the external AI services. The annotate pipeline matches on
/// these to tell a dead endpoint (stop early) from a single bad response
/// (skip the file and continue).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service unreachable at {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("service returned HTTP {status}")]
    BadStatus { status: u16 },

    #[error("malformed service response: {0}")]
    BadPayload(String),

    #[error("could not prepare image {path}: {reason}")]
    BadImage { path: String, reason: String },
}

pub(crate) fn request_error(endpoint: &str, err: ureq::Error) -> ServiceError {
    match err {
        ureq::Error::Status(status, _) => ServiceError::BadStatus { status },
        transport => ServiceError::Unreachable {
            endpoint: endpoint.to_string(),
            source: Box::new(transport),
        },
    }
}
