use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// A 404 for the given target, e.g. `Error::not_found(format!("Election {}", id))`.
    pub fn not_found(target: String) -> Self {
        Self::Status(Status::NotFound, format!("{target} not found"))
    }

    /// A 401 with the given message.
    pub fn unauthorized(message: String) -> Self {
        Self::Status(Status::Unauthorized, message)
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        Err(match self {
            Self::Db(err) => {
                error!("Database error: {err}");
                Status::InternalServerError
            }
            Self::Jwt(err) => match err.into_kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                kind => {
                    warn!("Rejected malformed JWT: {kind:?}");
                    Status::BadRequest
                }
            },
            Self::Status(status, message) => {
                if status.class().is_server_error() {
                    error!("{status}: {message}");
                } else {
                    debug!("{status}: {message}");
                }
                status
            }
        })
    }
}
