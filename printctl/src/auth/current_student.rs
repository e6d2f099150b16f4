use crate::{
    AppState,
    errors::{Error, Result},
    types::StudentId,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

/// The student on whose behalf a request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentStudent {
    pub id: StudentId,
}

impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let header_name = &state.config.auth.proxy_header.header_name;

        let Some(value) = parts.headers.get(header_name.as_str()) else {
            trace!("No {} header present", header_name);
            return Err(Error::Unauthenticated { message: None });
        };

        let id = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<StudentId>().ok())
            .ok_or_else(|| Error::Unauthenticated {
                message: Some(format!("{header_name} header must carry a student UUID")),
            })?;

        Ok(CurrentStudent { id })
    }
}
