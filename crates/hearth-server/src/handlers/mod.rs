//! API route handlers

pub mod console;
pub mod health;
pub mod instances;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::ApiResult;

/// Deserialize an optional JSON body; an empty body yields the defaults
pub(crate) fn optional_json<T>(body: &Bytes) -> ApiResult<T>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}
