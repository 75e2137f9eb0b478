//! Row models and insert DTOs.
//!
//! Status columns are stored as SMALLINT codes; each model exposes typed
//! accessors that reject unknown codes as [`StoreError::Corrupt`].

pub mod activity;
pub mod inventory_lock;
pub mod order;
pub mod product;
pub mod registration;

use wq_core::status::StatusId;

use crate::error::StoreError;

/// Decode a status code or report which table held the bad value.
pub(crate) fn decode_status<T>(
    table: &str,
    id: i64,
    code: StatusId,
    from_id: fn(StatusId) -> Option<T>,
) -> Result<T, StoreError> {
    from_id(code).ok_or_else(|| {
        tracing::error!(table, id, code, "Unknown status code in stored row");
        StoreError::Corrupt(format!("{table} row {id} has unknown status code {code}"))
    })
}
