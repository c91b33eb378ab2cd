//! Null-tolerant field decoding.
//!
//! The backend serializes unset optional fields as explicit `null`.
//! `#[serde(default)]` only covers absent fields, so defaulted fields route
//! through [`null_as_default`] as well.

use serde::{Deserialize, Deserializer};

/// Decode `null` (or an absent field, together with `#[serde(default)]`)
/// as `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
