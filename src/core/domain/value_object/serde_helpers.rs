//! Serde helpers for custom serialization.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Serialization and deserialization for `Duration` as whole milliseconds.
pub mod duration_millis {
    use super::*;

    /// Serialize a `Duration` as a u64 representing milliseconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis())
            .map_err(|_| serde::ser::Error::custom("Duration does not fit in u64 milliseconds"))?;
        serializer.serialize_u64(millis)
    }

    /// Deserialize a u64 representing milliseconds into a `Duration`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Deserializes `null` as the type's default value.
///
/// The backend sends `null` for unset strings (`expired_at`, `gpu_name`,
/// `oauth_provider`); the dashboard treats them as empty.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
