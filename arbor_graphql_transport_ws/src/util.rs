use serde::{Deserialize, Deserializer};

/// Deserializes `null` as the default value, so clients may send
/// `"variables": null` interchangeably with omitting the field.
pub fn default_for_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
