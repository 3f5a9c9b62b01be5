use super::ConnectionRef;
use serde::{
    Deserialize,
    Deserializer,
};
use serde_json::Value;

/// One entry of `/v3/paths/list`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDescriptor {
    pub name: String,
    #[serde(default)]
    pub source: Option<ConnectionRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub readers: Vec<ConnectionRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracks: Vec<Value>,
    #[serde(default)]
    pub bytes_received: Option<u64>,
    #[serde(default)]
    pub bytes_sent: Option<u64>,
}

impl PathDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Decodes one listing item.
    ///
    /// An item whose body does not decode but that still carries a name is kept
    /// as a bare path, so it shows up without source or readers instead of
    /// vanishing. Items without a name are dropped.
    pub fn from_item(item: Value) -> Option<Self> {
        let name = item.get("name").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value::<Self>(item) {
            Ok(path) => Some(path),
            Err(err) => match name {
                Some(name) => {
                    warn!(path = %name, %err, "Path entry only partially decodable");
                    Some(Self::named(name))
                }
                None => {
                    warn!(%err, "Skipping path entry without a name");
                    None
                }
            },
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
