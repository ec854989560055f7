//! Shared JSON decoding for the v1 and v2 series endpoints.

use std::fmt;

use serde::de::{
    self, DeserializeOwned, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor,
};
use serde::{Deserialize, Deserializer};

/// Decodes `{"series": [...]}` and appends all series to `series`.
///
/// Unlike a derived implementation, this only accepts a JSON object at the top level. Unknown keys
/// are skipped and a `null` series list is treated as empty.
pub fn decode_series<T>(data: &[u8], series: &mut Vec<T>) -> serde_json::Result<()>
where
    T: DeserializeOwned,
{
    let mut deserializer = serde_json::Deserializer::from_slice(data);
    (&mut deserializer).deserialize_map(SeriesVisitor(series))?;
    deserializer.end()
}

/// Deserializes `null` as the default value.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(field_identifier, rename_all = "lowercase")]
enum Field {
    Series,
    #[serde(other)]
    Other,
}

struct SeriesVisitor<'a, T>(&'a mut Vec<T>);

impl<'de, T> Visitor<'de> for SeriesVisitor<'_, T>
where
    T: Deserialize<'de>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an object with a series list")
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let series = self.0;

        while let Some(field) = map.next_key()? {
            match field {
                Field::Series => map.next_value_seed(ExtendVec(&mut *series))?,
                Field::Other => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(())
    }
}

/// Appends the elements of a JSON array to an existing vector.
struct ExtendVec<'a, T>(&'a mut Vec<T>);

impl<'de, T> DeserializeSeed<'de> for ExtendVec<'_, T>
where
    T: Deserialize<'de>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, T> Visitor<'de> for ExtendVec<'_, T>
where
    T: Deserialize<'de>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a list of series")
    }

    fn visit_unit<E>(self) -> Result<(), E>
    where
        E: de::Error,
    {
        Ok(())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        if let Some(hint) = seq.size_hint() {
            self.0.reserve(hint);
        }

        while let Some(element) = seq.next_element()? {
            self.0.push(element);
        }

        Ok(())
    }
}
