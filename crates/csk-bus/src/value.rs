// ── Variant → JSON conversion ──
//
// Reply and signal bodies are handed to consumers as serde_json values so
// the core never depends on zvariant. Object paths and signatures become
// strings, byte arrays become arrays of numbers, dictionaries become
// objects keyed by the stringified key.

use serde_json::{Map, Number, Value as Json};
use zvariant::Value;

pub(crate) fn to_json(value: &Value<'_>) -> Json {
    match value {
        Value::U8(n) => Json::from(*n),
        Value::Bool(b) => Json::Bool(*b),
        Value::I16(n) => Json::from(*n),
        Value::U16(n) => Json::from(*n),
        Value::I32(n) => Json::from(*n),
        Value::U32(n) => Json::from(*n),
        Value::I64(n) => Json::from(*n),
        Value::U64(n) => Json::from(*n),
        Value::F64(n) => Number::from_f64(*n).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s.as_str().to_owned()),
        Value::Signature(s) => Json::String(s.to_string()),
        Value::ObjectPath(p) => Json::String(p.as_str().to_owned()),
        Value::Value(inner) => to_json(inner),
        Value::Array(array) => Json::Array(array.iter().map(to_json).collect()),
        Value::Dict(dict) => {
            let mut map = Map::new();
            for (key, value) in dict.iter() {
                map.insert(key_string(key), to_json(value));
            }
            Json::Object(map)
        }
        Value::Structure(structure) => {
            Json::Array(structure.fields().iter().map(to_json).collect())
        }
        _ => Json::Null,
    }
}

fn key_string(key: &Value<'_>) -> String {
    match key {
        Value::Str(s) => s.as_str().to_owned(),
        Value::ObjectPath(p) => p.as_str().to_owned(),
        other => to_json(other).to_string(),
    }
}
