// ── Shape-validated property extraction ──
//
// Daemon replies arrive as loosely-typed JSON. Every accessor here checks
// the shape before extracting; a present-but-malformed field is logged and
// skipped, never fatal.

use csk_bus::{PROPERTIES_INTERFACE, Reply, Signal};
use serde_json::{Map, Value};
use tracing::warn;

use crate::model::ObjectPath;

/// A property dictionary plus the object it came from, for logging.
pub(crate) struct Props<'a> {
    map: &'a Map<String, Value>,
    origin: &'a str,
}

impl<'a> Props<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>, origin: &'a str) -> Self {
        Self { map, origin }
    }

    /// `GetAll` replies carry a single `a{sv}` body field.
    pub(crate) fn from_reply(reply: &'a Reply, origin: &'a str) -> Option<Self> {
        match reply.first() {
            Some(Value::Object(map)) => Some(Self::new(map, origin)),
            other => {
                warn!(origin, reply = ?other, "property reply is not a dictionary");
                None
            }
        }
    }

    /// Decode a properties-changed signal. Accepts the standard
    /// `PropertiesChanged(s interface, a{sv} changed, as invalidated)` form
    /// and the older per-interface `PropertiesChanged(a{sv})` form.
    pub(crate) fn from_signal(signal: &'a Signal) -> Option<(&'a str, Self)> {
        if signal.member != "PropertiesChanged" {
            return None;
        }
        let origin = signal.path.as_str();

        if signal.interface == PROPERTIES_INTERFACE {
            let interface = signal.str_arg(0);
            let changed = signal.arg(1);
            return match (interface, changed) {
                (Some(interface), Some(Value::Object(map))) => {
                    Some((interface, Self::new(map, origin)))
                }
                _ => {
                    warn!(origin, args = ?signal.args, "malformed PropertiesChanged");
                    None
                }
            };
        }

        match signal.arg(0) {
            Some(Value::Object(map)) => Some((signal.interface.as_str(), Self::new(map, origin))),
            _ => {
                warn!(origin, args = ?signal.args, "malformed legacy PropertiesChanged");
                None
            }
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn mismatch(&self, key: &str, expected: &str, value: &Value) {
        warn!(origin = self.origin, key, expected, got = %value, "unexpected property shape");
    }

    pub(crate) fn u64(&self, key: &str) -> Option<u64> {
        let value = self.map.get(key)?;
        let parsed = value.as_u64();
        if parsed.is_none() {
            self.mismatch(key, "unsigned integer", value);
        }
        parsed
    }

    pub(crate) fn bool(&self, key: &str) -> Option<bool> {
        let value = self.map.get(key)?;
        let parsed = value.as_bool();
        if parsed.is_none() {
            self.mismatch(key, "boolean", value);
        }
        parsed
    }

    pub(crate) fn str(&self, key: &str) -> Option<&'a str> {
        let value = self.map.get(key)?;
        let parsed = value.as_str();
        if parsed.is_none() {
            self.mismatch(key, "string", value);
        }
        parsed
    }

    /// `ay` properties.
    pub(crate) fn bytes(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.map.get(key)?;
        let parsed = value.as_array().and_then(|items| {
            items
                .iter()
                .map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()
        });
        if parsed.is_none() {
            self.mismatch(key, "byte array", value);
        }
        parsed
    }

    /// `ao` properties.
    pub(crate) fn object_paths(&self, key: &str) -> Option<Vec<ObjectPath>> {
        let value = self.map.get(key)?;
        let parsed = path_array(value);
        if parsed.is_none() {
            self.mismatch(key, "object path array", value);
        }
        parsed
    }
}

fn path_array(value: &Value) -> Option<Vec<ObjectPath>> {
    value
        .as_array()?
        .iter()
        .map(|p| p.as_str().and_then(ObjectPath::parse_ref))
        .collect()
}

/// Enumeration replies (`GetAllDevices`, `GetAllAccessPoints`) carry a
/// single `ao` body field.
pub(crate) fn object_path_list(reply: &Reply, origin: &str) -> Option<Vec<ObjectPath>> {
    let parsed = reply.first().and_then(path_array);
    if parsed.is_none() {
        warn!(origin, reply = ?reply, "enumeration reply is not an object path array");
    }
    parsed
}

/// SSIDs are raw byte strings of known length, not NUL-terminated text.
pub(crate) fn decode_ssid(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(bytes).into_owned())
}
