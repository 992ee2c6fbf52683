// ── Wire-level message types ──
//
// Everything that crosses the facade is plain data: calls go out as a
// `MethodCall` with a small closed set of argument shapes, and replies and
// signal bodies come back as loosely-typed JSON values, one per body field.
// Consumers validate shape themselves.

use serde_json::Value;

/// Standard D-Bus properties interface.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Decoded reply body: one JSON value per top-level body field.
pub type Reply = Vec<Value>;

// ── Calls ───────────────────────────────────────────────────────────

/// A single method-call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// `s`
    Str(String),
    /// `o`
    ObjectPath(String),
    /// An empty `a{sv}` options dictionary.
    EmptyOptions,
}

/// A method call addressed to one object on one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub method: String,
    pub args: Vec<CallArg>,
}

impl MethodCall {
    pub fn new(
        destination: impl Into<String>,
        path: impl Into<String>,
        interface: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            path: path.into(),
            interface: interface.into(),
            method: method.into(),
            args: Vec::new(),
        }
    }

    /// `org.freedesktop.DBus.Properties.GetAll(interface)` on `path`.
    pub fn get_all_properties(
        destination: impl Into<String>,
        path: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self::new(destination, path, PROPERTIES_INTERFACE, "GetAll")
            .arg(CallArg::Str(interface.into()))
    }

    /// Append one argument.
    pub fn arg(mut self, arg: CallArg) -> Self {
        self.args.push(arg);
        self
    }

    /// `interface.method` for logging.
    pub fn qualified_method(&self) -> String {
        format!("{}.{}", self.interface, self.method)
    }
}

// ── Signals ─────────────────────────────────────────────────────────

/// A broadcast signal as delivered by the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Unique bus name of the emitter, when the bus reports one.
    pub sender: Option<String>,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

impl Signal {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// First argument as a string (object paths decode to strings).
    pub fn str_arg(&self, index: usize) -> Option<&str> {
        self.arg(index).and_then(Value::as_str)
    }

    pub fn is(&self, interface: &str, member: &str) -> bool {
        self.interface == interface && self.member == member
    }
}

/// Which signals a subscription receives. `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFilter {
    pub sender: Option<String>,
    pub path: Option<String>,
    pub interface: Option<String>,
    pub member: Option<String>,
}

impl SignalFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Client-side evaluation of the filter, for buses that cannot push
    /// match rules to a broker.
    pub fn matches(&self, signal: &Signal) -> bool {
        fn field(want: Option<&String>, got: &str) -> bool {
            want.is_none_or(|w| w == got)
        }

        let sender_ok = match (&self.sender, &signal.sender) {
            (None, _) => true,
            (Some(want), Some(got)) => want == got,
            (Some(_), None) => false,
        };

        sender_ok
            && field(self.path.as_ref(), &signal.path)
            && field(self.interface.as_ref(), &signal.interface)
            && field(self.member.as_ref(), &signal.member)
    }
}

// ── Name ownership ──────────────────────────────────────────────────

/// Ownership transitions of a watched well-known name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameEvent {
    /// The name gained an owner. `owner` is its unique bus name.
    Appeared { owner: String },
    /// The name lost its owner.
    Vanished,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn signal(sender: Option<&str>, path: &str) -> Signal {
        Signal {
            sender: sender.map(str::to_owned),
            path: path.into(),
            interface: "org.freedesktop.NetworkManager".into(),
            member: "DeviceAdded".into(),
            args: vec![json!("/org/freedesktop/NetworkManager/Devices/3")],
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(SignalFilter::new().matches(&signal(None, "/a")));
        assert!(SignalFilter::new().matches(&signal(Some(":1.4"), "/b")));
    }

    #[test]
    fn sender_filter_rejects_unknown_sender() {
        let filter = SignalFilter::new().sender(":1.4");
        assert!(filter.matches(&signal(Some(":1.4"), "/a")));
        assert!(!filter.matches(&signal(Some(":1.9"), "/a")));
        assert!(!filter.matches(&signal(None, "/a")));
    }

    #[test]
    fn path_and_member_filters_combine() {
        let filter = SignalFilter::new()
            .path("/org/freedesktop/NetworkManager")
            .member("DeviceAdded");
        assert!(filter.matches(&signal(None, "/org/freedesktop/NetworkManager")));
        assert!(!filter.matches(&signal(None, "/org/freedesktop/NetworkManager/Devices/1")));
    }

    #[test]
    fn get_all_targets_properties_interface() {
        let call = MethodCall::get_all_properties(
            "org.freedesktop.NetworkManager",
            "/org/freedesktop/NetworkManager/Devices/1",
            "org.freedesktop.NetworkManager.Device",
        );
        assert_eq!(call.interface, PROPERTIES_INTERFACE);
        assert_eq!(call.method, "GetAll");
        assert_eq!(
            call.args,
            vec![CallArg::Str("org.freedesktop.NetworkManager.Device".into())]
        );
        assert_eq!(call.qualified_method(), "org.freedesktop.DBus.Properties.GetAll");
    }

    #[test]
    fn str_arg_reads_object_paths() {
        let s = signal(None, "/");
        assert_eq!(s.str_arg(0), Some("/org/freedesktop/NetworkManager/Devices/3"));
        assert_eq!(s.str_arg(1), None);
    }
}
