// ── zbus-backed Bus ──
//
// Calls go through `Connection::call_method` with the argument tuple picked
// from the call's `CallArg` shape. Subscribing resolves once the match rule
// is installed on the broker, then streams matching messages until dropped. Name watching combines
// an initial `GetNameOwner` with the `NameOwnerChanged` broadcast.

use std::collections::HashMap;

use futures_util::StreamExt;
use futures_util::future::{self, BoxFuture};
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zbus::message::Type as MessageType;
use zbus::{Connection, MatchRule, Message, MessageStream};
use zvariant::{ObjectPath, Structure, Value};

use crate::bus::Bus;
use crate::error::BusError;
use crate::message::{CallArg, MethodCall, NameEvent, Reply, Signal, SignalFilter};
use crate::value::to_json;

const DBUS_NAME: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";

/// [`Bus`] implementation over a live zbus connection.
#[derive(Clone, Debug)]
pub struct ZbusBus {
    connection: Connection,
}

impl ZbusBus {
    /// Connect to the system bus (where NetworkManager lives).
    pub async fn system() -> Result<Self, BusError> {
        Ok(Self {
            connection: Connection::system().await?,
        })
    }

    /// Connect to the session bus.
    pub async fn session() -> Result<Self, BusError> {
        Ok(Self {
            connection: Connection::session().await?,
        })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Bus for ZbusBus {
    fn watch_name(&self, name: &str) -> BoxStream<'static, NameEvent> {
        let connection = self.connection.clone();
        let name = name.to_owned();

        Box::pin(async_stream::stream! {
            let rule = match name_owner_rule(&name) {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(name = %name, error = %e, "invalid name watch rule");
                    return;
                }
            };
            let mut changes = match MessageStream::for_match_rule(rule, &connection, None).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(name = %name, error = %e, "name watch subscription failed");
                    return;
                }
            };

            // Query after the rule is installed so no transition slips between.
            match name_owner(&connection, &name).await {
                Ok(owner) => yield NameEvent::Appeared { owner },
                Err(e) => {
                    debug!(name = %name, error = %e, "name has no owner");
                    yield NameEvent::Vanished;
                }
            }

            while let Some(message) = changes.next().await {
                let Ok(message) = message else { continue };
                let body = message.body();
                let Ok((_, old, new)) = body.deserialize::<(String, String, String)>() else {
                    continue;
                };
                if !old.is_empty() {
                    yield NameEvent::Vanished;
                }
                if !new.is_empty() {
                    yield NameEvent::Appeared { owner: new };
                }
            }
        })
    }

    fn call(
        &self,
        call: MethodCall,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Reply, BusError>> {
        let connection = self.connection.clone();

        Box::pin(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Err(BusError::Cancelled),
                result = invoke(&connection, &call) => result,
            }
        })
    }

    fn subscribe(
        &self,
        filter: SignalFilter,
    ) -> BoxFuture<'static, Result<BoxStream<'static, Signal>, BusError>> {
        let connection = self.connection.clone();

        Box::pin(async move {
            let rule = signal_rule(&filter).map_err(|e| BusError::InvalidArgument {
                method: "AddMatch".into(),
                reason: format!("{filter:?}: {e}"),
            })?;
            // Resolves once the broker has acknowledged the rule; messages
            // are buffered from then on, whether or not anyone polls yet.
            let messages = MessageStream::for_match_rule(rule, &connection, None).await?;
            debug!(?filter, "signal match rule installed");

            let signals = messages.filter_map(|message| {
                future::ready(match message {
                    Ok(message) => signal_from_message(&message),
                    Err(e) => {
                        debug!(error = %e, "dropping undecodable signal");
                        None
                    }
                })
            });
            Ok(signals.boxed())
        })
    }
}

// ── Calls ───────────────────────────────────────────────────────────

async fn invoke(connection: &Connection, call: &MethodCall) -> Result<Reply, BusError> {
    let destination = Some(call.destination.as_str());
    let path = call.path.as_str();
    let interface = Some(call.interface.as_str());
    let method = call.method.as_str();

    let reply = match call.args.as_slice() {
        [] => {
            connection
                .call_method(destination, path, interface, method, &())
                .await?
        }
        [CallArg::Str(a)] => {
            connection
                .call_method(destination, path, interface, method, &(a.as_str(),))
                .await?
        }
        [CallArg::Str(a), CallArg::Str(b)] => {
            connection
                .call_method(destination, path, interface, method, &(a.as_str(), b.as_str()))
                .await?
        }
        [CallArg::EmptyOptions] => {
            let options: HashMap<&str, Value<'_>> = HashMap::new();
            connection
                .call_method(destination, path, interface, method, &(options,))
                .await?
        }
        [
            CallArg::ObjectPath(a),
            CallArg::ObjectPath(b),
            CallArg::ObjectPath(c),
        ] => {
            let body = (
                object_path(call, a)?,
                object_path(call, b)?,
                object_path(call, c)?,
            );
            connection
                .call_method(destination, path, interface, method, &body)
                .await?
        }
        other => {
            return Err(BusError::InvalidArgument {
                method: call.qualified_method(),
                reason: format!("unsupported argument shape {other:?}"),
            });
        }
    };

    decode_body(&reply)
}

fn object_path<'a>(call: &MethodCall, raw: &'a str) -> Result<ObjectPath<'a>, BusError> {
    ObjectPath::try_from(raw).map_err(|e| BusError::InvalidArgument {
        method: call.qualified_method(),
        reason: format!("bad object path {raw:?}: {e}"),
    })
}

async fn name_owner(connection: &Connection, name: &str) -> Result<String, BusError> {
    let reply = connection
        .call_method(
            Some(DBUS_NAME),
            DBUS_PATH,
            Some(DBUS_NAME),
            "GetNameOwner",
            &(name,),
        )
        .await?;
    let body = reply.body();
    let owner: String = body.deserialize()?;
    Ok(owner)
}

// ── Match rules ─────────────────────────────────────────────────────

fn name_owner_rule(name: &str) -> zbus::Result<MatchRule<'static>> {
    Ok(MatchRule::builder()
        .msg_type(MessageType::Signal)
        .sender(DBUS_NAME)?
        .path(DBUS_PATH)?
        .interface(DBUS_NAME)?
        .member("NameOwnerChanged")?
        .arg(0, name.to_owned())?
        .build())
}

fn signal_rule(filter: &SignalFilter) -> zbus::Result<MatchRule<'_>> {
    let mut builder = MatchRule::builder().msg_type(MessageType::Signal);
    if let Some(sender) = &filter.sender {
        builder = builder.sender(sender.as_str())?;
    }
    if let Some(path) = &filter.path {
        builder = builder.path(path.as_str())?;
    }
    if let Some(interface) = &filter.interface {
        builder = builder.interface(interface.as_str())?;
    }
    if let Some(member) = &filter.member {
        builder = builder.member(member.as_str())?;
    }
    Ok(builder.build())
}

// ── Decoding ────────────────────────────────────────────────────────

fn decode_body(message: &Message) -> Result<Reply, BusError> {
    let body = message.body();
    let signature = body.signature().to_string();
    if signature.is_empty() {
        return Ok(Vec::new());
    }

    let structure: Structure<'_> = body.deserialize().map_err(|e| BusError::Decode {
        signature: signature.clone(),
        message: e.to_string(),
    })?;
    Ok(structure.fields().iter().map(to_json).collect())
}

fn signal_from_message(message: &Message) -> Option<Signal> {
    let header = message.header();
    if header.message_type() != MessageType::Signal {
        return None;
    }

    let args = match decode_body(message) {
        Ok(args) => args,
        Err(e) => {
            debug!(error = %e, "signal body not decodable, delivering without args");
            Vec::new()
        }
    };

    Some(Signal {
        sender: header.sender().map(ToString::to_string),
        path: header.path()?.to_string(),
        interface: header.interface()?.to_string(),
        member: header.member()?.to_string(),
        args,
    })
}
