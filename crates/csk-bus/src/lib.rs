// csk-bus: async RPC + signal facade over D-Bus for the csk network tracker

pub mod bus;
pub mod error;
pub mod message;
mod value;
pub mod zbus_bus;

pub use bus::Bus;
pub use error::BusError;
pub use message::{
    CallArg, MethodCall, NameEvent, PROPERTIES_INTERFACE, Reply, Signal, SignalFilter,
};
pub use zbus_bus::ZbusBus;
