// ── Bus trait ──
//
// The one seam between the tracker and the transport. Implementations must
// be cheap to share across tasks; every returned future and stream is
// `'static` so the driver can spawn or park it freely.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::BusError;
use crate::message::{MethodCall, NameEvent, Reply, Signal, SignalFilter};

/// Async RPC + broadcast-subscription facility.
pub trait Bus: Send + Sync + 'static {
    /// Stream ownership changes of a well-known name. The first item
    /// reflects the current state (`Appeared` if owned, `Vanished` if not).
    fn watch_name(&self, name: &str) -> BoxStream<'static, NameEvent>;

    /// Issue a method call. Resolves to `BusError::Cancelled` as soon as
    /// `cancel` fires, without waiting for the remote side.
    fn call(
        &self,
        call: MethodCall,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Reply, BusError>>;

    /// Subscribe to signals matching `filter`. The future resolves once the
    /// subscription is live: every matching signal the remote side emits
    /// after that point reaches the stream. Dropping the stream
    /// unsubscribes.
    fn subscribe(
        &self,
        filter: SignalFilter,
    ) -> BoxFuture<'static, Result<BoxStream<'static, Signal>, BusError>>;
}
