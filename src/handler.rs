//! Subscriber callbacks.

use crate::channel::ChannelDeliveryError;
use crate::error::DeliveryFailure;
use crate::types::Event;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Receives events published on a channel the handler is subscribed to.
///
/// Implemented for every `Fn(&Event) -> HandlerResult + Send + Sync`, so a
/// closure is usually enough:
///
/// ```ignore
/// dispatcher.subscribe("orders", |event: &Event| {
///     println!("{}", event.data);
///     Ok(())
/// })?;
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, event: &Event) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) -> HandlerResult {
        self(event)
    }
}

/// Shared handler reference stored in subscription records.
pub type SharedHandler = Arc<dyn Handler>;

/// Run a handler, converting an error or (optionally) a panic into a failure.
pub(crate) fn invoke(
    handler: &dyn Handler,
    event: &Event,
    catch_panics: bool,
) -> std::result::Result<(), DeliveryFailure> {
    if !catch_panics {
        return handler.handle(event).map_err(classify);
    }

    match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
        Ok(result) => result.map_err(classify),
        Err(payload) => Err(DeliveryFailure::Panicked(panic_message(&*payload))),
    }
}

fn classify(error: HandlerError) -> DeliveryFailure {
    match error.downcast_ref::<ChannelDeliveryError>() {
        Some(channel_error) => DeliveryFailure::Channel(*channel_error),
        None => DeliveryFailure::Failed(error.to_string()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
