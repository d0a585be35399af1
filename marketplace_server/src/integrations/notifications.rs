//! The server's notification sink.
//!
//! Delivery to users (push, email, chat) belongs to another service, so the server writes every notification and
//! realtime event to the log. A deployment that delivers them for real swaps these hooks for ones that forward the
//! events.
use futures::future::BoxFuture;
use log::*;
use marketplace_engine::events::{EventHandlers, EventHooks, Notification, RealtimeEvent};

pub const NOTIFICATION_BUFFER_SIZE: usize = 100;

pub fn create_logging_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_notification(|n| log_notification(n));
    hooks.on_realtime(|ev| log_realtime_event(ev));
    EventHandlers::new(NOTIFICATION_BUFFER_SIZE, hooks)
}

fn log_notification(n: Notification) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        info!("📬 [{:?}] to {}: {}. {}", n.kind, n.user_id, n.title, n.body);
        trace!("📬 Notification payload: {}", n.payload);
    })
}

fn log_realtime_event(ev: RealtimeEvent) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        debug!("📬 {} <- {} {}", ev.topic, ev.event, ev.payload);
    })
}
