use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, Notification, RealtimeEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub notification_producer: Vec<EventProducer<Notification>>,
    pub realtime_producer: Vec<EventProducer<RealtimeEvent>>,
}

impl EventProducers {
    pub fn notify(&self, notification: Notification) {
        for producer in &self.notification_producer {
            producer.publish_event(notification.clone());
        }
    }

    pub fn publish(&self, event: RealtimeEvent) {
        for producer in &self.realtime_producer {
            producer.publish_event(event.clone());
        }
    }
}

pub struct EventHandlers {
    pub on_notification: Option<EventHandler<Notification>>,
    pub on_realtime: Option<EventHandler<RealtimeEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_notification = hooks.on_notification.map(|f| EventHandler::new(buffer_size, f));
        let on_realtime = hooks.on_realtime.map(|f| EventHandler::new(buffer_size, f));
        Self { on_notification, on_realtime }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_notification {
            result.notification_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_realtime {
            result.realtime_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_notification {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_realtime {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_notification: Option<Handler<Notification>>,
    pub on_realtime: Option<Handler<RealtimeEvent>>,
}

impl EventHooks {
    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(Notification) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f));
        self
    }

    pub fn on_realtime<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RealtimeEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_realtime = Some(Arc::new(f));
        self
    }
}
