//! Stateless pub-sub plumbing behind the notification and realtime hooks.
//!
//! Handlers only see the event itself. Each event is handled on its own task, so a slow handler never holds up the
//! caller that published it.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc::{self, error::TrySendError};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped, then waits for in-flight handlers to finish.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // Only producers keep the channel open from here on
        drop(self.sender);
        let in_flight = Arc::new(AtomicI64::new(0));
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            let handler = Arc::clone(&self.handler);
            in_flight.fetch_add(1, Ordering::SeqCst);
            let counter = Arc::clone(&in_flight);
            tokio::spawn(async move {
                (handler)(ev).await;
                counter.fetch_sub(1, Ordering::SeqCst);
                trace!("📬️ Event handled");
            });
        }
        while in_flight.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Waiting for {} event handlers to complete", in_flight.load(Ordering::SeqCst));
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Fire-and-forget. A full buffer or a stopped handler drops the event with a log line and never blocks the caller.
    pub fn publish_event(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => warn!("📬️ Event buffer is full. Dropping event."),
            Err(TrySendError::Closed(_)) => error!("📬️ Event handler has stopped. Dropping event."),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicU64;

    use super::*;

    #[tokio::test]
    async fn every_published_event_is_handled() {
        let _ = env_logger::try_init();
        let count = Arc::new(AtomicU64::new(0));
        let c2 = Arc::clone(&count);
        let handler: Handler<u64> = Arc::new(move |v| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                count.fetch_add(v, Ordering::SeqCst);
                tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
            })
        });
        let event_handler = EventHandler::new(16, handler);
        let producer_1 = event_handler.subscribe();
        let producer_2 = event_handler.subscribe();
        for i in 0..5 {
            producer_1.publish_event(i * 2 + 1);
            producer_2.publish_event(i * 2);
        }
        drop(producer_1);
        drop(producer_2);
        event_handler.start_handler().await;
        assert_eq!(c2.load(Ordering::SeqCst), 45);
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let handler: Handler<u64> = Arc::new(|_| Box::pin(async {}));
        let event_handler = EventHandler::new(1, handler);
        let producer = event_handler.subscribe();
        producer.publish_event(1);
        // The buffer holds one event and nobody is reading yet
        producer.publish_event(2);
        drop(producer);
        event_handler.start_handler().await;
    }
}
