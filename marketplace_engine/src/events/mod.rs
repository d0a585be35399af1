mod channel;
mod effects;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use effects::{EffectDispatcher, PendingEffect};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};

pub(crate) use effects::builders;
