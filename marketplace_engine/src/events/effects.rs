//! Side effects computed inside a state change and dispatched after it has committed.
//!
//! Transactional code never notifies or schedules anything itself. It returns what happened; the API layer turns that
//! into [`PendingEffect`]s with the [`builders`] and hands them to an [`EffectDispatcher`]. Every effect is
//! best-effort: a failure is logged and never undoes or fails the state change that produced it.
use chrono::Utc;
use log::*;

use crate::{
    events::{EventProducers, Notification, RealtimeEvent},
    jobs::NewJob,
    traits::JobQueue,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PendingEffect {
    Notify(Notification),
    Publish(RealtimeEvent),
    Schedule(NewJob),
}

#[derive(Clone)]
pub struct EffectDispatcher<Q> {
    queue: Q,
    producers: EventProducers,
}

impl<Q> EffectDispatcher<Q> {
    pub fn new(queue: Q, producers: EventProducers) -> Self {
        Self { queue, producers }
    }

    pub fn producers(&self) -> &EventProducers {
        &self.producers
    }
}

impl<Q: JobQueue> EffectDispatcher<Q> {
    pub async fn dispatch(&self, effects: Vec<PendingEffect>) {
        for effect in effects {
            match effect {
                PendingEffect::Notify(n) => {
                    trace!("📬️ Notifying {} ({:?})", n.user_id, n.kind);
                    self.producers.notify(n);
                },
                PendingEffect::Publish(e) => {
                    trace!("📬️ Publishing {} on {}", e.event, e.topic);
                    self.producers.publish(e);
                },
                PendingEffect::Schedule(job) => {
                    let key = job.key();
                    match self.queue.enqueue_job(job, Utc::now()).await {
                        Ok(r) if r.duplicate => debug!("🕰️ Job {key} is already scheduled as #{}", r.job_id),
                        Ok(r) => debug!("🕰️ Scheduled job {key} as #{}", r.job_id),
                        // The expiry sweep picks up anything that was not scheduled
                        Err(e) => error!("🕰️ Could not schedule job {key}. {e}"),
                    }
                },
            }
        }
    }
}

pub(crate) mod builders {
    use serde_json::json;

    use super::PendingEffect;
    use crate::{
        db_types::{Actor, Order, OrderStatusType, ReturnRequest},
        events::{Notification, NotificationKind, RealtimeEvent},
        jobs::{JobKind, NewJob},
    };

    /// The order's participants other than the actor. Operators and the system notify everyone.
    pub fn counterparts(order: &Order, vendor_owner: &str, actor: &Actor) -> Vec<String> {
        let mut result = Vec::with_capacity(2);
        for user in [order.customer_id.as_str(), vendor_owner] {
            if actor.user_id() != Some(user) && !result.iter().any(|u: &String| u == user) {
                result.push(user.to_string());
            }
        }
        result
    }

    fn order_topic(order: &Order) -> String {
        format!("order:{}", order.id)
    }

    pub fn order_placed(order: &Order, vendor_owner: &str, max_attempts: i64) -> Vec<PendingEffect> {
        let mut effects = Vec::with_capacity(3);
        if let Some(due) = order.payment_expires_at {
            let job =
                NewJob::new(JobKind::ReservationExpiry { order_id: order.id }, due).with_max_attempts(max_attempts);
            effects.push(PendingEffect::Schedule(job));
        }
        let payload = json!({ "order_id": order.id, "total": order.total, "currency": order.currency });
        for user_id in counterparts(order, vendor_owner, &Actor::Customer(order.customer_id.clone())) {
            effects.push(PendingEffect::Notify(Notification {
                user_id,
                kind: NotificationKind::OrderPlaced,
                title: format!("New order #{}", order.id),
                body: format!("Order #{} for {} {} is awaiting payment", order.id, order.total, order.currency),
                payload: payload.clone(),
            }));
        }
        effects.push(PendingEffect::Publish(RealtimeEvent {
            topic: order_topic(order),
            event: "order.created".into(),
            payload,
        }));
        effects
    }

    pub fn order_transitioned(
        order: &Order,
        from: OrderStatusType,
        vendor_owner: &str,
        actor: &Actor,
    ) -> Vec<PendingEffect> {
        let payload = json!({ "order_id": order.id, "from": from, "to": order.status });
        let mut effects = counterparts(order, vendor_owner, actor)
            .into_iter()
            .map(|user_id| {
                PendingEffect::Notify(Notification {
                    user_id,
                    kind: NotificationKind::OrderStatusChanged,
                    title: format!("Order #{} is now {}", order.id, order.status),
                    body: format!("Order #{} moved from {from} to {}", order.id, order.status),
                    payload: payload.clone(),
                })
            })
            .collect::<Vec<_>>();
        effects.push(PendingEffect::Publish(RealtimeEvent {
            topic: order_topic(order),
            event: "order.status_changed".into(),
            payload,
        }));
        effects
    }

    /// Only the customer hears about a failed payment.
    pub fn payment_failed(order: &Order, reason: &str) -> Vec<PendingEffect> {
        let payload = json!({ "order_id": order.id, "reason": reason, "status": order.status });
        vec![
            PendingEffect::Notify(Notification {
                user_id: order.customer_id.clone(),
                kind: NotificationKind::PaymentFailed,
                title: format!("Payment for order #{} failed", order.id),
                body: reason.to_string(),
                payload: payload.clone(),
            }),
            PendingEffect::Publish(RealtimeEvent {
                topic: order_topic(order),
                event: "payment.failed".into(),
                payload,
            }),
        ]
    }

    pub fn return_updated(
        request: &ReturnRequest,
        order: &Order,
        vendor_owner: &str,
        actor: &Actor,
    ) -> Vec<PendingEffect> {
        let payload = json!({ "return_id": request.id, "order_id": order.id, "status": request.status });
        let mut effects = counterparts(order, vendor_owner, actor)
            .into_iter()
            .map(|user_id| {
                PendingEffect::Notify(Notification {
                    user_id,
                    kind: NotificationKind::ReturnUpdated,
                    title: format!("Return for order #{} is {}", order.id, request.status),
                    body: request.reason.clone(),
                    payload: payload.clone(),
                })
            })
            .collect::<Vec<_>>();
        effects.push(PendingEffect::Publish(RealtimeEvent {
            topic: order_topic(order),
            event: "return.updated".into(),
            payload,
        }));
        effects
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::{builders::*, PendingEffect};
    use crate::db_types::{Actor, FulfillmentKind, MinorUnits, Order, OrderStatusType};

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: 5,
            customer_id: "cust".into(),
            vendor_id: 1,
            status: OrderStatusType::Processing,
            currency: "KES".into(),
            subtotal: MinorUnits::from(100),
            shipping_fee: MinorUnits::zero(),
            tax_amount: MinorUnits::zero(),
            discount_amount: MinorUnits::zero(),
            total: MinorUnits::from(100),
            fulfillment: FulfillmentKind::Pickup,
            shipping_address_id: None,
            pickup_location_id: Some(1),
            promo_code: None,
            payment_expires_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn notified(effects: &[PendingEffect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|e| match e {
                PendingEffect::Notify(n) => Some(n.user_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn actor_is_excluded_from_fan_out() {
        let o = order();
        let effects = order_transitioned(&o, OrderStatusType::Paid, "vend", &Actor::Vendor("vend".into()));
        assert_eq!(notified(&effects), vec!["cust".to_string()]);
        let effects = order_transitioned(&o, OrderStatusType::Paid, "vend", &Actor::System);
        assert_eq!(notified(&effects), vec!["cust".to_string(), "vend".to_string()]);
        assert!(effects.iter().any(|e| matches!(e, PendingEffect::Publish(p) if p.topic == "order:5")));
    }

    #[test]
    fn placing_an_order_schedules_its_expiry() {
        let o = order();
        let effects = order_placed(&o, "vend", 3);
        let job = effects.iter().find_map(|e| match e {
            PendingEffect::Schedule(job) => Some(job.clone()),
            _ => None,
        });
        let job = job.expect("expiry job");
        assert_eq!(job.key(), "reservation-expiry:5");
        assert_eq!(job.max_attempts, 3);
        assert_eq!(notified(&effects), vec!["vend".to_string()]);
    }

    #[test]
    fn payment_failures_only_notify_the_customer() {
        let effects = payment_failed(&order(), "card declined");
        assert_eq!(notified(&effects), vec!["cust".to_string()]);
    }
}
