//! Callback authentication for the mobile money webhooks.
//!
//! Mobile money providers sign each callback with a shared secret: the base64 HMAC-SHA256 of the raw request body is
//! sent in the `X-MobileMoney-Hmac-Sha256` header. [`CallbackHmac`] wraps the callback scope, so handlers only ever see
//! bodies that passed the check. The body is read in full, verified, and handed back to the handler untouched.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorForbidden},
    web,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use mkt_common::Secret;

use crate::{config::MobileMoneyWebhookConfig, helpers::verify_hmac};

pub const MOBILE_MONEY_HMAC_HEADER: &str = "X-MobileMoney-Hmac-Sha256";

/// Middleware factory. With checks disabled, the key is `None` and every callback passes through.
pub struct CallbackHmac {
    key: Option<Rc<Secret<String>>>,
}

impl CallbackHmac {
    pub fn new(config: &MobileMoneyWebhookConfig) -> Self {
        let key = config.hmac_checks.then(|| Rc::new(config.hmac_secret.clone()));
        Self { key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for CallbackHmac
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = CallbackHmacService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CallbackHmacService { key: self.key.clone(), service: Rc::new(service) }))
    }
}

pub struct CallbackHmacService<S> {
    key: Option<Rc<Secret<String>>>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for CallbackHmacService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let Some(key) = self.key.clone() else {
            trace!("🔐️ HMAC checks are disabled. Allowing {}", req.path());
            return Box::pin(service.call(req));
        };
        Box::pin(async move {
            let signature = req
                .headers()
                .get(MOBILE_MONEY_HMAC_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
                .ok_or_else(|| {
                    warn!("🔐️ Callback to {} has no HMAC header. Denying access.", req.path());
                    ErrorForbidden("No HMAC signature found.")
                })?;
            let body = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Could not read the callback body for {}: {e}", req.path());
                ErrorBadRequest("Could not read the request body.")
            })?;
            if !verify_hmac(key.reveal(), &body, &signature) {
                warn!("🔐️ Callback to {} failed the HMAC check. Denying access.", req.path());
                return Err(ErrorForbidden("Invalid HMAC signature."));
            }
            trace!("🔐️ HMAC check for {} ✅️", req.path());
            req.set_payload(replay_body(body));
            service.call(req).await
        })
    }
}

/// The body was consumed by the check; this puts it back for the handler.
fn replay_body(body: web::Bytes) -> Payload {
    let (_, mut payload) = h1::Payload::create(true);
    payload.unread_data(body);
    Payload::from(payload)
}
