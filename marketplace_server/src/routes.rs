//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two belong in a separate module.
//!
//! Every handler here is a webhook. Providers retry a delivery when they get a 5xx back, so handlers must only fail
//! with a server error when a retry can succeed. Everything the engine has already seen is answered with a 200, and
//! the engine's idempotency guards make replays harmless.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use marketplace_engine::{
    payment_objects::MobileMoneyCallback,
    traits::{CardNetworkClient, MarketplaceDatabase},
    PaymentApi,
};
use serde_json::json;

use crate::{errors::ServerError, helpers::parse_mobile_money_provider};

pub const CARD_SIGNATURE_HEADER: &str = "Card-Signature";

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Card network  ----------------------------------------------------
route!(card_network_webhook => Post "/card-network" impl MarketplaceDatabase, CardNetworkClient);
/// Route handler for card network webhooks.
///
/// The signature in the `Card-Signature` header is checked against the raw body, so the body is taken as bytes and
/// never re-serialized. A bad signature is a 400 and nothing is read or written.
pub async fn card_network_webhook<B, C>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<PaymentApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    C: CardNetworkClient,
{
    trace!("💳 Received card network webhook");
    let signature = req
        .headers()
        .get(CARD_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::MissingHeader(CARD_SIGNATURE_HEADER.into()))?;
    let receipt = api.handle_card_webhook(body.as_ref(), signature).await.map_err(|e| {
        warn!("💳 Card network webhook was not applied. {e}");
        ServerError::from(e)
    })?;
    info!("💳 Card network event {} handled: {:?}", receipt.event_id, receipt.action);
    Ok(HttpResponse::Ok().json(receipt))
}

//----------------------------------------------   Mobile money  ----------------------------------------------------
route!(mobile_money_webhook => Post "/{provider}" impl MarketplaceDatabase, CardNetworkClient);
/// Route handler for mobile money callbacks. The HMAC middleware has already authenticated the body.
pub async fn mobile_money_webhook<B, C>(
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<PaymentApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: MarketplaceDatabase,
    C: CardNetworkClient,
{
    let segment = path.into_inner();
    let provider = parse_mobile_money_provider(&segment)
        .ok_or_else(|| ServerError::InvalidRequestPath(format!("{segment} is not a mobile money provider")))?;
    let callback = serde_json::from_slice::<MobileMoneyCallback>(body.as_ref())
        .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    debug!("💳 {provider} callback for {} (succeeded: {})", callback.reference, callback.succeeded);
    let result = api.handle_mobile_money_callback(provider, &callback).await?;
    if result.duplicate {
        info!("💳 {provider} callback for {} was a duplicate", callback.reference);
    }
    Ok(HttpResponse::Ok().json(json!({
        "payment_id": result.payment.id,
        "payment_status": result.payment.status,
        "order_id": result.order.id,
        "order_status": result.order.status,
        "duplicate": result.duplicate,
    })))
}
