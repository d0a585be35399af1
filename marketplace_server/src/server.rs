use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, web::ServiceConfig, App, HttpServer};
use card_network_tools::CardNetworkApi;
use log::*;
use marketplace_engine::{
    traits::CardNetworkClient,
    CardNetworkGateway,
    MarketplaceDatabase,
    PaymentApi,
    PaymentConfig,
    PaymentGateways,
    SqliteDatabase,
};

use crate::{
    config::{MobileMoneyWebhookConfig, ServerConfig},
    errors::ServerError,
    integrations::notifications::create_logging_event_handlers,
    middleware::CallbackHmac,
    routes::{health, CardNetworkWebhookRoute, MobileMoneyWebhookRoute},
    workers::{start_expiry_sweep, start_job_worker, start_payout_scheduler},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Database migrations failed. {e}")))?;
    info!("🗃️ Database at {} is ready", db.url());
    let handlers = create_logging_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let workers = &config.workers;
    let _job_worker = start_job_worker(
        db.clone(),
        producers.clone(),
        config.marketplace.clone(),
        workers.job_poll_interval,
        workers.job_batch_size,
    );
    let _expiry_sweep = start_expiry_sweep(db.clone(), producers.clone(), workers.expiry_sweep_interval);
    let max_attempts = config.marketplace.retry_policy.max_attempts;
    let _payout_scheduler = start_payout_scheduler(db.clone(), max_attempts, workers.payout_check_interval);

    let client = CardNetworkApi::new(config.card_network.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the card network client. {e}")))?;
    let gateways = build_gateways(client, &config.payments)?;
    let api = PaymentApi::new(db, Arc::new(gateways), producers);
    let srv = create_server_instance(config, api)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Registers the card network and, when enabled, both mobile money providers.
pub fn build_gateways<C>(client: C, payments: &PaymentConfig) -> Result<PaymentGateways<C>, ServerError> {
    let card = CardNetworkGateway::new(
        client,
        &payments.checkout_success_url,
        &payments.checkout_cancel_url,
        payments.card_webhook_secret.clone(),
        payments.card_webhook_tolerance_secs,
    );
    let gateways = PaymentGateways::default().with_card_network(card);
    if !payments.mobile_money_enabled {
        info!("💳 Mobile money is disabled");
        return Ok(gateways);
    }
    gateways.with_all_mobile_money().map_err(|e| ServerError::InitializeError(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    api: PaymentApi<SqliteDatabase, CardNetworkApi>,
) -> Result<Server, ServerError> {
    let mobile_money = config.mobile_money.clone();
    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    let srv = HttpServer::new(move || {
        let api = api.clone();
        let mobile_money = mobile_money.clone();
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mkt::access_log"))
            .configure(move |cfg| configure_webhooks(cfg, api, &mobile_money))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// The health check plus the webhook endpoints:
///
/// * `POST /webhooks/card-network`: signed card network events.
/// * `POST /webhooks/mobile-money/{provider}`: HMAC-authenticated mobile money callbacks.
pub fn configure_webhooks<B, C>(
    cfg: &mut ServiceConfig,
    api: PaymentApi<B, C>,
    mobile_money: &MobileMoneyWebhookConfig,
) where
    B: MarketplaceDatabase + 'static,
    C: CardNetworkClient + 'static,
{
    let mobile_money_scope = web::scope("/mobile-money")
        .wrap(CallbackHmac::new(mobile_money))
        .service(MobileMoneyWebhookRoute::<B, C>::new());
    let webhooks = web::scope("/webhooks").service(CardNetworkWebhookRoute::<B, C>::new()).service(mobile_money_scope);
    cfg.app_data(web::Data::new(api)).service(health).service(webhooks);
}
