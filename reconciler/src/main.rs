// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use promo_core::{PromotionKind, Tier};
use tracing_subscriber::EnvFilter;

use reconciler::api::AppState;
use reconciler::config::Config;
use reconciler::reconciliation::Reconciler;
use reconciler::storage::Storage;
use reconciler::verifier::TransactionVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let fees = config.load_fee_schedule()?;
    let adapters = config.build_adapters()?;
    let storage = Storage::open(&config.db_path, &config.sqlite_synchronous)?;

    let verifier = TransactionVerifier::new(adapters, config.min_confirmations);
    let engine = Reconciler::new(fees, verifier, storage, config.reconciler_config());

    for chain in engine.enabled_chains() {
        if engine
            .fee_schedule()
            .valid_amounts(chain, PromotionKind::Trending, Tier::Normal)
            .is_empty()
        {
            tracing::warn!(%chain, "chain enabled without trending fees");
        }
    }
    for settings in &config.chains {
        tracing::info!(
            chain = %settings.chain,
            endpoint = %settings.endpoint,
            timeout_ms = settings.timeout.as_millis() as u64,
            "chain enabled"
        );
    }

    let state = Arc::new(AppState { reconciler: engine });

    let app = reconciler::api::router(state, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;

    tracing::info!(address = %config.http_addr, db = %config.db_path, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
