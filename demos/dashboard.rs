use std::sync::Arc;
use std::time::Duration;
use token_price_poller::{
    PollerConfig, PricePoller, PubkeyWallet, RequestCoordinator, WalletProvider, WalletSession,
};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("token_price_poller=info".parse()?))
        .with_target(false)
        .init();

    println!("Token Price Dashboard");
    println!("=====================");

    // Optional watch-only wallet from WALLET_ADDRESS
    let provider: Option<Arc<dyn WalletProvider>> = match std::env::var("WALLET_ADDRESS") {
        Ok(address) => Some(Arc::new(PubkeyWallet::from_address(&address)?)),
        Err(_) => None,
    };
    let wallet = WalletSession::new(provider);
    match wallet.connect().await {
        Ok(address) => println!("Wallet: {}", address),
        Err(e) => println!("Wallet: {}", e),
    }

    let config = PollerConfig::from_env()?;
    let coordinator = Arc::new(RequestCoordinator::with_limits(
        config.min_request_interval,
        config.rate_limit_threshold,
    ));
    let poller = PricePoller::with_coordinator(config, coordinator)?;
    let mut events = poller.subscribe();
    poller.activate();

    for _ in 0..6 {
        tokio::select! {
            Ok(event) = events.recv() => println!("event: {}", event),
            _ = sleep(Duration::from_secs(10)) => {}
        }

        let view = poller.view().await;
        println!("\n{:-<50}", "");
        println!("status: {:?}  loading: {}", view.status(), view.loading);
        if let Some(error) = &view.error {
            println!("note:   {}", error);
        }
        for symbol in view.snapshot.symbols() {
            if let Some(record) = view.snapshot.get(&symbol) {
                println!("{:<6} ${:<14} ({})", symbol, record.price, record.last_updated);
            }
        }
    }

    if let Some(handle) = poller.deactivate() {
        handle.await?;
    }

    let metrics = poller.metrics().await;
    println!(
        "\ncycles: {} attempted, {} skipped, success rate {:.0}%, p50 {:.0}ms",
        metrics.attempted(),
        metrics.skipped,
        metrics.success_rate() * 100.0,
        metrics.latency_p50_ms
    );

    Ok(())
}
