use std::sync::Arc;

use stardust_bridge::bridge::{CurrencyBridgeRegistry, CurrencyFamily, StardustBridge};
use stardust_bridge::config::NetworkConfig;
use stardust_bridge::indexer::StardustIndexerClient;
use stardust_bridge::utils::format_token_amount;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive("stardust_bridge=debug".parse().unwrap())
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting account bridge service");
	let network = NetworkConfig::from_env();
	info!("Using {} via {}", network.network_name, network.api_base);

	let client = Arc::new(StardustIndexerClient::new(network.api_base.clone()));
	let bridge = Arc::new(StardustBridge::new(
		client.clone(),
		client,
		network.clone(),
	));

	let mut registry = CurrencyBridgeRegistry::new();
	registry.register(CurrencyFamily::Stardust, bridge.clone(), bridge);

	let Some(address) = std::env::args()
		.nth(1)
		.or_else(|| std::env::var("STARDUST_ADDRESS").ok())
	else {
		error!("no account address given; pass one as the first argument or set STARDUST_ADDRESS");
		return;
	};

	let currency = match registry.get_currency_bridge(CurrencyFamily::Stardust) {
		Ok(bridge) => bridge,
		Err(e) => {
			error!("Failed to resolve currency bridge: {:?}", e);
			return;
		}
	};

	let account = match currency.scan_accounts(&address, "").await {
		Ok(account) => account,
		Err(e) => {
			error!("Failed to sync account: {:?}", e);
			return;
		}
	};

	info!("Synced account {}", account.id);
	info!(
		"Balance: {} ({} spendable)",
		format_token_amount(account.balance, network.token_decimals),
		format_token_amount(account.spendable_balance, network.token_decimals),
	);
	info!(
		"{} operations in history, ledger index {}",
		account.operations_count, account.block_height
	);
	for operation in account.operations.iter().take(10) {
		info!(
			"  {} {} {} at {}",
			operation.direction,
			format_token_amount(operation.value, network.token_decimals),
			operation.id,
			operation.date,
		);
	}
}
