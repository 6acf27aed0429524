//!
//! REST client for the node core API and its indexer plugin.
//!
//! This module provides an async client for querying unspent outputs, output
//! metadata and included blocks, and for submitting signed blocks. Transport
//! failures are retried with exponential backoff up to a fixed budget;
//! empty unspent-output queries are re-polled a bounded number of times
//! before an empty result is returned as terminal. All methods are async and
//! designed for use with Tokio.

use super::types::*;
use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound on the exponential backoff spent on one query.
const TRANSPORT_RETRY_BUDGET: Duration = Duration::from_secs(10);
/// How many times an empty unspent-output result is re-polled.
const MAX_EMPTY_QUERY_ATTEMPTS: u32 = 10;
/// Pause between empty-result polls.
const EMPTY_QUERY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Unspent-output query service backed by a chain indexer.
///
/// Pagination and retry are internal to implementations; consumers see a
/// resolved output set or a terminal error.
#[async_trait]
pub trait OutputIndex: Send + Sync {
	/// Resolve all unspent basic outputs of `address` matching `query`.
	///
	/// Exhausting the empty-result retry budget yields an empty set, not an
	/// error.
	async fn unspent_outputs(
		&self,
		address: &str,
		query: &OutputQuery,
	) -> Result<UnspentOutputs, IndexerError>;

	/// Fetch a single output with its booking metadata.
	async fn output(&self, output_id: &str) -> Result<OutputResponse, IndexerError>;

	/// Fetch only the booking metadata of an output.
	async fn output_metadata(&self, output_id: &str) -> Result<OutputMetadata, IndexerError>;

	/// Fetch the block a transaction was included in.
	async fn included_block(&self, transaction_id: &str) -> Result<Block, IndexerError>;
}

/// Submission side of the node API, kept separate from queries so the
/// broadcaster depends on exactly what it uses.
#[async_trait]
pub trait BlockSubmitter: Send + Sync {
	/// Submit a signed block, returning the network-assigned block id.
	///
	/// Never retried: a rejection must surface to the caller unchanged.
	async fn submit_block(&self, block: &Block) -> Result<String, IndexerError>;
}

/// REST client for a Stardust node and its indexer plugin
#[derive(Clone)]
pub struct StardustIndexerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the node REST API, without a trailing slash.
	api_base: String,
}

impl StardustIndexerClient {
	/// Create a new client for the given node REST endpoint.
	pub fn new(api_base: String) -> Self {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.expect("Failed to create HTTP client");

		Self {
			http_client,
			api_base,
		}
	}

	/// Execute a GET request with bounded transport retry.
	///
	/// Connection failures and server errors are retried with exponential
	/// backoff; client errors and undecodable payloads are permanent. When
	/// the retry budget is exhausted the last transport error is reported as
	/// `IndexerError::Timeout`.
	async fn get_json<T: DeserializeOwned>(&self, route: &str) -> Result<T, IndexerError> {
		let url = format!("{}{}", self.api_base, route);
		debug!("GET {}", url);

		let policy = ExponentialBackoff {
			max_elapsed_time: Some(TRANSPORT_RETRY_BUDGET),
			..ExponentialBackoff::default()
		};

		retry(policy, || async {
			let response = self
				.http_client
				.get(&url)
				.send()
				.await
				.map_err(|e| backoff::Error::transient(IndexerError::Http(e)))?;

			let status = response.status();
			if status.is_client_error() {
				let message = response.text().await.unwrap_or_default();
				return Err(backoff::Error::permanent(IndexerError::Status {
					status: status.as_u16(),
					message,
				}));
			}
			if status.is_server_error() {
				let message = response.text().await.unwrap_or_default();
				return Err(backoff::Error::transient(IndexerError::Status {
					status: status.as_u16(),
					message,
				}));
			}

			response
				.json::<T>()
				.await
				.map_err(|e| backoff::Error::permanent(IndexerError::Malformed(e.to_string())))
		})
		.await
		.map_err(|e| match e {
			IndexerError::Http(inner) => IndexerError::Timeout(inner.to_string()),
			IndexerError::Status { status, message } if status >= 500 => {
				IndexerError::Timeout(format!("{}: {}", status, message))
			}
			other => other,
		})
	}

	/// Execute a POST request without any retry.
	async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
		&self,
		route: &str,
		body: &B,
	) -> Result<T, IndexerError> {
		let url = format!("{}{}", self.api_base, route);
		debug!("POST {}", url);

		let response = self.http_client.post(&url).json(body).send().await?;

		let status = response.status();
		if !status.is_success() {
			let message = response.text().await.unwrap_or_default();
			return Err(IndexerError::Status {
				status: status.as_u16(),
				message,
			});
		}

		let parsed = response.json::<T>().await?;
		Ok(parsed)
	}

	/// Fetch one page of output ids matching the query.
	async fn basic_output_ids(
		&self,
		address: &str,
		query: &OutputQuery,
		cursor: Option<&str>,
	) -> Result<OutputsPage, IndexerError> {
		let mut route = format!("/api/indexer/v1/outputs/basic?address={}", address);
		if let Some(has_expiration) = query.has_expiration {
			route.push_str(&format!("&hasExpiration={}", has_expiration));
		}
		if let Some(created_after) = query.created_after {
			route.push_str(&format!("&createdAfter={}", created_after));
		}
		if let Some(cursor) = cursor {
			route.push_str(&format!("&cursor={}", cursor));
		}
		self.get_json(&route).await
	}

	/// Walk the indexer cursor until all matching output ids are collected.
	async fn collect_output_ids(
		&self,
		address: &str,
		query: &OutputQuery,
	) -> Result<(u32, Vec<String>), IndexerError> {
		let mut ids = Vec::new();
		let mut cursor: Option<String> = None;
		let mut ledger_index = 0;

		loop {
			let page = self
				.basic_output_ids(address, query, cursor.as_deref())
				.await?;
			ledger_index = page.ledger_index;
			ids.extend(page.items);
			match page.cursor {
				Some(next) if !next.is_empty() => cursor = Some(next),
				_ => break,
			}
		}

		Ok((ledger_index, ids))
	}

	/// Turn a resolved core-API output into the domain form.
	fn resolve_output(id: String, response: OutputResponse) -> Result<UnspentOutput, IndexerError> {
		let amount = response.output.amount_value().map_err(|e| {
			IndexerError::Malformed(format!("output {} has bad amount: {}", id, e))
		})?;
		let address = response
			.output
			.address_pub_key_hash()
			.ok_or_else(|| {
				IndexerError::Malformed(format!("output {} has no address unlock", id))
			})?
			.to_string();
		let expiration = response.output.expiration().map(|condition| ExpirationUnlock {
			return_address: condition
				.return_address
				.as_ref()
				.map(|a| a.pub_key_hash.clone())
				.unwrap_or_default(),
			unix_time: condition.unix_time.unwrap_or_default(),
		});

		Ok(UnspentOutput {
			id,
			transaction_id: response.metadata.transaction_id,
			output_index: response.metadata.output_index,
			amount,
			address,
			is_spent: response.metadata.is_spent,
			expiration,
			booked_milestone: response.metadata.milestone_index_booked,
			booked_at: response.metadata.milestone_timestamp_booked,
		})
	}
}

#[async_trait]
impl OutputIndex for StardustIndexerClient {
	async fn unspent_outputs(
		&self,
		address: &str,
		query: &OutputQuery,
	) -> Result<UnspentOutputs, IndexerError> {
		let mut attempts = 0;
		let (ledger_index, ids) = loop {
			attempts += 1;
			let (ledger_index, ids) = self.collect_output_ids(address, query).await?;
			if !ids.is_empty() || attempts >= MAX_EMPTY_QUERY_ATTEMPTS {
				break (ledger_index, ids);
			}
			debug!(
				"no outputs for {} yet (attempt {}/{}), polling again",
				address, attempts, MAX_EMPTY_QUERY_ATTEMPTS
			);
			tokio::time::sleep(EMPTY_QUERY_RETRY_DELAY).await;
		};

		let mut outputs = Vec::with_capacity(ids.len());
		for id in ids {
			let response = self.output(&id).await?;
			if response.output.kind != BASIC_OUTPUT_TYPE {
				continue;
			}
			outputs.push(Self::resolve_output(id, response)?);
		}

		info!(
			"resolved {} unspent outputs for {} at ledger index {}",
			outputs.len(),
			address,
			ledger_index
		);
		Ok(UnspentOutputs {
			ledger_index,
			outputs,
		})
	}

	async fn output(&self, output_id: &str) -> Result<OutputResponse, IndexerError> {
		self.get_json(&format!("/api/core/v2/outputs/{}", output_id))
			.await
	}

	async fn output_metadata(&self, output_id: &str) -> Result<OutputMetadata, IndexerError> {
		self.get_json(&format!("/api/core/v2/outputs/{}/metadata", output_id))
			.await
	}

	async fn included_block(&self, transaction_id: &str) -> Result<Block, IndexerError> {
		self.get_json(&format!(
			"/api/core/v2/transactions/{}/included-block",
			transaction_id
		))
		.await
	}
}

#[async_trait]
impl BlockSubmitter for StardustIndexerClient {
	async fn submit_block(&self, block: &Block) -> Result<String, IndexerError> {
		let response: SubmitBlockResponse = self.post_json("/api/core/v2/blocks", block).await?;
		info!("block {} accepted by the node", response.block_id);
		Ok(response.block_id)
	}
}
