//! chainrelay-http: HTTP JSON-RPC provider for ChainRelay.
//!
//! ```rust,no_run
//! use chainrelay_core::{ClientConfig, RpcClient};
//! use chainrelay_http::HttpRpcClient;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let node = HttpRpcClient::default_for("https://cloudflare-eth.com")?;
//! let client = RpcClient::new(ClientConfig::default())?;
//! let block = client.make_request(&node, "eth_blockNumber", vec![]).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{HttpClientConfig, HttpRpcClient};
