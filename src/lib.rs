//! # Voltage ADS - High-Performance Industrial ADS/AMS Library
//!
//! **Author:** Evan Liu <liuyifanz.1996@gmail.com>
//! **License:** MIT
//!
//! A high-performance Beckhoff ADS/AMS TCP client implementation in pure
//! Rust for industrial automation, designed to exchange live variable
//! values with TwinCAT controllers.
//!
//! ## Features
//!
//! - **High Performance**: Async/await support with Tokio, single-allocation
//!   frame assembly
//! - **Sum-up Batching**: Many independent variable accesses folded into a
//!   bounded number of wire transactions
//! - **Symbol Handles**: Resolve-once handle lifecycle with automatic
//!   re-resolution after reconnect
//! - **Cyclic Engine**: Non-blocking I/O handler state machine with
//!   background connect and partial-failure recovery
//! - **Memory Safe**: Pure Rust implementation with zero unsafe code
//!
//! ## Supported Commands
//!
//! | Id | Command | Client |
//! |----|---------|--------|
//! | 1  | Read Device Info | ✅ |
//! | 2  | Read | ✅ |
//! | 3  | Write | ✅ |
//! | 4  | Read State | ✅ |
//! | 9  | Read Write | ✅ |
//!
//! ADS device notifications (commands 6-8) are not implemented; the engine
//! is a cyclic polling client.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltage_ads::{AdsClient, AdsConnectionConfig, AdsResult};
//!
//! #[tokio::main]
//! async fn main() -> AdsResult<()> {
//!     let config = AdsConnectionConfig::new(
//!         "192.168.0.50",
//!         "192.168.0.50.1.1".parse()?,
//!         "192.168.0.2.1.1".parse()?,
//!     );
//!     let mut client = AdsClient::connect(&config).await?;
//!
//!     let handle = client.resolve_handle("MAIN.counter").await?;
//!     let data = client.read_by_handle(handle, 2).await?;
//!     println!("MAIN.counter = {:?}", data);
//!
//!     client.release_handle(handle).await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and the ADS return-code table
pub mod error;

/// ADS protocol constants based on the Beckhoff specification
pub mod constants;

/// AMS wire primitive types (net ids, ports, command ids, run states)
pub mod types;

/// AMS framing: transport envelope and addressing header
pub mod frame;

/// ADS command request/response model
pub mod protocol;

/// Network transport layer for AMS over TCP
pub mod transport;

/// ADS client implementation
pub mod client;

// ============================================================================
// Industrial enhancement modules
// ============================================================================

/// Industrial data value types for ADS variables
pub mod value;

/// Encoding and decoding of ADS variable data
pub mod codec;

/// Sum-up batching for optimized communications
pub mod batcher;

/// Symbol handle lifecycle
pub mod handle;

/// Cyclic I/O handler state machine
pub mod handler;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use voltage_ads::tokio) ===
pub use tokio;

// === Core client API ===
pub use client::{AdsClient, DeviceInfo};

// === Error handling ===
pub use error::{AdsError, AdsResult, AdsReturnCode};

// === Core types ===
pub use types::{AdsState, AmsAddr, AmsNetId, AmsPort, CommandId, StateFlags};

// === Protocol model ===
pub use protocol::{AdsRequest, AdsResponse};

// === Values ===
pub use value::{AdsDataType, AdsValue};

// === Industrial features ===
pub use batcher::{
    ChunkPlan, ItemResult, ReadItem, ReadWriteItem, SumupReadBatch, SumupReadWriteBatch,
    SumupWriteBatch, WriteItem,
};
pub use handle::{HandleState, SymbolHandle};
pub use handler::{
    AdsIoHandler, CycleOutcome, HandlerState, ItemConfig, ItemDirection, ItemState,
};

// === Transport ===
pub use transport::{AdsConnectionConfig, AmsTransport, TcpTransport, TransportStats};

// === Protocol limits (commonly needed constants) ===
pub use constants::{DEFAULT_MAX_SUMUP_ITEMS, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Voltage ADS v{} - High-performance industrial ADS/AMS library by Evan Liu",
        VERSION
    )
}
