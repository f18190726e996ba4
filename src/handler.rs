//! Cyclic I/O handler
//!
//! Drives one ADS connection through connect, handle acquisition, cyclic
//! transceive and reconnect. [`AdsIoHandler::run`] is invoked once per
//! external scan cycle and never blocks the caller beyond bounded, timed
//! I/O: all open-ended work (socket connect, run-state polling, retry
//! sleeps, bulk handle resolution) lives in one background task whose
//! completion the foreground only polls.
//!
//! State machine:
//!
//! ```text
//! Idle -> Connecting -> Transceiving -> ClosingConnection -> Stopped
//!            ^                |
//!            +--- I/O error --+
//! ```
//!
//! Per-item ADS failures inside a cycle mark the cycle as not fully
//! transferred but keep the handler in `Transceiving`; only transport and
//! correlation failures tear the connection down. A reconnect discards the
//! previous connection and every resolved handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::batcher::{ItemResult, ReadItem, SumupReadBatch, SumupWriteBatch, WriteItem};
use crate::client::AdsClient;
use crate::codec::{decode_value, encode_value_vec};
use crate::constants::IDXGRP_SYM_VALBYHND;
use crate::error::{AdsError, AdsResult, AdsReturnCode};
use crate::handle::SymbolHandle;
use crate::transport::AdsConnectionConfig;
use crate::value::{AdsDataType, AdsValue};

// ============================================================================
// Item Model
// ============================================================================

/// Data flow direction of a registered item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemDirection {
    /// Read from the controller each cycle
    Input,
    /// Written to the controller when a new value is pending
    Output,
}

/// Descriptor of one registered PLC variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConfig {
    /// Symbolic PLC variable name, e.g. `MAIN.counter`
    pub name: String,
    pub data_type: AdsDataType,
    pub direction: ItemDirection,
}

impl ItemConfig {
    pub fn new(name: impl Into<String>, data_type: AdsDataType, direction: ItemDirection) -> Self {
        Self {
            name: name.into(),
            data_type,
            direction,
        }
    }

    /// Build from a host-runtime descriptor with a textual type. String and
    /// decimal types are rejected here, at setup time.
    pub fn from_descriptor(
        name: impl Into<String>,
        type_name: &str,
        direction: ItemDirection,
    ) -> AdsResult<Self> {
        Ok(Self {
            name: name.into(),
            data_type: type_name.parse()?,
            direction,
        })
    }
}

/// Last-known state of one item, surfaced to the host
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    /// Last successfully transferred value
    pub value: AdsValue,
    /// Status of the most recent transfer attempt
    pub status: AdsReturnCode,
    /// Time of the last successful transfer
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct IoItem {
    config: ItemConfig,
    state: ItemState,
    /// Output value waiting for the next write cycle
    pending: Option<AdsValue>,
    /// Handle for the current connection; replaced wholesale on reconnect,
    /// so a stale handle value is unreachable by construction
    handle: SymbolHandle,
}

impl IoItem {
    fn new(config: ItemConfig) -> Self {
        let value = config.data_type.default_value();
        let handle = SymbolHandle::new(config.name.clone());
        Self {
            config,
            state: ItemState {
                value,
                status: AdsReturnCode::Undefined,
                timestamp: DateTime::<Utc>::MIN_UTC,
            },
            pending: None,
            handle,
        }
    }

    /// Record a transfer outcome, logging transitions into and out of error
    fn record(&mut self, status: AdsReturnCode, value: Option<AdsValue>) {
        let previous = self.state.status;
        if let Some(value) = value {
            self.state.value = value;
            self.state.timestamp = Utc::now();
        }
        self.state.status = status;

        let entered_error = !status.is_ok() && previous != status;
        let recovered =
            status.is_ok() && !previous.is_ok() && previous != AdsReturnCode::Undefined;
        if entered_error {
            warn!("item '{}' entered error state: {status}", self.config.name);
        } else if recovered {
            info!("item '{}' recovered", self.config.name);
        }
    }
}

// ============================================================================
// Handler States
// ============================================================================

/// State of the I/O handler state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Connecting,
    Transceiving,
    ClosingConnection,
    Stopped,
}

/// Result of one scan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub state: HandlerState,
    /// True only when every registered item transferred without error
    pub fully_transferred: bool,
}

/// Everything owned by one connected session. Discarded wholesale on any
/// transport failure; nothing is reused across reconnects.
struct Session {
    client: AdsClient,
    handles: Vec<u32>,
    read_batch: SumupReadBatch,
    /// Item index per read-batch position
    input_indices: Vec<usize>,
}

/// Output of the background connect task
struct ConnectOutcome {
    client: AdsClient,
    handles: Vec<u32>,
}

// ============================================================================
// Handler
// ============================================================================

/// Cyclic I/O handler for one ADS connection
pub struct AdsIoHandler {
    config: AdsConnectionConfig,
    items: Vec<IoItem>,
    state: HandlerState,
    terminate: Arc<AtomicBool>,
    connect_task: Option<JoinHandle<Option<ConnectOutcome>>>,
    session: Option<Session>,
}

impl AdsIoHandler {
    /// Register the item set for this handler. Fails on empty or duplicate
    /// variable names; unsupported variable types are already rejected by
    /// [`ItemConfig::from_descriptor`].
    pub fn new(config: AdsConnectionConfig, items: Vec<ItemConfig>) -> AdsResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for item in &items {
            if item.name.is_empty() {
                return Err(AdsError::config("item with empty variable name"));
            }
            if !seen.insert(item.name.clone()) {
                return Err(AdsError::config(format!(
                    "duplicate variable name '{}'",
                    item.name
                )));
            }
        }
        Ok(Self {
            config,
            items: items.into_iter().map(IoItem::new).collect(),
            state: HandlerState::Stopped,
            terminate: Arc::new(AtomicBool::new(false)),
            connect_task: None,
            session: None,
        })
    }

    /// Arm the handler; the next [`run`](Self::run) starts connecting
    pub fn prepare(&mut self) {
        self.terminate.store(false, Ordering::Relaxed);
        self.state = HandlerState::Idle;
    }

    /// Current state
    pub fn state(&self) -> HandlerState {
        self.state
    }

    /// True once the handler reached its terminal state
    pub fn is_finished(&self) -> bool {
        self.state == HandlerState::Stopped
    }

    /// Number of registered items
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Last-known state of an item, by registration index
    pub fn item_state(&self, index: usize) -> Option<&ItemState> {
        self.items.get(index).map(|item| &item.state)
    }

    /// Queue a value for an output item; it is written on the next cycle
    pub fn set_output(&mut self, index: usize, value: AdsValue) -> AdsResult<()> {
        let item = self
            .items
            .get_mut(index)
            .ok_or_else(|| AdsError::config(format!("no item with index {index}")))?;
        if item.config.direction != ItemDirection::Output {
            return Err(AdsError::config(format!(
                "item '{}' is not an output",
                item.config.name
            )));
        }
        if value.data_type() != item.config.data_type {
            return Err(AdsError::invalid_data(format!(
                "value type {:?} does not match item '{}' ({:?})",
                value.data_type(),
                item.config.name,
                item.config.data_type
            )));
        }
        item.pending = Some(value);
        Ok(())
    }

    /// Execute one scan cycle. Never blocks beyond the configured response
    /// timeout per wire transaction.
    pub async fn run(&mut self) -> CycleOutcome {
        let fully_transferred = match self.state {
            HandlerState::Idle => {
                // No wasted cycle: reset and start connecting right away
                self.start_connecting();
                false
            }
            HandlerState::Connecting => {
                self.poll_connecting().await;
                false
            }
            HandlerState::Transceiving => self.transceive_cycle().await,
            HandlerState::ClosingConnection | HandlerState::Stopped => false,
        };
        CycleOutcome {
            state: self.state,
            fully_transferred,
        }
    }

    /// Request shutdown: release handles and close the socket, both best
    /// effort, then park in `Stopped`.
    pub async fn stop(&mut self) {
        self.terminate.store(true, Ordering::Relaxed);
        self.state = HandlerState::ClosingConnection;
        // The background task exits cooperatively at its next terminate check
        self.connect_task = None;

        if let Some(mut session) = self.session.take() {
            if let Err(err) = session
                .client
                .release_handles(&session.handles, self.config.max_sumup_items)
                .await
            {
                debug!("handle release during shutdown failed: {err}");
            }
            let _ = session.client.close().await;
        }
        for item in &mut self.items {
            item.handle.mark_released();
        }
        self.state = HandlerState::Stopped;
        info!("I/O handler stopped");
    }

    // ========================================================================
    // Connect phase
    // ========================================================================

    fn start_connecting(&mut self) {
        // Reconnects start from scratch: no connection or handle survives
        self.session = None;
        for item in &mut self.items {
            item.handle = SymbolHandle::new(item.config.name.clone());
        }

        let config = self.config.clone();
        let names: Vec<String> = self
            .items
            .iter()
            .map(|item| item.config.name.clone())
            .collect();
        let terminate = self.terminate.clone();

        info!("connecting to {}:{}", config.host, config.port);
        self.connect_task = Some(tokio::spawn(connect_task(config, names, terminate)));
        self.state = HandlerState::Connecting;
    }

    async fn poll_connecting(&mut self) {
        let finished = self
            .connect_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(true);
        if !finished {
            return;
        }

        match self.connect_task.take() {
            None => self.start_connecting(),
            Some(task) => match task.await {
                Ok(Some(outcome)) => self.bind_session(outcome),
                Ok(None) => {
                    // Task observed the terminate flag
                    self.state = HandlerState::Stopped;
                }
                Err(err) => {
                    error!("connect task failed: {err}");
                    self.state = HandlerState::Idle;
                }
            },
        }
    }

    /// Bind resolved handles to the items and build the cyclic read batch
    fn bind_session(&mut self, outcome: ConnectOutcome) {
        let ConnectOutcome { client, handles } = outcome;

        let mut read_items = Vec::new();
        let mut input_indices = Vec::new();
        for (index, item) in self.items.iter_mut().enumerate() {
            // Handles were re-created unresolved when connecting started
            if let Err(err) = item.handle.resolve(handles[index]) {
                error!("handle binding failed: {err}");
                self.state = HandlerState::Idle;
                return;
            }
            if item.config.direction == ItemDirection::Input {
                read_items.push(ReadItem {
                    index_group: IDXGRP_SYM_VALBYHND,
                    index_offset: handles[index],
                    length: item.config.data_type.byte_len() as u32,
                });
                input_indices.push(index);
            }
        }
        let mut read_batch = SumupReadBatch::new(self.config.max_sumup_items);
        read_batch.set_items(read_items);

        info!(
            "connected: {} handles resolved ({} inputs, {} outputs)",
            handles.len(),
            input_indices.len(),
            handles.len() - input_indices.len()
        );
        self.session = Some(Session {
            client,
            handles,
            read_batch,
            input_indices,
        });
        self.state = HandlerState::Transceiving;
    }

    // ========================================================================
    // Transceive phase
    // ========================================================================

    async fn transceive_cycle(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            self.state = HandlerState::Idle;
            return false;
        };

        match self.exchange(&mut session).await {
            Ok(fully) => {
                self.session = Some(session);
                fully
            }
            Err(err) => {
                // Only transport-class failures reach this point; the
                // connection and its handles are gone
                warn!("transceive failed, reconnecting: {err}");
                let _ = session.client.close().await;
                self.state = HandlerState::Idle;
                false
            }
        }
    }

    async fn exchange(&mut self, session: &mut Session) -> AdsResult<bool> {
        // Run or Stop is acceptable mid-session; anything else means the
        // controller was reconfigured and handles cannot be trusted
        session.client.expect_run_state(true).await?;

        let mut fully = true;

        // Inputs
        if !session.read_batch.is_empty() {
            let results = session.client.read_multi(&mut session.read_batch).await?;
            for (position, result) in results.into_iter().enumerate() {
                let item = &mut self.items[session.input_indices[position]];
                fully &= apply_read_result(item, result);
            }
        }

        // Outputs: only items with a pending value are written
        let mut write_items = Vec::new();
        let mut output_indices = Vec::new();
        for (index, item) in self.items.iter().enumerate() {
            if let (Some(value), Ok(handle)) = (&item.pending, item.handle.value()) {
                write_items.push(WriteItem {
                    index_group: IDXGRP_SYM_VALBYHND,
                    index_offset: handle,
                    data: encode_value_vec(value).into(),
                });
                output_indices.push(index);
            }
        }
        if !write_items.is_empty() {
            let mut write_batch = SumupWriteBatch::new(self.config.max_sumup_items);
            write_batch.set_items(write_items);
            let results = session.client.write_multi(&mut write_batch).await?;
            for (position, result) in results.into_iter().enumerate() {
                let item = &mut self.items[output_indices[position]];
                if result.is_ok() {
                    let written = item.pending.take();
                    item.record(AdsReturnCode::NoError, written);
                } else {
                    // Keep the pending value; the write retries next cycle
                    item.record(result.status, None);
                    fully = false;
                }
            }
        }

        Ok(fully)
    }
}

impl std::fmt::Debug for AdsIoHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsIoHandler")
            .field("state", &self.state)
            .field("items", &self.items.len())
            .finish()
    }
}

/// Apply one read result to an item. Returns success.
fn apply_read_result(item: &mut IoItem, result: ItemResult) -> bool {
    if !result.is_ok() {
        item.record(result.status, None);
        return false;
    }
    let Some(data) = result.data else {
        item.record(AdsReturnCode::ProtocolViolation, None);
        return false;
    };
    match decode_value(item.config.data_type, &data) {
        Ok(value) => {
            item.record(AdsReturnCode::NoError, Some(value));
            true
        }
        Err(err) => {
            debug!("item '{}' value decode failed: {err}", item.config.name);
            item.record(AdsReturnCode::ProtocolViolation, None);
            false
        }
    }
}

// ============================================================================
// Background connect task
// ============================================================================

/// Open the transport, wait for the controller to reach `Run`, resolve all
/// handles in one sum-up transaction. Retries indefinitely at the configured
/// interval; returns `None` once the terminate flag is observed.
async fn connect_task(
    config: AdsConnectionConfig,
    names: Vec<String>,
    terminate: Arc<AtomicBool>,
) -> Option<ConnectOutcome> {
    let mut attempt: u64 = 0;
    loop {
        if terminate.load(Ordering::Relaxed) {
            return None;
        }
        attempt += 1;
        match connect_once(&config, &names, &terminate).await {
            Ok(Some(outcome)) => return Some(outcome),
            Ok(None) => return None,
            Err(err) => {
                // A resolution failure retries from socket-open
                warn!(
                    "connect attempt #{attempt} to {}:{} failed: {err}",
                    config.host, config.port
                );
                sleep(config.retry_interval()).await;
            }
        }
    }
}

/// One connect attempt. `Ok(None)` means terminate was requested.
async fn connect_once(
    config: &AdsConnectionConfig,
    names: &[String],
    terminate: &AtomicBool,
) -> AdsResult<Option<ConnectOutcome>> {
    let mut client = AdsClient::connect(config).await?;

    // Poll until the controller reports Run. A not-yet-running controller
    // is re-polled on the same socket; transport errors restart the attempt.
    loop {
        if terminate.load(Ordering::Relaxed) {
            let _ = client.close().await;
            return Ok(None);
        }
        match client.read_state().await? {
            (crate::types::AdsState::Run, _) => break,
            (state, _) => {
                debug!("controller reports {state}, waiting for Run");
                sleep(config.retry_interval()).await;
            }
        }
    }

    let handles = client
        .resolve_handles(names, config.max_sumup_items)
        .await?;
    Ok(Some(ConnectOutcome { client, handles }))
}
