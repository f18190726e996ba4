//! ADS client implementation
//!
//! [`AdsClient`] layers the command-level API over an [`AmsTransport`]:
//! single reads/writes, run-state queries, symbol-handle management and the
//! sum-up multi-transactions used by the cyclic engine.
//!
//! Error policy follows the crate-wide taxonomy: transport and correlation
//! failures bubble up (the connection is gone), device-level failures of an
//! outer sum-up transaction are folded into every sub-item result so callers
//! always get a uniform per-item view.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::batcher::{
    ItemResult, ReadWriteItem, SumupReadBatch, SumupReadWriteBatch, SumupWriteBatch,
};
use crate::constants::{
    IDXGRP_SYM_HNDBYNAME, IDXGRP_SYM_RELEASEHND, IDXGRP_SYM_VALBYHND,
};
use crate::error::{AdsError, AdsResult, AdsReturnCode};
use crate::protocol::{AdsRequest, AdsResponse};
use crate::transport::{AdsConnectionConfig, AmsTransport, TcpTransport, TransportStats};
use crate::types::AdsState;

/// Name and version of the remote device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub major: u8,
    pub minor: u8,
    pub build: u16,
    pub name: String,
}

/// Command-level ADS client bound to one connection
pub struct AdsClient {
    transport: Box<dyn AmsTransport>,
}

impl AdsClient {
    /// Wrap an existing transport
    pub fn new(transport: Box<dyn AmsTransport>) -> Self {
        Self { transport }
    }

    /// Open a TCP connection to the configured target
    pub async fn connect(config: &AdsConnectionConfig) -> AdsResult<Self> {
        Ok(Self::new(Box::new(TcpTransport::connect(config).await?)))
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub async fn close(&mut self) -> AdsResult<()> {
        self.transport.close().await
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    // ========================================================================
    // Single commands
    // ========================================================================

    /// Read name and version of the remote device
    pub async fn read_device_info(&mut self) -> AdsResult<DeviceInfo> {
        match self.transport.transact(&AdsRequest::ReadDeviceInfo).await? {
            AdsResponse::DeviceInfo {
                major,
                minor,
                build,
                device_name,
            } => Ok(DeviceInfo {
                major,
                minor,
                build,
                name: device_name,
            }),
            other => Err(unexpected_response("device info", &other)),
        }
    }

    /// Read the remote run state and device state
    pub async fn read_state(&mut self) -> AdsResult<(AdsState, u16)> {
        match self.transport.transact(&AdsRequest::ReadState).await? {
            AdsResponse::State {
                ads_state,
                device_state,
            } => Ok((ads_state, device_state)),
            other => Err(unexpected_response("state", &other)),
        }
    }

    /// Verify the remote run state allows data exchange.
    ///
    /// `Run` is always accepted; `Stop` only when `allow_stop` is set (the
    /// transceive phase tolerates a stopped PLC, the connect phase does
    /// not). Any other state counts as a connection loss, since handles and
    /// variable layouts may have changed.
    pub async fn expect_run_state(&mut self, allow_stop: bool) -> AdsResult<AdsState> {
        let (state, _) = self.read_state().await?;
        match state {
            AdsState::Run => Ok(state),
            AdsState::Stop if allow_stop => Ok(state),
            other => Err(AdsError::InvalidState(other.to_string())),
        }
    }

    /// Read raw bytes at (index group, index offset)
    pub async fn read(&mut self, index_group: u32, index_offset: u32, length: u32) -> AdsResult<Bytes> {
        let request = AdsRequest::Read {
            index_group,
            index_offset,
            length,
        };
        match self.transport.transact(&request).await? {
            AdsResponse::Read { data } => Ok(data),
            other => Err(unexpected_response("read", &other)),
        }
    }

    /// Write raw bytes to (index group, index offset)
    pub async fn write(&mut self, index_group: u32, index_offset: u32, data: Bytes) -> AdsResult<()> {
        let request = AdsRequest::Write {
            index_group,
            index_offset,
            data,
        };
        match self.transport.transact(&request).await? {
            AdsResponse::Write => Ok(()),
            other => Err(unexpected_response("write", &other)),
        }
    }

    /// Write bytes and read back `read_length` bytes in one round trip
    pub async fn read_write(
        &mut self,
        index_group: u32,
        index_offset: u32,
        read_length: u32,
        write_data: Bytes,
    ) -> AdsResult<Bytes> {
        let request = AdsRequest::ReadWrite {
            index_group,
            index_offset,
            read_length,
            write_data,
        };
        match self.transport.transact(&request).await? {
            AdsResponse::ReadWrite { data } => Ok(data),
            other => Err(unexpected_response("read-write", &other)),
        }
    }

    // ========================================================================
    // Symbol handles
    // ========================================================================

    /// Resolve one symbolic variable name to its handle
    pub async fn resolve_handle(&mut self, name: &str) -> AdsResult<u32> {
        let data = self
            .read_write(
                IDXGRP_SYM_HNDBYNAME,
                0,
                4,
                Bytes::copy_from_slice(name.as_bytes()),
            )
            .await?;
        if data.len() < 4 {
            return Err(AdsError::protocol(format!(
                "handle response for '{name}' is {} bytes, expected 4",
                data.len()
            )));
        }
        Ok(LittleEndian::read_u32(&data))
    }

    /// Resolve many names in one sum-up read-write transaction.
    ///
    /// Handle resolution is part of the connect phase; any per-item failure
    /// is escalated so the caller retries from socket-open.
    pub async fn resolve_handles(
        &mut self,
        names: &[String],
        max_sumup_items: usize,
    ) -> AdsResult<Vec<u32>> {
        let mut batch = SumupReadWriteBatch::new(max_sumup_items);
        batch.set_items(
            names
                .iter()
                .map(|name| ReadWriteItem {
                    index_group: IDXGRP_SYM_HNDBYNAME,
                    index_offset: 0,
                    read_length: 4,
                    write_data: Bytes::copy_from_slice(name.as_bytes()),
                })
                .collect(),
        );
        let results = self.read_write_multi(&mut batch).await?;

        let mut handles = Vec::with_capacity(names.len());
        for (name, result) in names.iter().zip(results) {
            if !result.is_ok() {
                return Err(AdsError::Device(result.status));
            }
            let data = result
                .data
                .ok_or_else(|| AdsError::protocol(format!("no handle data for '{name}'")))?;
            if data.len() < 4 {
                return Err(AdsError::protocol(format!(
                    "handle response for '{name}' is {} bytes, expected 4",
                    data.len()
                )));
            }
            handles.push(LittleEndian::read_u32(&data));
        }
        debug!("resolved {} symbol handles", handles.len());
        Ok(handles)
    }

    /// Release one handle
    pub async fn release_handle(&mut self, handle: u32) -> AdsResult<()> {
        let mut data = [0u8; 4];
        LittleEndian::write_u32(&mut data, handle);
        self.write(IDXGRP_SYM_RELEASEHND, 0, Bytes::copy_from_slice(&data))
            .await
    }

    /// Release many handles in one sum-up write transaction. Best effort:
    /// per-item failures are logged, never escalated, since the remote
    /// reclaims abandoned handles when the socket closes.
    pub async fn release_handles(
        &mut self,
        handles: &[u32],
        max_sumup_items: usize,
    ) -> AdsResult<()> {
        if handles.is_empty() {
            return Ok(());
        }
        let mut batch = SumupWriteBatch::new(max_sumup_items);
        batch.set_items(
            handles
                .iter()
                .map(|handle| {
                    let mut data = [0u8; 4];
                    LittleEndian::write_u32(&mut data, *handle);
                    crate::batcher::WriteItem {
                        index_group: IDXGRP_SYM_RELEASEHND,
                        index_offset: 0,
                        data: Bytes::copy_from_slice(&data),
                    }
                })
                .collect(),
        );
        let results = self.write_multi(&mut batch).await?;
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        if failed > 0 {
            warn!("{failed}/{} handle releases failed", handles.len());
        }
        Ok(())
    }

    /// Read a value by symbol handle
    pub async fn read_by_handle(&mut self, handle: u32, length: u32) -> AdsResult<Bytes> {
        self.read(IDXGRP_SYM_VALBYHND, handle, length).await
    }

    /// Write a value by symbol handle
    pub async fn write_by_handle(&mut self, handle: u32, data: Bytes) -> AdsResult<()> {
        self.write(IDXGRP_SYM_VALBYHND, handle, data).await
    }

    // ========================================================================
    // Sum-up multi transactions
    // ========================================================================

    /// Execute a read-multiple batch, one wire transaction per planned chunk
    pub async fn read_multi(&mut self, batch: &mut SumupReadBatch) -> AdsResult<Vec<ItemResult>> {
        let ranges = batch.plan().ranges();
        let mut results = Vec::with_capacity(batch.items().len());
        for range in ranges {
            let request = batch.chunk_request(range.clone());
            match self.transport.transact(&request).await {
                Ok(AdsResponse::ReadWrite { data }) => {
                    match batch.parse_chunk_response(range.clone(), &data) {
                        Ok(mut chunk) => results.append(&mut chunk),
                        Err(err) => {
                            // Structural mismatch fails the whole chunk
                            warn!("sum-up read chunk failed: {err}");
                            results.extend(
                                range.map(|_| ItemResult::failed(AdsReturnCode::ProtocolViolation)),
                            );
                        }
                    }
                }
                Ok(other) => return Err(unexpected_response("sum-up read", &other)),
                Err(err) if err.needs_reconnect() => return Err(err),
                Err(err) => {
                    // Outer envelope failure: propagate into every sub-item
                    let code = err.as_return_code();
                    warn!("sum-up read transaction failed: {err}");
                    results.extend(range.map(|_| ItemResult::failed(code)));
                }
            }
        }
        Ok(results)
    }

    /// Execute a write-multiple batch, one wire transaction per planned chunk
    pub async fn write_multi(&mut self, batch: &mut SumupWriteBatch) -> AdsResult<Vec<ItemResult>> {
        let ranges = batch.plan().ranges();
        let mut results = Vec::with_capacity(batch.items().len());
        for range in ranges {
            let request = batch.chunk_request(range.clone());
            match self.transport.transact(&request).await {
                Ok(AdsResponse::ReadWrite { data }) => {
                    match batch.parse_chunk_response(range.clone(), &data) {
                        Ok(mut chunk) => results.append(&mut chunk),
                        Err(err) => {
                            warn!("sum-up write chunk failed: {err}");
                            results.extend(
                                range.map(|_| ItemResult::failed(AdsReturnCode::ProtocolViolation)),
                            );
                        }
                    }
                }
                Ok(other) => return Err(unexpected_response("sum-up write", &other)),
                Err(err) if err.needs_reconnect() => return Err(err),
                Err(err) => {
                    let code = err.as_return_code();
                    warn!("sum-up write transaction failed: {err}");
                    results.extend(range.map(|_| ItemResult::failed(code)));
                }
            }
        }
        Ok(results)
    }

    /// Execute a read-write-multiple batch, one wire transaction per chunk
    pub async fn read_write_multi(
        &mut self,
        batch: &mut SumupReadWriteBatch,
    ) -> AdsResult<Vec<ItemResult>> {
        let ranges = batch.plan().ranges();
        let mut results = Vec::with_capacity(batch.items().len());
        for range in ranges {
            let request = batch.chunk_request(range.clone());
            match self.transport.transact(&request).await {
                Ok(AdsResponse::ReadWrite { data }) => {
                    match batch.parse_chunk_response(range.clone(), &data) {
                        Ok(mut chunk) => results.append(&mut chunk),
                        Err(err) => {
                            warn!("sum-up read-write chunk failed: {err}");
                            results.extend(
                                range.map(|_| ItemResult::failed(AdsReturnCode::ProtocolViolation)),
                            );
                        }
                    }
                }
                Ok(other) => return Err(unexpected_response("sum-up read-write", &other)),
                Err(err) if err.needs_reconnect() => return Err(err),
                Err(err) => {
                    let code = err.as_return_code();
                    warn!("sum-up read-write transaction failed: {err}");
                    results.extend(range.map(|_| ItemResult::failed(code)));
                }
            }
        }
        Ok(results)
    }
}

impl std::fmt::Debug for AdsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsClient")
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn unexpected_response(what: &str, response: &AdsResponse) -> AdsError {
    AdsError::protocol(format!("unexpected {what} response: {response:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::ReadItem;
    use async_trait::async_trait;
    use bytes::{BufMut, BytesMut};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted transport: records requests, plays back queued replies
    struct MockTransport {
        requests: Arc<Mutex<Vec<AdsRequest>>>,
        replies: VecDeque<AdsResult<AdsResponse>>,
        connected: bool,
    }

    impl MockTransport {
        fn new(replies: Vec<AdsResult<AdsResponse>>) -> (Self, Arc<Mutex<Vec<AdsRequest>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    requests: requests.clone(),
                    replies: replies.into(),
                    connected: true,
                },
                requests,
            )
        }
    }

    #[async_trait]
    impl AmsTransport for MockTransport {
        async fn transact(&mut self, request: &AdsRequest) -> AdsResult<AdsResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .pop_front()
                .unwrap_or(Err(AdsError::NotConnected))
        }

        async fn close(&mut self) -> AdsResult<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn stats(&self) -> TransportStats {
            TransportStats::default()
        }
    }

    fn client_with(replies: Vec<AdsResult<AdsResponse>>) -> (AdsClient, Arc<Mutex<Vec<AdsRequest>>>) {
        let (transport, requests) = MockTransport::new(replies);
        (AdsClient::new(Box::new(transport)), requests)
    }

    fn read_write_response(payload: BytesMut) -> AdsResult<AdsResponse> {
        Ok(AdsResponse::ReadWrite {
            data: payload.freeze(),
        })
    }

    #[tokio::test]
    async fn test_resolve_handle_request_shape() {
        let (mut client, requests) = client_with(vec![Ok(AdsResponse::ReadWrite {
            data: Bytes::from_static(&[0x42, 0x00, 0x00, 0x80]),
        })]);

        let handle = client.resolve_handle("MAIN.counter").await.unwrap();
        assert_eq!(handle, 0x8000_0042);

        let recorded = requests.lock().unwrap();
        match &recorded[0] {
            AdsRequest::ReadWrite {
                index_group,
                index_offset,
                read_length,
                write_data,
            } => {
                assert_eq!(*index_group, IDXGRP_SYM_HNDBYNAME);
                assert_eq!(*index_offset, 0);
                assert_eq!(*read_length, 4);
                assert_eq!(write_data.as_ref(), b"MAIN.counter");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_by_handle_addresses_valbyhnd() {
        let (mut client, requests) = client_with(vec![Ok(AdsResponse::Read {
            data: Bytes::from_static(&[1, 0]),
        })]);

        let data = client.read_by_handle(0x1234, 2).await.unwrap();
        assert_eq!(data.as_ref(), &[1, 0]);

        let recorded = requests.lock().unwrap();
        match &recorded[0] {
            AdsRequest::Read {
                index_group,
                index_offset,
                length,
            } => {
                assert_eq!(*index_group, IDXGRP_SYM_VALBYHND);
                assert_eq!(*index_offset, 0x1234);
                assert_eq!(*length, 2);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expect_run_state() {
        let (mut client, _) = client_with(vec![
            Ok(AdsResponse::State {
                ads_state: AdsState::Run,
                device_state: 0,
            }),
            Ok(AdsResponse::State {
                ads_state: AdsState::Stop,
                device_state: 0,
            }),
            Ok(AdsResponse::State {
                ads_state: AdsState::Stop,
                device_state: 0,
            }),
            Ok(AdsResponse::State {
                ads_state: AdsState::Config,
                device_state: 0,
            }),
        ]);

        assert_eq!(client.expect_run_state(false).await.unwrap(), AdsState::Run);
        assert_eq!(client.expect_run_state(true).await.unwrap(), AdsState::Stop);
        // Stop is not acceptable during connect
        assert!(matches!(
            client.expect_run_state(false).await,
            Err(AdsError::InvalidState(_))
        ));
        assert!(matches!(
            client.expect_run_state(true).await,
            Err(AdsError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_read_multi_splits_into_chunks() {
        // 3 items, max 2 per chunk -> two wire transactions
        let mut chunk1 = BytesMut::new();
        chunk1.put_u32_le(0);
        chunk1.put_u32_le(2);
        chunk1.put_u32_le(0);
        chunk1.put_u32_le(2);
        chunk1.put_slice(&[1, 0]);
        chunk1.put_slice(&[2, 0]);
        let mut chunk2 = BytesMut::new();
        chunk2.put_u32_le(0);
        chunk2.put_u32_le(2);
        chunk2.put_slice(&[3, 0]);

        let (mut client, requests) = client_with(vec![
            read_write_response(chunk1),
            read_write_response(chunk2),
        ]);

        let mut batch = SumupReadBatch::new(2);
        batch.set_items(
            (0..3)
                .map(|i| ReadItem {
                    index_group: IDXGRP_SYM_VALBYHND,
                    index_offset: i,
                    length: 2,
                })
                .collect(),
        );

        let results = client.read_multi(&mut batch).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(results[2].data, Some(Bytes::from_static(&[3, 0])));
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_read_multi_outer_device_failure_marks_chunk_items() {
        let mut chunk1 = BytesMut::new();
        chunk1.put_u32_le(0);
        chunk1.put_u32_le(2);
        chunk1.put_u32_le(0);
        chunk1.put_u32_le(2);
        chunk1.put_slice(&[1, 0]);
        chunk1.put_slice(&[2, 0]);

        let (mut client, _) = client_with(vec![
            read_write_response(chunk1),
            Err(AdsError::Device(AdsReturnCode::DeviceBusy)),
        ]);

        let mut batch = SumupReadBatch::new(2);
        batch.set_items(
            (0..3)
                .map(|i| ReadItem {
                    index_group: IDXGRP_SYM_VALBYHND,
                    index_offset: i,
                    length: 2,
                })
                .collect(),
        );

        let results = client.read_multi(&mut batch).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert_eq!(results[2].status, AdsReturnCode::DeviceBusy);
    }

    #[tokio::test]
    async fn test_read_multi_transport_failure_bubbles() {
        let (mut client, _) = client_with(vec![Err(AdsError::io("broken pipe"))]);

        let mut batch = SumupReadBatch::new(2);
        batch.set_items(vec![ReadItem {
            index_group: IDXGRP_SYM_VALBYHND,
            index_offset: 0,
            length: 2,
        }]);

        let err = client.read_multi(&mut batch).await.unwrap_err();
        assert!(err.needs_reconnect());
    }

    #[tokio::test]
    async fn test_resolve_handles_escalates_per_item_failure() {
        let mut payload = BytesMut::new();
        payload.put_u32_le(0);
        payload.put_u32_le(4);
        payload.put_u32_le(0x0710); // symbol not found
        payload.put_u32_le(0);
        payload.put_u32_le(0x11);

        let (mut client, _) = client_with(vec![read_write_response(payload)]);

        let names = vec!["MAIN.a".to_string(), "MAIN.missing".to_string()];
        let err = client.resolve_handles(&names, 100).await.unwrap_err();
        assert_eq!(
            err,
            AdsError::Device(AdsReturnCode::DeviceSymbolNotFound)
        );
    }

    #[tokio::test]
    async fn test_release_handles_is_best_effort() {
        let mut payload = BytesMut::new();
        payload.put_u32_le(0);
        payload.put_u32_le(0x0716); // no more handles (bogus, but a failure)

        let (mut client, requests) = client_with(vec![read_write_response(payload)]);
        client.release_handles(&[1, 2], 100).await.unwrap();

        let recorded = requests.lock().unwrap();
        match &recorded[0] {
            AdsRequest::ReadWrite { index_group, .. } => {
                assert_eq!(*index_group, crate::constants::IDXGRP_SUMUP_WRITE);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }
}
