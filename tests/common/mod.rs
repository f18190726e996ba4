//! In-process simulated ADS server for integration tests
//!
//! Implements just enough of the AMS/ADS wire protocol to drive the client
//! end to end: device info, run state, reads/writes by symbol handle,
//! handle resolution/release and the three sum-up composite groups. Test
//! hooks allow failing individual symbols, changing the reported run state
//! and dropping the connection mid-cycle.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const IDXGRP_SYM_HNDBYNAME: u32 = 0xF003;
const IDXGRP_SYM_VALBYHND: u32 = 0xF005;
const IDXGRP_SYM_RELEASEHND: u32 = 0xF006;
const IDXGRP_SUMUP_READ: u32 = 0xF080;
const IDXGRP_SUMUP_WRITE: u32 = 0xF081;
const IDXGRP_SUMUP_READWRITE: u32 = 0xF082;

const ERR_SYMBOL_NOT_FOUND: u32 = 0x0710;
const ERR_INVALID_GROUP: u32 = 0x0702;

#[derive(Debug, Default)]
pub struct ServerState {
    symbols: HashMap<String, Vec<u8>>,
    handles: HashMap<u32, String>,
    next_handle: u32,
    /// Run state reported by ReadState (5 = Run)
    pub run_state: u16,
    /// Symbols whose reads fail with "symbol not found"
    pub fail_reads: HashSet<String>,
    /// Close the connection instead of answering the next request
    pub drop_before_next_reply: bool,
    /// Number of names resolved via get-handle-by-name
    pub resolve_count: u64,
    /// Handles released by the client
    pub released: Vec<u32>,
    /// Sum-up transactions served, by group
    pub sumup_read_count: u64,
    pub sumup_write_count: u64,
    pub sumup_read_write_count: u64,
}

pub struct AdsTestServer {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<ServerState>>,
}

impl AdsTestServer {
    /// Bind on an ephemeral port and serve connections until dropped
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState {
            run_state: 5,
            next_handle: 0x1000,
            ..ServerState::default()
        }));

        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_connection(sock, accept_state.clone()));
            }
        });

        Self { addr, state }
    }

    pub fn set_symbol(&self, name: &str, value: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .symbols
            .insert(name.to_string(), value.to_vec());
    }

    pub fn symbol(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().symbols.get(name).cloned()
    }

    pub fn set_run_state(&self, run_state: u16) {
        self.state.lock().unwrap().run_state = run_state;
    }

    pub fn fail_symbol(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_reads
            .insert(name.to_string());
    }

    pub fn heal_symbol(&self, name: &str) {
        self.state.lock().unwrap().fail_reads.remove(name);
    }

    /// Close the connection instead of answering the next request
    pub fn drop_next(&self) {
        self.state.lock().unwrap().drop_before_next_reply = true;
    }

    pub fn resolve_count(&self) -> u64 {
        self.state.lock().unwrap().resolve_count
    }

    pub fn released_handles(&self) -> Vec<u32> {
        self.state.lock().unwrap().released.clone()
    }

    pub fn sumup_counts(&self) -> (u64, u64, u64) {
        let state = self.state.lock().unwrap();
        (
            state.sumup_read_count,
            state.sumup_write_count,
            state.sumup_read_write_count,
        )
    }
}

async fn serve_connection(mut sock: TcpStream, state: Arc<Mutex<ServerState>>) {
    loop {
        let mut head = [0u8; 6];
        if sock.read_exact(&mut head).await.is_err() {
            return;
        }
        let length = u32::from_le_bytes([head[2], head[3], head[4], head[5]]) as usize;
        let mut body = vec![0u8; length];
        if sock.read_exact(&mut body).await.is_err() {
            return;
        }

        if std::mem::take(&mut state.lock().unwrap().drop_before_next_reply) {
            // Simulated socket drop mid-cycle
            return;
        }

        let frame = match handle_request(&body, &state) {
            Some(frame) => frame,
            None => return,
        };
        if sock.write_all(&frame).await.is_err() {
            return;
        }
    }
}

/// Parse one AMS packet, dispatch the command, frame the response
fn handle_request(body: &[u8], state: &Arc<Mutex<ServerState>>) -> Option<Vec<u8>> {
    if body.len() < 32 {
        return None;
    }
    let mut buf = &body[..];
    let mut target = [0u8; 8];
    buf.copy_to_slice(&mut target);
    let mut source = [0u8; 8];
    buf.copy_to_slice(&mut source);
    let command_id = buf.get_u16_le();
    let state_flags = buf.get_u16_le();
    let _data_length = buf.get_u32_le();
    let _error_code = buf.get_u32_le();
    let invoke_id = buf.get_u32_le();
    let payload = buf;

    let response_payload = {
        let mut locked = state.lock().unwrap();
        dispatch(command_id, payload, &mut locked)
    };

    // Response header: endpoints swapped, response bit set, invoke echoed
    let mut frame = BytesMut::with_capacity(6 + 32 + response_payload.len());
    frame.put_u16_le(0);
    frame.put_u32_le((32 + response_payload.len()) as u32);
    frame.put_slice(&source);
    frame.put_slice(&target);
    frame.put_u16_le(command_id);
    frame.put_u16_le(state_flags | 0x0001);
    frame.put_u32_le(response_payload.len() as u32);
    frame.put_u32_le(0);
    frame.put_u32_le(invoke_id);
    frame.put_slice(&response_payload);
    Some(frame.to_vec())
}

fn dispatch(command_id: u16, payload: &[u8], state: &mut ServerState) -> Vec<u8> {
    match command_id {
        1 => device_info_response(),
        2 => {
            let mut buf = payload;
            let group = buf.get_u32_le();
            let offset = buf.get_u32_le();
            let length = buf.get_u32_le();
            read_response(state, group, offset, length)
        }
        3 => {
            let mut buf = payload;
            let group = buf.get_u32_le();
            let offset = buf.get_u32_le();
            let length = buf.get_u32_le() as usize;
            let data = &buf[..length.min(buf.len())];
            let result = apply_write(state, group, offset, data);
            let mut out = BytesMut::new();
            out.put_u32_le(result);
            out.to_vec()
        }
        4 => {
            let mut out = BytesMut::new();
            out.put_u32_le(0);
            out.put_u16_le(state.run_state);
            out.put_u16_le(0);
            out.to_vec()
        }
        9 => {
            let mut buf = payload;
            let group = buf.get_u32_le();
            let offset = buf.get_u32_le();
            let read_length = buf.get_u32_le();
            let write_length = buf.get_u32_le() as usize;
            let write_data = &buf[..write_length.min(buf.len())];
            read_write_response(state, group, offset, read_length, write_data)
        }
        _ => {
            let mut out = BytesMut::new();
            out.put_u32_le(0x0008); // unknown command id
            out.to_vec()
        }
    }
}

fn device_info_response() -> Vec<u8> {
    let mut out = BytesMut::new();
    out.put_u32_le(0);
    out.put_u8(3);
    out.put_u8(1);
    out.put_u16_le(4024);
    let mut name = [0u8; 16];
    name[..6].copy_from_slice(b"SimPLC");
    out.put_slice(&name);
    out.to_vec()
}

/// Read a symbol value by handle; returns (code, bytes truncated/padded)
fn read_by_handle(state: &ServerState, handle: u32, length: usize) -> (u32, Vec<u8>) {
    let Some(name) = state.handles.get(&handle) else {
        return (ERR_SYMBOL_NOT_FOUND, Vec::new());
    };
    if state.fail_reads.contains(name) {
        return (ERR_SYMBOL_NOT_FOUND, Vec::new());
    }
    let Some(value) = state.symbols.get(name) else {
        return (ERR_SYMBOL_NOT_FOUND, Vec::new());
    };
    let mut data = value.clone();
    data.resize(length, 0);
    (0, data)
}

fn read_response(state: &ServerState, group: u32, offset: u32, length: u32) -> Vec<u8> {
    let mut out = BytesMut::new();
    if group != IDXGRP_SYM_VALBYHND {
        out.put_u32_le(ERR_INVALID_GROUP);
        out.put_u32_le(0);
        return out.to_vec();
    }
    let (code, data) = read_by_handle(state, offset, length as usize);
    out.put_u32_le(code);
    out.put_u32_le(data.len() as u32);
    out.put_slice(&data);
    out.to_vec()
}

fn apply_write(state: &mut ServerState, group: u32, offset: u32, data: &[u8]) -> u32 {
    match group {
        IDXGRP_SYM_VALBYHND => {
            let Some(name) = state.handles.get(&offset).cloned() else {
                return ERR_SYMBOL_NOT_FOUND;
            };
            state.symbols.insert(name, data.to_vec());
            0
        }
        IDXGRP_SYM_RELEASEHND => {
            if data.len() < 4 {
                return ERR_INVALID_GROUP;
            }
            let handle = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            state.handles.remove(&handle);
            state.released.push(handle);
            0
        }
        _ => ERR_INVALID_GROUP,
    }
}

fn resolve_name(state: &mut ServerState, name: &str) -> (u32, u32) {
    if !state.symbols.contains_key(name) {
        return (ERR_SYMBOL_NOT_FOUND, 0);
    }
    state.resolve_count += 1;
    let handle = state.next_handle;
    state.next_handle += 1;
    state.handles.insert(handle, name.to_string());
    (0, handle)
}

fn read_write_response(
    state: &mut ServerState,
    group: u32,
    offset: u32,
    _read_length: u32,
    write_data: &[u8],
) -> Vec<u8> {
    let mut out = BytesMut::new();
    match group {
        IDXGRP_SYM_HNDBYNAME => {
            let name = String::from_utf8_lossy(write_data).into_owned();
            let (code, handle) = resolve_name(state, &name);
            out.put_u32_le(code);
            if code == 0 {
                out.put_u32_le(4);
                out.put_u32_le(handle);
            } else {
                out.put_u32_le(0);
            }
        }
        IDXGRP_SUMUP_READ => {
            state.sumup_read_count += 1;
            let count = offset as usize;
            let mut meta = write_data;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let group = meta.get_u32_le();
                let handle = meta.get_u32_le();
                let length = meta.get_u32_le() as usize;
                items.push((group, handle, length));
            }
            let mut headers = BytesMut::new();
            let mut blocks = BytesMut::new();
            for (group, handle, length) in items {
                let (code, data) = if group == IDXGRP_SYM_VALBYHND {
                    read_by_handle(state, handle, length)
                } else {
                    (ERR_INVALID_GROUP, Vec::new())
                };
                headers.put_u32_le(code);
                headers.put_u32_le(data.len() as u32);
                blocks.put_slice(&data);
            }
            out.put_u32_le(0);
            out.put_u32_le((headers.len() + blocks.len()) as u32);
            out.put_slice(&headers);
            out.put_slice(&blocks);
        }
        IDXGRP_SUMUP_WRITE => {
            state.sumup_write_count += 1;
            let count = offset as usize;
            let mut meta = write_data;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let group = meta.get_u32_le();
                let handle = meta.get_u32_le();
                let length = meta.get_u32_le() as usize;
                items.push((group, handle, length));
            }
            let mut results = BytesMut::new();
            let mut data = meta;
            for (group, handle, length) in items {
                let n = length.min(data.len());
                let block = data[..n].to_vec();
                data.advance(n);
                let code = apply_write(state, group, handle, &block);
                results.put_u32_le(code);
            }
            out.put_u32_le(0);
            out.put_u32_le(results.len() as u32);
            out.put_slice(&results);
        }
        IDXGRP_SUMUP_READWRITE => {
            state.sumup_read_write_count += 1;
            let count = offset as usize;
            let mut meta = write_data;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                let group = meta.get_u32_le();
                let item_offset = meta.get_u32_le();
                let item_read = meta.get_u32_le() as usize;
                let item_write = meta.get_u32_le() as usize;
                items.push((group, item_offset, item_read, item_write));
            }
            let mut headers = BytesMut::new();
            let mut blocks = BytesMut::new();
            let mut data = meta;
            for (group, _item_offset, _item_read, item_write) in items {
                let n = item_write.min(data.len());
                let block = data[..n].to_vec();
                data.advance(n);
                if group == IDXGRP_SYM_HNDBYNAME {
                    let name = String::from_utf8_lossy(&block).into_owned();
                    let (code, handle) = resolve_name(state, &name);
                    headers.put_u32_le(code);
                    if code == 0 {
                        headers.put_u32_le(4);
                        blocks.put_u32_le(handle);
                    } else {
                        headers.put_u32_le(0);
                    }
                } else {
                    headers.put_u32_le(ERR_INVALID_GROUP);
                    headers.put_u32_le(0);
                }
            }
            out.put_u32_le(0);
            out.put_u32_le((headers.len() + blocks.len()) as u32);
            out.put_slice(&headers);
            out.put_slice(&blocks);
        }
        _ => {
            out.put_u32_le(ERR_INVALID_GROUP);
            out.put_u32_le(0);
        }
    }
    out.to_vec()
}
