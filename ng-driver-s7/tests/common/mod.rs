#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use ng_driver_s7::{
    protocol::{
        codec::Codec,
        frame::{
            build_cotp_cc_message, build_data_message, build_read_var_response,
            build_setup_comm_response, build_write_var_response, parse_data_items,
            parse_var_specs, Cotp, CotpConnParams, S7AppBody, S7Area, S7Function, S7Pdu,
            S7ReturnCode, S7TransportSize, SetupCommParams,
        },
    },
    CpuType, S7ClientConfig, TsapConfig,
};
use ng_s7_sdk::{ConnectionMode, RetryPolicy};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::{AbortHandle, JoinHandle},
};
use tokio_util::codec::Framed;
use tracing::Level;

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .with_test_writer()
            .try_init();
    });
}

/// Committed memory access seen by the mock PLC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlcEvent {
    Read {
        area: S7Area,
        db: u16,
        start: u32,
        len: usize,
    },
    Write {
        area: S7Area,
        db: u16,
        start: u32,
        bit: Option<u8>,
        data: Vec<u8>,
    },
}

type Memory = Arc<Mutex<HashMap<(S7Area, u16), Vec<u8>>>>;

/// In-process PLC responder speaking TPKT/COTP/S7 on a loopback port.
///
/// DB1 and DB2 hold 1024 bytes each; I, Q and M hold 256. Any other DB answers
/// "object does not exist", accesses past the end "address out of range".
pub struct MockPlc {
    addr: SocketAddr,
    memory: Memory,
    events: broadcast::Sender<PlcEvent>,
    connections: Arc<Mutex<Vec<AbortHandle>>>,
    accepted: Arc<AtomicUsize>,
    ignore_reads: Arc<AtomicBool>,
    accept_task: JoinHandle<()>,
}

impl MockPlc {
    pub async fn start() -> Self {
        Self::start_with_pdu(480).await
    }

    /// `pdu_len` caps what Setup Communication grants.
    pub async fn start_with_pdu(pdu_len: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut areas = HashMap::new();
        areas.insert((S7Area::DB, 1), vec![0u8; 1024]);
        areas.insert((S7Area::DB, 2), vec![0u8; 1024]);
        for area in [S7Area::I, S7Area::Q, S7Area::M] {
            areas.insert((area, 0), vec![0u8; 256]);
        }
        let memory: Memory = Arc::new(Mutex::new(areas));
        let (events, _) = broadcast::channel(1024);
        let connections = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let ignore_reads = Arc::new(AtomicBool::new(false));

        let accept_task = {
            let memory = memory.clone();
            let events = events.clone();
            let connections = connections.clone();
            let accepted = accepted.clone();
            let ignore_reads = ignore_reads.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let task = tokio::spawn(serve(
                        stream,
                        memory.clone(),
                        events.clone(),
                        ignore_reads.clone(),
                        pdu_len,
                    ));
                    connections.lock().unwrap().push(task.abort_handle());
                }
            })
        };

        Self {
            addr,
            memory,
            events,
            connections,
            accepted,
            ignore_reads,
            accept_task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client config pointing at this PLC with short timeouts and fast retries.
    pub fn client_config(&self) -> S7ClientConfig {
        let mut cfg = S7ClientConfig::new("127.0.0.1");
        cfg.port = self.port();
        cfg.cpu = CpuType::S71200;
        cfg.tsap = TsapConfig::RackSlot { rack: 0, slot: 1 };
        cfg.connection.connect_timeout_ms = 2000;
        cfg.connection.read_timeout_ms = 2000;
        cfg.connection.write_timeout_ms = 2000;
        cfg.connection.mode = ConnectionMode::Persistent;
        cfg.connection.backoff = RetryPolicy::constant(20, 3);
        cfg
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlcEvent> {
        self.events.subscribe()
    }

    pub fn set_bytes(&self, area: S7Area, db: u16, start: usize, data: &[u8]) {
        let mut mem = self.memory.lock().unwrap();
        let region = mem.get_mut(&(area, db)).unwrap();
        region[start..start + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self, area: S7Area, db: u16, start: usize, len: usize) -> Vec<u8> {
        let mem = self.memory.lock().unwrap();
        mem[&(area, db)][start..start + len].to_vec()
    }

    /// Close every open connection; new ones are still accepted.
    pub fn drop_connections(&self) {
        for handle in self.connections.lock().unwrap().drain(..) {
            handle.abort();
        }
    }

    /// While set, ReadVar jobs are swallowed without an answer.
    pub fn ignore_reads(&self, ignore: bool) {
        self.ignore_reads.store(ignore, Ordering::SeqCst);
    }

    pub fn connections_accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for MockPlc {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

async fn serve(
    stream: TcpStream,
    memory: Memory,
    events: broadcast::Sender<PlcEvent>,
    ignore_reads: Arc<AtomicBool>,
    pdu_len: u16,
) {
    let mut framed = Framed::new(stream, Codec);
    while let Some(Ok(msg)) = framed.next().await {
        let reply = match (msg.cotp, msg.app) {
            (Cotp::Cr(req), _) => build_cotp_cc_message(CotpConnParams::confirm_for(&req)),
            (Cotp::D(_), Some(S7AppBody::Parsed(pdu)))
                if pdu.function() == Some(S7Function::ReadVar)
                    && ignore_reads.load(Ordering::SeqCst) =>
            {
                continue;
            }
            (Cotp::D(_), Some(S7AppBody::Parsed(pdu))) => match handle_job(&pdu, &memory, &events, pdu_len) {
                Some(resp) => build_data_message(resp),
                None => break,
            },
            _ => break,
        };
        if framed.send(reply).await.is_err() {
            break;
        }
    }
}

fn region_code(memory: &Memory, area: S7Area, db: u16, start: u32, len: usize) -> S7ReturnCode {
    let mem = memory.lock().unwrap();
    match mem.get(&(area, db)) {
        None => S7ReturnCode::ObjectDoesNotExist,
        Some(region) if start as usize + len > region.len() => S7ReturnCode::AddressOutOfRange,
        Some(_) => S7ReturnCode::Success,
    }
}

fn handle_job(
    pdu: &S7Pdu,
    memory: &Memory,
    events: &broadcast::Sender<PlcEvent>,
    pdu_len: u16,
) -> Option<S7Pdu> {
    let pdu_ref = pdu.header.pdu_ref;
    match pdu.function()? {
        S7Function::SetupCommunication => {
            let req = SetupCommParams::parse(&pdu.param).ok()?;
            build_setup_comm_response(
                pdu_ref,
                SetupCommParams {
                    pdu_len: req.pdu_len.min(pdu_len),
                    ..req
                },
            )
            .ok()
        }
        S7Function::ReadVar => {
            let count = *pdu.param.get(1)?;
            let specs = parse_var_specs(count, &pdu.param[2..]).ok()?;
            let mut items: Vec<(S7ReturnCode, Vec<u8>)> = Vec::new();
            for spec in specs {
                let len = spec.byte_len();
                let code = region_code(memory, spec.area, spec.db_number, spec.byte_address, len);
                if code != S7ReturnCode::Success {
                    items.push((code, Vec::new()));
                    continue;
                }
                let start = spec.byte_address as usize;
                let data = memory.lock().unwrap()[&(spec.area, spec.db_number)][start..start + len].to_vec();
                let _ = events.send(PlcEvent::Read {
                    area: spec.area,
                    db: spec.db_number,
                    start: spec.byte_address,
                    len,
                });
                items.push((code, data));
            }
            let view: Vec<(S7ReturnCode, &[u8])> =
                items.iter().map(|(c, d)| (*c, d.as_slice())).collect();
            build_read_var_response(pdu_ref, &view).ok()
        }
        S7Function::WriteVar => {
            let count = *pdu.param.get(1)?;
            let specs = parse_var_specs(count, &pdu.param[2..]).ok()?;
            let data_items = parse_data_items(count, &pdu.payload).ok()?;
            let mut codes = Vec::with_capacity(specs.len());
            for (spec, item) in specs.iter().zip(data_items.iter()) {
                let is_bit = spec.transport_size == S7TransportSize::Bit;
                let len = if is_bit { 1 } else { item.data.len() };
                let code = region_code(memory, spec.area, spec.db_number, spec.byte_address, len);
                if code == S7ReturnCode::Success {
                    let mut mem = memory.lock().unwrap();
                    let region = mem.get_mut(&(spec.area, spec.db_number))?;
                    let start = spec.byte_address as usize;
                    if is_bit {
                        let mask = 1u8 << spec.bit_index;
                        if item.data.first().copied().unwrap_or(0) != 0 {
                            region[start] |= mask;
                        } else {
                            region[start] &= !mask;
                        }
                    } else {
                        region[start..start + len].copy_from_slice(item.data);
                    }
                    let _ = events.send(PlcEvent::Write {
                        area: spec.area,
                        db: spec.db_number,
                        start: spec.byte_address,
                        bit: is_bit.then_some(spec.bit_index),
                        data: item.data.to_vec(),
                    });
                }
                codes.push(code);
            }
            build_write_var_response(pdu_ref, &codes).ok()
        }
    }
}
