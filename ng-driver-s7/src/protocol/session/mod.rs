mod handshake;
mod state;
pub use state::{SessionConfig, SessionLifecycleState};

use super::{
    codec::Codec,
    error::{Error, Result},
    frame::{
        build_data_message, build_read_var, build_write_var, Cotp, S7Address, S7AppBody, S7Area,
        S7Pdu, S7VarSpec, SetupCommParams, WireDecode, MAX_BYTE_ADDRESS,
    },
    optimizer::paginate,
    telegram::{read_response_data, write_response_status},
};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use std::{
    sync::atomic::{AtomicU16, Ordering},
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{watch, Mutex},
    time::timeout,
};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Read/write overhead around one item's data inside a PDU (WriteVar is the larger)
const ITEM_PDU_OVERHEAD: u16 = 28;

/// Reject regions reaching past the last addressable byte.
fn check_region(start: u32, len: u32) -> Result<()> {
    if u64::from(start) + u64::from(len) > u64::from(MAX_BYTE_ADDRESS) + 1 {
        return Err(Error::ErrInvalidParam(format!(
            "region of {len} bytes at {start} exceeds byte address {MAX_BYTE_ADDRESS}"
        )));
    }
    Ok(())
}

/// Established connection and what was negotiated on it.
#[derive(Debug)]
struct Transport {
    framed: Framed<TcpStream, Codec>,
    negotiated: SetupCommParams,
}

/// S7 session over one TCP connection.
///
/// The transport sits behind a mutex; holding it is what keeps a single exchange
/// in flight. Any transport failure drops the connection and publishes
/// `Disconnected`, the caller decides whether to reconnect.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    transport: Mutex<Option<Transport>>,
    lifecycle_tx: watch::Sender<SessionLifecycleState>,
    lifecycle_rx: watch::Receiver<SessionLifecycleState>,
    /// Monotonic PDU reference in [1..=65535]; only advanced under the transport lock
    pdu_ref_counter: AtomicU16,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let (lifecycle_tx, lifecycle_rx) = watch::channel(SessionLifecycleState::Disconnected);
        Self {
            config,
            transport: Mutex::new(None),
            lifecycle_tx,
            lifecycle_rx,
            pdu_ref_counter: AtomicU16::new(0),
        }
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get a lifecycle watch receiver clone.
    pub fn lifecycle(&self) -> watch::Receiver<SessionLifecycleState> {
        self.lifecycle_rx.clone()
    }

    #[inline]
    pub fn current_lifecycle(&self) -> SessionLifecycleState {
        *self.lifecycle_rx.borrow()
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.current_lifecycle() == SessionLifecycleState::Ready
    }

    /// Wait until lifecycle reaches the expected state. Returns false if the
    /// lifecycle channel is closed before reaching it.
    pub async fn wait_for_state(&self, expected: SessionLifecycleState) -> bool {
        let mut rx = self.lifecycle();
        let reached = rx.wait_for(|s| *s == expected).await.is_ok();
        reached
    }

    /// PDU length agreed in Setup Communication, if connected.
    pub async fn negotiated_pdu_size(&self) -> Option<u16> {
        self.transport
            .lock()
            .await
            .as_ref()
            .map(|t| t.negotiated.pdu_len)
    }

    #[inline]
    fn publish(&self, state: SessionLifecycleState) {
        self.lifecycle_tx.send_replace(state);
    }

    /// Generate next PDU reference in range [1..=65535] with wrap-around.
    #[inline]
    fn next_pdu_ref(&self) -> u16 {
        let next = match self.pdu_ref_counter.load(Ordering::Relaxed).wrapping_add(1) {
            0 => 1,
            n => n,
        };
        self.pdu_ref_counter.store(next, Ordering::Relaxed);
        next
    }

    /// Open TCP, run COTP CR/CC and Setup Communication. No-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.transport.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        match self.establish().await {
            Ok(transport) => {
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    pdu_len = transport.negotiated.pdu_len,
                    amq_caller = transport.negotiated.amq_caller,
                    amq_callee = transport.negotiated.amq_callee,
                    "S7 session ready"
                );
                *slot = Some(transport);
                self.publish(SessionLifecycleState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.config.host, port = self.config.port, error = %e, "S7 connect failed");
                self.publish(SessionLifecycleState::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<Transport> {
        self.publish(SessionLifecycleState::Connecting);
        let addr = (self.config.host.as_str(), self.config.port);
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ErrConnectTimeout)??;
        stream.set_nodelay(self.config.tcp_nodelay)?;
        let mut framed = Framed::new(stream, Codec);

        self.publish(SessionLifecycleState::Handshaking);
        let cc = handshake::iso_connect(&mut framed, &self.config).await?;
        debug!(tpdu_size = ?cc.tpdu_size_bytes(), dst_tsap = cc.dst_tsap, "COTP connection confirmed");
        let negotiated = handshake::negotiation(&mut framed, &self.config, self.next_pdu_ref()).await?;
        Ok(Transport { framed, negotiated })
    }

    /// Close the socket. Safe to call when not connected.
    pub async fn disconnect(&self) {
        let mut slot = self.transport.lock().await;
        if let Some(mut transport) = slot.take() {
            // Best effort; the socket is dropped either way
            let _ = transport.framed.close().await;
            info!(host = %self.config.host, port = self.config.port, "S7 session closed");
        }
        self.publish(SessionLifecycleState::Disconnected);
    }

    /// Largest item data per request under both the configured and negotiated limits.
    fn max_chunk(&self, transport: &Transport) -> u32 {
        let by_pdu = transport.negotiated.pdu_len.saturating_sub(ITEM_PDU_OVERHEAD);
        u32::from(self.config.max_item_bytes.min(by_pdu).max(1))
    }

    /// Send one job and wait for its answer.
    ///
    /// Any failure on the wire, a timeout included, drops the transport: a late
    /// answer would otherwise be taken for the next request's.
    async fn exchange(
        &self,
        slot: &mut Option<Transport>,
        io_timeout: Duration,
        build: impl FnOnce(u16) -> Result<S7Pdu>,
    ) -> Result<S7Pdu> {
        let transport = slot.as_mut().ok_or(Error::ErrNotActive)?;
        let pdu_ref = self.next_pdu_ref();
        let request = build(pdu_ref)?;
        let function = request.function();
        debug!(pdu_ref, ?function, "S7 request");

        let result = async {
            timeout(io_timeout, transport.framed.send(build_data_message(request)))
                .await
                .map_err(|_| Error::ErrRequestTimeout)??;
            let response = timeout(io_timeout, recv_pdu(&mut transport.framed))
                .await
                .map_err(|_| Error::ErrRequestTimeout)??;
            if response.header.pdu_ref != pdu_ref {
                return Err(Error::ErrUnexpectedPdu);
            }
            Ok(response)
        }
        .await;

        match result {
            Ok(response) => {
                debug!(pdu_ref, error_code = ?response.header.error_code, "S7 response");
                Ok(response)
            }
            Err(e) => {
                warn!(pdu_ref, error = %e, "S7 exchange failed, dropping connection");
                slot.take();
                self.publish(SessionLifecycleState::Disconnected);
                Err(e)
            }
        }
    }

    async fn read_chunk(
        &self,
        slot: &mut Option<Transport>,
        spec: S7VarSpec,
    ) -> Result<Bytes> {
        let response = self
            .exchange(slot, self.config.read_timeout, |r| build_read_var(r, &[spec]))
            .await?;
        read_response_data(&response, spec.byte_len())
    }

    async fn write_chunk(
        &self,
        slot: &mut Option<Transport>,
        spec: S7VarSpec,
        data: &[u8],
    ) -> Result<()> {
        let response = self
            .exchange(slot, self.config.write_timeout, |r| {
                build_write_var(r, &[(spec, data)])
            })
            .await?;
        write_response_status(&response, 1)
    }

    /// Read exactly the bytes one variable specification selects.
    pub async fn read_spec(&self, spec: &S7VarSpec) -> Result<Bytes> {
        let mut slot = self.transport.lock().await;
        self.read_chunk(&mut slot, *spec).await
    }

    /// Read `len` bytes starting at `start`, split into item-sized requests.
    pub async fn read_area(&self, area: S7Area, db_number: u16, start: u32, len: u32) -> Result<Bytes> {
        check_region(start, len)?;
        let mut slot = self.transport.lock().await;
        let max_chunk = match slot.as_ref() {
            Some(t) => self.max_chunk(t),
            None => return Err(Error::ErrNotActive),
        };
        let mut out = BytesMut::with_capacity(len as usize);
        for (chunk_start, chunk_len) in paginate(start, len, max_chunk) {
            // chunk_len <= max_chunk <= u16::MAX
            let spec = S7VarSpec::bytes(area, db_number, chunk_start, chunk_len as u16);
            let bytes = self.read_chunk(&mut slot, spec).await?;
            out.extend_from_slice(&bytes);
        }
        Ok(out.freeze())
    }

    /// Write `data` starting at `start`, split into item-sized requests.
    pub async fn write_area(&self, area: S7Area, db_number: u16, start: u32, data: &[u8]) -> Result<()> {
        let mut slot = self.transport.lock().await;
        let max_chunk = match slot.as_ref() {
            Some(t) => self.max_chunk(t),
            None => return Err(Error::ErrNotActive),
        };
        let len = u32::try_from(data.len())
            .map_err(|_| Error::ErrInvalidParam("write data too long".into()))?;
        check_region(start, len)?;
        for (chunk_start, chunk_len) in paginate(start, len, max_chunk) {
            let from = (chunk_start - start) as usize;
            let chunk = &data[from..from + chunk_len as usize];
            let spec = S7VarSpec::bytes(area, db_number, chunk_start, chunk_len as u16);
            self.write_chunk(&mut slot, spec, chunk).await?;
        }
        Ok(())
    }

    /// Write the encoded value of one address. Bits are written alone, never as their byte.
    pub async fn write_item(&self, address: &S7Address, data: &[u8]) -> Result<()> {
        if address.is_bit() {
            let spec = S7VarSpec::try_from(address)?;
            let mut slot = self.transport.lock().await;
            return self.write_chunk(&mut slot, spec, data).await;
        }
        self.write_area(
            address.area.wire_code(),
            address.db_number,
            address.byte_address,
            data,
        )
        .await
    }
}

/// Receive the next complete S7 PDU, joining COTP segments.
pub(super) async fn recv_pdu(framed: &mut Framed<TcpStream, Codec>) -> Result<S7Pdu> {
    let mut segments = BytesMut::new();
    loop {
        let msg = framed.next().await.ok_or(Error::ErrUseClosedConnection)??;
        match (msg.cotp, msg.app) {
            (Cotp::D(_), Some(S7AppBody::Parsed(pdu))) if segments.is_empty() => return Ok(pdu),
            (Cotp::D(params), Some(S7AppBody::Parsed(pdu))) => {
                segments.extend_from_slice(&pdu.into_bytes());
                if params.eot {
                    return parse_joined(segments.freeze());
                }
            }
            (Cotp::D(params), Some(S7AppBody::Segmented(part))) => {
                segments.extend_from_slice(&part);
                if params.eot {
                    return parse_joined(segments.freeze());
                }
            }
            (Cotp::D(_), None) => {}
            (Cotp::Dr(_), _) => return Err(Error::ErrUseClosedConnection),
            _ => return Err(Error::ErrUnexpectedPdu),
        }
    }
}

fn parse_joined(joined: Bytes) -> Result<S7Pdu> {
    let (_rest, pdu) = S7Pdu::parse(&joined, &joined, &())?;
    Ok(pdu)
}
