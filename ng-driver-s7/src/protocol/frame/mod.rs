pub mod addr;
mod builder;
pub mod comm;
pub mod cotp;
pub mod item;
mod pdu;
pub mod tpkt;
pub mod tsap;
pub mod types;

pub use ng_s7_sdk::{WireDecode, WireEncode};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Body of a COTP Data TPDU.
#[derive(Debug, Clone)]
pub enum S7AppBody {
    /// Segment of a PDU split over several TPDUs (EOT not set); the session reassembles it.
    Segmented(bytes::Bytes),
    /// Complete S7 PDU
    Parsed(S7Pdu),
}

/// One frame on the wire: TPKT, COTP and, for Data TPDUs, the application body.
#[derive(Debug, Clone)]
pub struct S7Message {
    pub tpkt: Tpkt,
    pub cotp: Cotp,
    pub app: Option<S7AppBody>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize_repr, Deserialize_repr)]
#[repr(i16)]
pub enum CpuType {
    S7200 = 0,
    S7200Smart = 1,
    S7300 = 2,
    S7400 = 3,
    #[default]
    S71200 = 4,
    S71500 = 5,
    Logo0BA8 = 6,
}

pub use addr::{parse_s7_address, parse_s7_addresses, S7Address, S7AreaKind, S7Unit};
pub use builder::{
    build_cotp_cc_message, build_cotp_cr_message, build_data_message, build_message_from_cotp,
    build_read_var, build_read_var_response, build_setup_comm, build_setup_comm_response,
    build_write_var, build_write_var_response, SetupCommParams,
};
pub use comm::S7Header;
pub use cotp::{Cotp, CotpConnParams, CotpDataParams, CotpDrParams};
pub use item::{
    parse_data_items, parse_return_codes, parse_var_specs, S7DataItem, S7VarSpec, MAX_BYTE_ADDRESS,
};
pub use pdu::S7Pdu;
pub use tpkt::Tpkt;
pub use tsap::{default_tsap_pair, Tsap, TsapPair};
pub use types::{
    CotpType, S7Area, S7DataType, S7DataValue, S7DataVariableType, S7Function, S7PduType,
    S7ReturnCode, S7TransportSize,
};
