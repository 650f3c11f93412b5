use crate::protocol::{
    error::{Error, Result},
    frame::{default_tsap_pair, CpuType, TsapPair},
};
use ng_s7_sdk::ConnectionPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TsapConfig {
    RackSlot { rack: u8, slot: u8 },
    Tsap { src: u16, dst: u16 },
}

impl Default for TsapConfig {
    fn default() -> Self {
        TsapConfig::RackSlot { rack: 0, slot: 1 }
    }
}

/// Byte order of multi-byte values inside PLC memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    BigEndian,
    LittleEndian,
}

/// PLC endpoint and protocol settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S7ClientConfig {
    /// Remote host
    pub host: String,
    /// Remote port (default 102)
    #[serde(default = "S7ClientConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub cpu: CpuType,
    #[serde(default)]
    pub tsap: TsapConfig,
    /// PDU size proposed in Setup Communication; the PLC may answer smaller
    #[serde(default = "S7ClientConfig::default_pdu_size")]
    pub preferred_pdu_size: u16,
    #[serde(default = "S7ClientConfig::default_amq")]
    pub preferred_amq_caller: u16,
    #[serde(default = "S7ClientConfig::default_amq")]
    pub preferred_amq_callee: u16,
    /// Largest byte count moved by a single read or write item
    #[serde(default = "S7ClientConfig::default_max_item_bytes")]
    pub max_item_bytes: u16,
    #[serde(default)]
    pub endianness: Endianness,
    #[serde(default)]
    pub connection: ConnectionPolicy,
}

impl S7ClientConfig {
    fn default_port() -> u16 {
        102
    }
    fn default_pdu_size() -> u16 {
        480
    }
    fn default_amq() -> u16 {
        8
    }
    fn default_max_item_bytes() -> u16 {
        180
    }

    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: Self::default_port(),
            cpu: CpuType::default(),
            tsap: TsapConfig::default(),
            preferred_pdu_size: Self::default_pdu_size(),
            preferred_amq_caller: Self::default_amq(),
            preferred_amq_callee: Self::default_amq(),
            max_item_bytes: Self::default_max_item_bytes(),
            endianness: Endianness::default(),
            connection: ConnectionPolicy::default(),
        }
    }

    #[inline]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Local/remote TSAP, either explicit or derived from CPU family and rack/slot.
    pub fn tsap_pair(&self) -> Result<TsapPair> {
        match self.tsap {
            TsapConfig::RackSlot { rack, slot } => default_tsap_pair(self.cpu, rack, slot),
            TsapConfig::Tsap { src, dst } => Ok(TsapPair::new(src, dst)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfiguration("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfiguration("port must not be 0".into()));
        }
        if self.max_item_bytes == 0 {
            return Err(Error::InvalidConfiguration(
                "maxItemBytes must be positive".into(),
            ));
        }
        if self.preferred_pdu_size < 240 {
            return Err(Error::InvalidConfiguration(format!(
                "preferredPduSize {} is below the S7 minimum of 240",
                self.preferred_pdu_size
            )));
        }
        self.tsap_pair().map(|_| ())
    }
}
