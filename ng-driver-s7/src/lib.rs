pub mod client;
pub mod codec;
pub mod protocol;
pub mod types;

pub use client::{BatchReadResult, BatchWriteResult, S7Client};
pub use codec::S7Codec;
pub use protocol::{
    error::{Error, ErrorCode, ErrorKind, Result},
    frame::{
        addr::{parse_s7_address, parse_s7_addresses, S7Address, S7AreaKind, S7Unit},
        CpuType, S7DataType, S7DataValue,
    },
    optimizer::{optimize, paginate, AddressBlock, BlockKey, OptimizerConfig},
    session::{Session, SessionConfig, SessionLifecycleState},
    telegram::{
        build_read_request, build_write_request, check_write_response, extract_area_bytes,
        extract_value, parse_response_header, ResponseHeader,
    },
};
pub use types::{Endianness, S7ClientConfig, TsapConfig};

pub use ng_s7_sdk::{ConnectionMode, ConnectionPolicy, RetryPolicy};
