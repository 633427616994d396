use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::{Direction, OdmError};

/// 12-byte document identifier: 4-byte seconds timestamp, 5 process-random
/// bytes and a 3-byte counter, all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    pub const LEN: usize = 12;

    pub fn new() -> Self {
        let seconds = Utc::now().timestamp() as u32;
        let process = PROCESS_UNIQUE.get_or_init(|| {
            let random = uuid::Uuid::new_v4();
            let mut bytes = [0u8; 5];
            bytes.copy_from_slice(&random.as_bytes()[..5]);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| {
                let seed = uuid::Uuid::new_v4().as_u128() as u32;
                AtomicU32::new(seed & 0x00ff_ffff)
            })
            .fetch_add(1, Ordering::SeqCst)
            & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn parse_str(s: &str) -> Result<Self, OdmError> {
        let invalid = || OdmError::invalid_value("objectId", &s, Direction::ToPersisted);
        if s.len() != 24 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// True when `s` is exactly 24 hex characters.
    pub fn is_valid_hex(s: &str) -> bool {
        s.len() == 24 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    pub fn timestamp_seconds(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = OdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}
