use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};

/// Custom epoch: 2024-01-01T00:00:00Z in milliseconds since Unix epoch.
const ECHO_EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;

struct State {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit snowflake ID generator for chat messages.
///
/// Layout (MSB → LSB):
/// - Bits 63–22: Timestamp (42 bits), ms since the Echo epoch
/// - Bits 21–12: Worker ID (10 bits)
/// - Bits 11–0:  Sequence (12 bits), per-ms counter
///
/// IDs are strictly increasing per generator, so ordering by ID is ordering
/// by creation time.
pub struct SnowflakeGenerator {
    worker_id: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    /// Create a generator. Worker IDs above 1023 are masked into range.
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: u64::from(worker_id & MAX_WORKER_ID),
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // A clock that steps backwards keeps issuing from the last seen ms.
        let mut now_ms = current_ms().max(state.last_ms);

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                while now_ms <= state.last_ms {
                    now_ms = current_ms();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;

        let ts = now_ms.saturating_sub(ECHO_EPOCH_MS);
        let id = (ts << (WORKER_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence;

        id as i64
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(ECHO_EPOCH_MS)
}

/// Extract the creation timestamp (ms since Unix epoch) from a snowflake ID.
pub fn snowflake_timestamp_ms(id: i64) -> u64 {
    let ts = (id as u64) >> (WORKER_BITS + SEQUENCE_BITS);
    ts + ECHO_EPOCH_MS
}

/// Creation time of a snowflake ID as a UTC datetime.
pub fn snowflake_datetime(id: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(snowflake_timestamp_ms(id) as i64)
        .single()
}
