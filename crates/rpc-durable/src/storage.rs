use std::collections::BTreeMap;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::DurableError;

/// A durable call's persisted state: enough to resend or to invoke its
/// callback on completion, and to survive a process restart in between.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingCall {
    pub id: String,
    pub method: String,
    pub params: Value,
    pub callback: String,
    pub sent_at_ms: i64,
    pub timeout_at_ms: i64,
}

/// Synchronous, transactional-per-call storage for durable calls. Every
/// operation commits (or visibly fails) before returning — no operation here
/// is allowed to leave a call half-written, since a crash between `save` and
/// `send` must always recover to "call is still pending".
pub trait SyncPendingCallStorage: Send + Sync {
    fn save(&self, call: PendingCall) -> Result<(), DurableError>;
    fn get(&self, id: &str) -> Result<Option<PendingCall>, DurableError>;
    fn delete(&self, id: &str) -> Result<bool, DurableError>;
    /// All calls with `timeout_at_ms <= before_ms`, ascending by `timeout_at_ms`.
    fn list_expired(&self, before_ms: i64) -> Result<Vec<PendingCall>, DurableError>;
    /// All calls, ascending by `sent_at_ms`.
    fn list_all(&self) -> Result<Vec<PendingCall>, DurableError>;
    fn clear(&self) -> Result<(), DurableError>;
}

/// In-process reference implementation; state does not survive restart.
#[derive(Default)]
pub struct MemoryPendingCallStorage {
    calls: Mutex<BTreeMap<String, PendingCall>>,
}

impl MemoryPendingCallStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncPendingCallStorage for MemoryPendingCallStorage {
    fn save(&self, call: PendingCall) -> Result<(), DurableError> {
        self.calls.lock().unwrap().insert(call.id.clone(), call);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<PendingCall>, DurableError> {
        Ok(self.calls.lock().unwrap().get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool, DurableError> {
        Ok(self.calls.lock().unwrap().remove(id).is_some())
    }

    fn list_expired(&self, before_ms: i64) -> Result<Vec<PendingCall>, DurableError> {
        let mut expired: Vec<PendingCall> = self
            .calls
            .lock()
            .unwrap()
            .values()
            .filter(|call| call.timeout_at_ms <= before_ms)
            .cloned()
            .collect();
        expired.sort_by_key(|call| call.timeout_at_ms);
        Ok(expired)
    }

    fn list_all(&self) -> Result<Vec<PendingCall>, DurableError> {
        let mut all: Vec<PendingCall> = self.calls.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|call| call.sent_at_ms);
        Ok(all)
    }

    fn clear(&self) -> Result<(), DurableError> {
        self.calls.lock().unwrap().clear();
        Ok(())
    }
}

/// Encodes/decodes the `params` column so the SQL backend can store the
/// arbitrary `Value` payload as text under a configurable codec.
pub trait ParamsCodec: Send + Sync {
    fn encode(&self, params: &Value) -> String;
    fn decode(&self, text: &str) -> Value;
}

#[derive(Default)]
pub struct JsonParamsCodec;

impl ParamsCodec for JsonParamsCodec {
    fn encode(&self, params: &Value) -> String {
        params.to_string()
    }

    fn decode(&self, text: &str) -> Value {
        serde_json::from_str(text).unwrap_or(Value::Null)
    }
}

/// SQL-backed storage (see the `_rpc_pending_calls` schema). Schema creation
/// is lazy: the table and index are created on first use, not at open time
/// beyond the connection itself.
pub struct SqlitePendingCallStorage {
    conn: Mutex<Connection>,
    codec: Box<dyn ParamsCodec>,
}

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS _rpc_pending_calls (
  id         TEXT PRIMARY KEY NOT NULL,
  method     TEXT NOT NULL,
  params     TEXT NOT NULL,
  callback   TEXT NOT NULL,
  sent_at    INTEGER NOT NULL,
  timeout_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx__rpc_pending_calls_timeout
  ON _rpc_pending_calls(timeout_at);
";

impl SqlitePendingCallStorage {
    pub fn open(path: &str) -> Result<Self, DurableError> {
        Self::open_with_codec(path, Box::new(JsonParamsCodec))
    }

    pub fn open_with_codec(path: &str, codec: Box<dyn ParamsCodec>) -> Result<Self, DurableError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(Self {
            conn: Mutex::new(conn),
            codec,
        })
    }

    fn row_to_call(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingCall> {
        let params_text: String = row.get(2)?;
        Ok(PendingCall {
            id: row.get(0)?,
            method: row.get(1)?,
            params: self.codec.decode(&params_text),
            callback: row.get(3)?,
            sent_at_ms: row.get(4)?,
            timeout_at_ms: row.get(5)?,
        })
    }
}

impl SyncPendingCallStorage for SqlitePendingCallStorage {
    fn save(&self, call: PendingCall) -> Result<(), DurableError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO _rpc_pending_calls
                (id, method, params, callback, sent_at, timeout_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                call.id,
                call.method,
                self.codec.encode(&call.params),
                call.callback,
                call.sent_at_ms,
                call.timeout_at_ms,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<PendingCall>, DurableError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, method, params, callback, sent_at, timeout_at
             FROM _rpc_pending_calls WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(self.row_to_call(row)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, id: &str) -> Result<bool, DurableError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute("DELETE FROM _rpc_pending_calls WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    fn list_expired(&self, before_ms: i64) -> Result<Vec<PendingCall>, DurableError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, method, params, callback, sent_at, timeout_at
             FROM _rpc_pending_calls WHERE timeout_at <= ?1 ORDER BY timeout_at ASC",
        )?;
        let rows = stmt.query_map(params![before_ms], |row| self.row_to_call(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DurableError::from)
    }

    fn list_all(&self) -> Result<Vec<PendingCall>, DurableError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, method, params, callback, sent_at, timeout_at
             FROM _rpc_pending_calls ORDER BY sent_at ASC",
        )?;
        let rows = stmt.query_map([], |row| self.row_to_call(row))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(DurableError::from)
    }

    fn clear(&self) -> Result<(), DurableError> {
        self.conn
            .lock()
            .unwrap()
            .execute("DELETE FROM _rpc_pending_calls", [])?;
        Ok(())
    }
}
