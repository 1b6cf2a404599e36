//! Redis-compatible store client speaking RESP2 over TCP.

use std::future::Future;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::resp::{encode_command, read_reply, RespValue};
use super::{ResultStore, StoreConfig, StoreError, StoreValue};

type Connection = BufStream<TcpStream>;

/// Redis client that opens a fresh connection for each operation.
///
/// Every operation (connect, optional `SELECT`, the command itself) is bounded by
/// [`StoreConfig::timeout`]. There is no connection reuse and no retry: the poller
/// and the worker each issue at most one operation at a time per call site.
///
/// # Example
///
/// ```no_run
/// use monofn_common::store::{RedisStore, ResultStore, StoreConfig};
///
/// # async fn example() -> Result<(), monofn_common::store::StoreError> {
/// let store = RedisStore::new(StoreConfig::default().with_host("127.0.0.1"));
/// store.ping().await?;
/// store.write("monofn-output", r#"{"requestId":"r1"}"#).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedisStore {
    config: StoreConfig,
    list_window: usize,
}

impl RedisStore {
    /// Default number of list elements fetched by [`ResultStore::read`]
    pub const DEFAULT_LIST_WINDOW: usize = 1000;

    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            list_window: Self::DEFAULT_LIST_WINDOW,
        }
    }

    /// Limits list reads to the newest `window` elements.
    pub fn with_list_window(mut self, window: usize) -> Self {
        self.list_window = window.max(1);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Runs `op` on a fresh connection under the configured timeout.
    async fn with_connection<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.config.timeout;
        let work = async {
            let conn = self.connect().await?;
            op(conn).await
        };
        tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
    }

    async fn connect(&self) -> Result<Connection, StoreError> {
        let addr = self.config.addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| StoreError::Connection {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        let mut conn = BufStream::new(stream);

        if self.config.db != 0 {
            let db = self.config.db.to_string();
            expect_ok(command(&mut conn, &[b"SELECT", db.as_bytes()]).await?)?;
        }
        debug!(%addr, db = self.config.db, "Connected to store");
        Ok(conn)
    }
}

/// Sends one command and reads its reply, turning error replies into [`StoreError::Server`].
async fn command(conn: &mut Connection, args: &[&[u8]]) -> Result<RespValue, StoreError> {
    conn.write_all(&encode_command(args)).await?;
    conn.flush().await?;
    match read_reply(conn).await? {
        RespValue::Error(message) => Err(StoreError::Server(message)),
        reply => Ok(reply),
    }
}

/// Sends `commands` in a single write and reads one reply per command. Error
/// replies are returned as values.
async fn pipeline(conn: &mut Connection, commands: &[&[&[u8]]]) -> Result<Vec<RespValue>, StoreError> {
    let mut buf = Vec::new();
    for args in commands {
        buf.extend_from_slice(&encode_command(args));
    }
    conn.write_all(&buf).await?;
    conn.flush().await?;

    let mut replies = Vec::with_capacity(commands.len());
    for _ in commands {
        replies.push(read_reply(conn).await?);
    }
    Ok(replies)
}

/// Interprets the replies to `MULTI`, `RPUSH`, `LTRIM`, `EXEC`.
///
/// The record is stored once RPUSH succeeded. A failed trim only leaves the list
/// longer than `max_len` and is logged, not reported.
fn append_outcome(key: &str, replies: Vec<RespValue>) -> Result<(), StoreError> {
    let [multi, push, trim, exec] = <[RespValue; 4]>::try_from(replies)
        .map_err(|r| StoreError::Protocol(format!("expected 4 replies to append, got {}", r.len())))?;

    let (push, trim) = match multi {
        RespValue::Simple(ref s) if s == "OK" => match exec {
            RespValue::Array(Some(results)) => <[RespValue; 2]>::try_from(results)
                .map(|[push, trim]| (push, trim))
                .map_err(|r| {
                    StoreError::Protocol(format!("expected 2 results from EXEC, got {}", r.len()))
                })?,
            RespValue::Error(message) => return Err(StoreError::Server(message)),
            other => {
                return Err(StoreError::Protocol(format!(
                    "expected array reply to EXEC, got {:?}",
                    other
                )))
            }
        },
        // No transaction: RPUSH and LTRIM ran as they arrived.
        _ => (push, trim),
    };

    match push {
        RespValue::Error(message) => return Err(StoreError::Server(message)),
        other => {
            expect_integer(other)?;
        }
    }
    match trim {
        RespValue::Simple(ref s) if s == "OK" => {}
        other => warn!(%key, reply = ?other, "Result appended but list was not trimmed"),
    }
    Ok(())
}

fn expect_ok(reply: RespValue) -> Result<(), StoreError> {
    match reply {
        RespValue::Simple(ref s) if s == "OK" => Ok(()),
        other => Err(StoreError::Protocol(format!("expected +OK, got {:?}", other))),
    }
}

fn expect_integer(reply: RespValue) -> Result<i64, StoreError> {
    match reply {
        RespValue::Integer(i) => Ok(i),
        other => Err(StoreError::Protocol(format!("expected integer, got {:?}", other))),
    }
}

#[async_trait]
impl ResultStore for RedisStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.with_connection(|mut conn| async move {
            expect_ok(command(&mut conn, &[b"SET", key.as_bytes(), value.as_bytes()]).await?)
        })
        .await
    }

    async fn append(&self, key: &str, value: &str, max_len: usize) -> Result<(), StoreError> {
        let start = format!("-{}", max_len.max(1));
        self.with_connection(|mut conn| async move {
            let multi: &[&[u8]] = &[b"MULTI"];
            let push: &[&[u8]] = &[b"RPUSH", key.as_bytes(), value.as_bytes()];
            let trim: &[&[u8]] = &[b"LTRIM", key.as_bytes(), start.as_bytes(), b"-1"];
            let exec: &[&[u8]] = &[b"EXEC"];
            let replies = pipeline(&mut conn, &[multi, push, trim, exec]).await?;
            append_outcome(key, replies)
        })
        .await
    }

    async fn read(&self, key: &str) -> Result<Option<StoreValue>, StoreError> {
        let start = format!("-{}", self.list_window);
        self.with_connection(|mut conn| async move {
            let kind = command(&mut conn, &[b"TYPE", key.as_bytes()])
                .await?
                .into_string()?
                .unwrap_or_default();

            match kind.as_str() {
                "none" => Ok(None),
                "string" => {
                    let value = command(&mut conn, &[b"GET", key.as_bytes()])
                        .await?
                        .into_string()?;
                    Ok(value.map(StoreValue::Single))
                }
                "list" => {
                    let reply =
                        command(&mut conn, &[b"LRANGE", key.as_bytes(), start.as_bytes(), b"-1"])
                            .await?;
                    let items = match reply {
                        RespValue::Array(Some(items)) => items,
                        RespValue::Array(None) => Vec::new(),
                        other => {
                            return Err(StoreError::Protocol(format!(
                                "expected array reply to LRANGE, got {:?}",
                                other
                            )))
                        }
                    };
                    let mut values = Vec::with_capacity(items.len());
                    for item in items {
                        if let Some(s) = item.into_string()? {
                            values.push(s);
                        }
                    }
                    Ok(Some(StoreValue::List(values)))
                }
                other => Err(StoreError::UnexpectedType {
                    key: key.to_string(),
                    found: other.to_string(),
                }),
            }
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_connection(|mut conn| async move {
            match command(&mut conn, &[b"PING"]).await? {
                RespValue::Simple(ref s) if s == "PONG" => Ok(()),
                other => Err(StoreError::Protocol(format!("expected +PONG, got {:?}", other))),
            }
        })
        .await
    }
}
