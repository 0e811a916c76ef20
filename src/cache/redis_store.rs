// src/cache/redis_store.rs
use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::AsyncCommands;

use crate::cache::CacheStore;
use crate::error::{PipelineError, PipelineResult};

/// Redis-backed store. Every command is bounded by `op_timeout`.
#[derive(Clone)]
pub struct RedisStore<C = ConnectionManager> {
    conn: C,
    op_timeout: Duration,
}

impl RedisStore<ConnectionManager> {
    pub async fn connect(url: &str, op_timeout: Duration) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).with_context(|| format!("invalid redis url {url}"))?;
        let conn = tokio::time::timeout(op_timeout * 2, client.get_connection_manager())
            .await
            .context("redis connect timed out")?
            .context("connecting to redis")?;
        tracing::info!(url, "redis connected");
        Ok(Self::with_connection(conn, op_timeout))
    }
}

impl<C> RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Wrap an already-open connection.
    pub fn with_connection(conn: C, op_timeout: Duration) -> Self {
        Self { conn, op_timeout }
    }

    /// Store-wide eviction policy (`CONFIG SET maxmemory-policy`). Best effort:
    /// managed Redis often refuses CONFIG, which is logged and ignored.
    pub async fn apply_eviction_policy(&self, policy: &str) {
        if policy.is_empty() {
            return;
        }
        let mut conn = self.conn.clone();
        let res: PipelineResult<()> = self
            .bounded(async move {
                redis::cmd("CONFIG")
                    .arg("SET")
                    .arg("maxmemory-policy")
                    .arg(policy)
                    .query_async(&mut conn)
                    .await
            })
            .await;
        match res {
            Ok(()) => tracing::info!(policy, "redis eviction policy applied"),
            Err(e) => tracing::warn!(policy, error = %e, "could not set redis eviction policy"),
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> PipelineResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res.map_err(PipelineError::from),
            Err(_) => Err(PipelineError::Cache(format!(
                "redis command timed out after {} ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl<C> CacheStore for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> PipelineResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.get(key).await }).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> PipelineResult<()> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs().max(1);
        self.bounded(async move { conn.set_ex(key, value, secs).await })
            .await
    }

    async fn delete(&self, key: &str) -> PipelineResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self.bounded(async move { conn.del(key).await }).await?;
        Ok(removed > 0)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use redis::{Cmd, ErrorKind, RedisError, RedisFuture, RedisResult, Value};

    use super::*;

    /// Answers commands from a scripted queue and records what was sent.
    #[derive(Clone, Default)]
    struct ScriptedConn {
        replies: Arc<Mutex<VecDeque<RedisResult<Value>>>>,
        sent: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    impl ScriptedConn {
        fn replying(replies: impl IntoIterator<Item = RedisResult<Value>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into_iter().collect())),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ConnectionLike for ScriptedConn {
        fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
            self.sent
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&cmd.get_packed_command()).into_owned());
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Ok(Value::Nil));
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                reply
            })
        }

        fn req_packed_commands<'a>(
            &'a mut self,
            _cmd: &'a redis::Pipeline,
            _offset: usize,
            _count: usize,
        ) -> RedisFuture<'a, Vec<Value>> {
            Box::pin(async { Err(RedisError::from((ErrorKind::ClientError, "no pipelining"))) })
        }

        fn get_db(&self) -> i64 {
            0
        }
    }

    fn store(conn: &ScriptedConn) -> RedisStore<ScriptedConn> {
        RedisStore::with_connection(conn.clone(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn get_decodes_bulk_strings_and_nil() {
        let conn = ScriptedConn::replying([Ok(Value::BulkString(b"<html/>".to_vec())), Ok(Value::Nil)]);
        let s = store(&conn);

        assert_eq!(s.get("Star_Wars").await.unwrap().as_deref(), Some("<html/>"));
        assert_eq!(s.get("Dune").await.unwrap(), None);
        assert!(conn.sent()[0].contains("GET\r\n$9\r\nStar_Wars"));
    }

    #[tokio::test]
    async fn sub_second_ttl_is_sent_as_one_second() {
        let conn = ScriptedConn::replying([Ok(Value::Okay)]);
        store(&conn)
            .set_ex("page", "body", Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(
            conn.sent(),
            vec!["*4\r\n$5\r\nSETEX\r\n$4\r\npage\r\n$1\r\n1\r\n$4\r\nbody\r\n".to_string()]
        );
    }

    #[tokio::test]
    async fn delete_reports_whether_a_key_was_removed() {
        let conn = ScriptedConn::replying([Ok(Value::Int(1)), Ok(Value::Int(0))]);
        let s = store(&conn);
        assert!(s.delete("page").await.unwrap());
        assert!(!s.delete("page").await.unwrap());
    }

    #[tokio::test]
    async fn slow_commands_time_out_as_transient_cache_errors() {
        let conn = ScriptedConn {
            delay: Duration::from_millis(500),
            ..ScriptedConn::default()
        };
        let err = store(&conn).get("page").await.unwrap_err();
        assert_eq!(err.kind(), "cache");
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out after 50 ms"), "{err}");
    }

    #[tokio::test]
    async fn server_errors_map_to_cache_errors() {
        let conn = ScriptedConn::replying([Err(RedisError::from((
            ErrorKind::ResponseError,
            "OOM command not allowed",
        )))]);
        let err = store(&conn).set_ex("page", "body", Duration::from_secs(60)).await.unwrap_err();
        assert_eq!(err.kind(), "cache");
        assert!(err.to_string().contains("OOM"), "{err}");
    }

    #[tokio::test]
    async fn refused_config_set_leaves_store_usable() {
        let conn = ScriptedConn::replying([
            Err(RedisError::from((ErrorKind::ResponseError, "unknown command 'CONFIG'"))),
            Ok(Value::BulkString(b"cached".to_vec())),
        ]);
        let s = store(&conn);
        s.apply_eviction_policy("allkeys-lru").await;

        let sent = conn.sent();
        assert!(sent[0].contains("CONFIG") && sent[0].contains("maxmemory-policy"));
        assert!(sent[0].contains("allkeys-lru"));
        assert_eq!(s.get("page").await.unwrap().as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn empty_policy_sends_nothing() {
        let conn = ScriptedConn::default();
        store(&conn).apply_eviction_policy("").await;
        assert!(conn.sent().is_empty());
    }
}
