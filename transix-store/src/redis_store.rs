use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use tracing::warn;
use uuid::Uuid;

use transix_domain::SeatStatusRecord;
use transix_engine::{EngineError, SeatLockStore, SnapshotCache};

/// Compare-owner-and-set: take the hold if nobody owns it or the caller
/// already does, refreshing the TTL. Single round trip, atomic on the
/// server, so there is no check-then-set race.
const ACQUIRE_SCRIPT: &str = r#"
local owner = redis.call('GET', KEYS[1])
if not owner or owner == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[1], 'EX', tonumber(ARGV[2]))
    return 1
end
return 0
"#;

/// Delete the hold only when the caller owns it.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

fn redis_err(e: redis::RedisError) -> EngineError {
    EngineError::StoreUnavailable(e.to_string())
}

fn hold_key(trip_id: Uuid, seat_id: Uuid) -> String {
    format!("seat_lock:{trip_id}:{seat_id}")
}

fn reservation_lock_key(reservation_id: Uuid) -> String {
    format!("reservation_lock:{reservation_id}")
}

fn snapshot_key(trip_id: Uuid) -> String {
    format!("trip_seats:{trip_id}")
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<MultiplexedConnection, EngineError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)
    }

    /// Fixed-window counter used by the gateway's fail-open rate limiter.
    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

#[async_trait]
impl SeatLockStore for RedisClient {
    async fn acquire(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        session: &str,
        ttl: Duration,
    ) -> Result<bool, EngineError> {
        let mut conn = self.conn().await?;
        let granted: i32 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(hold_key(trip_id, seat_id))
            .arg(session)
            .arg(ttl.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(granted == 1)
    }

    async fn release(
        &self,
        trip_id: Uuid,
        seat_id: Uuid,
        session: &str,
    ) -> Result<bool, EngineError> {
        let mut conn = self.conn().await?;
        let removed: i32 = redis::Script::new(RELEASE_SCRIPT)
            .key(hold_key(trip_id, seat_id))
            .arg(session)
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(removed == 1)
    }

    async fn purge(&self, trip_id: Uuid, seat_id: Uuid) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(hold_key(trip_id, seat_id))
            .await
            .map_err(redis_err)
    }

    async fn owner(&self, trip_id: Uuid, seat_id: Uuid) -> Result<Option<String>, EngineError> {
        let mut conn = self.conn().await?;
        conn.get(hold_key(trip_id, seat_id))
            .await
            .map_err(redis_err)
    }

    async fn locked_seats(&self, trip_id: Uuid) -> Result<HashSet<Uuid>, EngineError> {
        let mut conn = self.conn().await?;
        let pattern = format!("seat_lock:{trip_id}:*");
        let mut seats = HashSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;

            for key in keys {
                match key.rsplit(':').next().map(Uuid::parse_str) {
                    Some(Ok(seat_id)) => {
                        seats.insert(seat_id);
                    }
                    _ => warn!(%key, "skipping malformed seat lock key"),
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(seats)
    }

    async fn set_reservation_lock(
        &self,
        reservation_id: Uuid,
        ttl: Duration,
    ) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(
            reservation_lock_key(reservation_id),
            reservation_id.to_string(),
            ttl.as_secs(),
        )
        .await
        .map_err(redis_err)
    }

    async fn clear_reservation_lock(&self, reservation_id: Uuid) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(reservation_lock_key(reservation_id))
            .await
            .map_err(redis_err)
    }
}

#[async_trait]
impl SnapshotCache for RedisClient {
    async fn get(&self, trip_id: Uuid) -> Result<Option<Vec<SeatStatusRecord>>, EngineError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(snapshot_key(trip_id)).await.map_err(redis_err)?;
        match raw {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(seats) => Ok(Some(seats)),
                Err(e) => {
                    // Corrupt entry: treat as a miss, the caller recomputes.
                    warn!(%trip_id, error = %e, "dropping unreadable seat snapshot");
                    Ok(None)
                }
            },
        }
    }

    async fn put(
        &self,
        trip_id: Uuid,
        seats: &[SeatStatusRecord],
        ttl: Duration,
    ) -> Result<(), EngineError> {
        let payload = serde_json::to_string(seats)
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(snapshot_key(trip_id), payload, ttl.as_secs())
            .await
            .map_err(redis_err)
    }

    async fn invalidate(&self, trip_id: Uuid) -> Result<(), EngineError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(snapshot_key(trip_id))
            .await
            .map_err(redis_err)
    }
}
