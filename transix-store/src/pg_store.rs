use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use transix_domain::{
    PassengerRecord, Payment, Reservation, ReservationStatus, Seat, Trip, TripStatus,
};
use transix_engine::{
    EngineError, NewReservation, PassengerDirectory, PendingLock, ReservationStore,
};

/// Durable store backed by Postgres. The schema is owned externally; the
/// active-reservation uniqueness is enforced here inside the creating
/// transaction and backstopped by the partial unique index
/// `uq_reservations_active_seat` on (trip_id, seat_id) where status is
/// pending or confirmed.
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> EngineError {
    EngineError::StoreUnavailable(e.to_string())
}

fn insert_err(e: sqlx::Error) -> EngineError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505")
            && db.constraint() == Some("uq_reservations_active_seat")
        {
            return EngineError::AlreadyReserved;
        }
    }
    EngineError::StoreUnavailable(e.to_string())
}

fn trip_status(s: &str) -> Result<TripStatus, EngineError> {
    match s {
        "scheduled" => Ok(TripStatus::Scheduled),
        "boarding" => Ok(TripStatus::Boarding),
        "departed" => Ok(TripStatus::Departed),
        "arrived" => Ok(TripStatus::Arrived),
        "cancelled" => Ok(TripStatus::Cancelled),
        other => Err(EngineError::StoreUnavailable(format!(
            "unknown trip status: {other}"
        ))),
    }
}

fn reservation_status(s: &str) -> Result<ReservationStatus, EngineError> {
    match s {
        "pending" => Ok(ReservationStatus::Pending),
        "confirmed" => Ok(ReservationStatus::Confirmed),
        "cancelled" => Ok(ReservationStatus::Cancelled),
        "expired" => Ok(ReservationStatus::Expired),
        other => Err(EngineError::StoreUnavailable(format!(
            "unknown reservation status: {other}"
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    vehicle_id: Uuid,
    origin: String,
    destination: String,
    departure_time: DateTime<Utc>,
    price_amount: i32,
    price_currency: String,
    status: String,
}

impl TripRow {
    fn into_trip(self) -> Result<Trip, EngineError> {
        Ok(Trip {
            id: self.id,
            vehicle_id: self.vehicle_id,
            origin: self.origin,
            destination: self.destination,
            departure_time: self.departure_time,
            price_amount: self.price_amount,
            price_currency: self.price_currency,
            status: trip_status(&self.status)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    trip_id: Uuid,
    seat_id: Uuid,
    passenger_id: Uuid,
    passenger_phone: String,
    status: String,
    reserved_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    payment_reference: Option<String>,
    total_amount: i32,
    currency: String,
    pnr_code: String,
}

impl ReservationRow {
    fn into_reservation(self) -> Result<Reservation, EngineError> {
        Ok(Reservation {
            id: self.id,
            trip_id: self.trip_id,
            seat_id: self.seat_id,
            passenger_id: self.passenger_id,
            passenger_phone: self.passenger_phone,
            status: reservation_status(&self.status)?,
            reserved_at: self.reserved_at,
            expires_at: self.expires_at,
            payment_reference: self.payment_reference,
            total_amount: self.total_amount,
            currency: self.currency,
            pnr_code: self.pnr_code,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    vehicle_id: Uuid,
    seat_number: String,
    row_number: i32,
    seat_letter: String,
    is_window: bool,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            id: row.id,
            vehicle_id: row.vehicle_id,
            seat_number: row.seat_number,
            row_number: row.row_number,
            seat_letter: row.seat_letter,
            is_window: row.is_window,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    first_name: String,
    last_name: String,
}

const TRIP_COLUMNS: &str =
    "id, vehicle_id, origin, destination, departure_time, price_amount, price_currency, status";
const RESERVATION_COLUMNS: &str = "id, trip_id, seat_id, passenger_id, passenger_phone, status, \
     reserved_at, expires_at, payment_reference, total_amount, currency, pnr_code";

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, EngineError> {
        let row: Option<TripRow> =
            sqlx::query_as(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1"))
                .bind(trip_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(TripRow::into_trip).transpose()
    }

    async fn seats_for_vehicle(&self, vehicle_id: Uuid) -> Result<Vec<Seat>, EngineError> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT id, vehicle_id, seat_number, row_number, seat_letter, is_window \
             FROM seats WHERE vehicle_id = $1 ORDER BY row_number, seat_letter",
        )
        .bind(vehicle_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Seat::from).collect())
    }

    async fn active_seat_ids(&self, trip_id: Uuid) -> Result<HashSet<Uuid>, EngineError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT seat_id FROM reservations \
             WHERE trip_id = $1 AND status IN ('pending', 'confirmed')",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(ids.into_iter().collect())
    }

    async fn reservation_code_exists(&self, code: &str) -> Result<bool, EngineError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM reservations WHERE pnr_code = $1)")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn create_reservation(&self, new: &NewReservation) -> Result<Reservation, EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Row-lock the trip to serialize concurrent commit attempts for it;
        // the price snapshot is read under the same lock.
        let trip: Option<TripRow> = sqlx::query_as(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE id = $1 FOR UPDATE"
        ))
        .bind(new.trip_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let trip = trip
            .ok_or_else(|| EngineError::InvalidState("unknown trip".into()))?
            .into_trip()?;

        let seat_ok: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM seats WHERE id = $1 AND vehicle_id = $2)",
        )
        .bind(new.seat_id)
        .bind(trip.vehicle_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if !seat_ok {
            return Err(EngineError::InvalidState(
                "seat does not belong to the trip's vehicle".into(),
            ));
        }

        let conflict: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations \
             WHERE trip_id = $1 AND seat_id = $2 AND status IN ('pending', 'confirmed'))",
        )
        .bind(new.trip_id)
        .bind(new.seat_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        if conflict {
            return Err(EngineError::AlreadyReserved);
        }

        let reservation = Reservation {
            id: Uuid::new_v4(),
            trip_id: new.trip_id,
            seat_id: new.seat_id,
            passenger_id: new.passenger_id,
            passenger_phone: new.passenger_phone.clone(),
            status: ReservationStatus::Pending,
            reserved_at: new.reserved_at,
            expires_at: new.expires_at,
            payment_reference: None,
            total_amount: trip.price_amount,
            currency: trip.price_currency.clone(),
            pnr_code: new.pnr_code.clone(),
        };

        sqlx::query(
            "INSERT INTO reservations \
             (id, trip_id, seat_id, passenger_id, passenger_phone, status, reserved_at, \
              expires_at, total_amount, currency, pnr_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(reservation.id)
        .bind(reservation.trip_id)
        .bind(reservation.seat_id)
        .bind(reservation.passenger_id)
        .bind(&reservation.passenger_phone)
        .bind(reservation.status.as_str())
        .bind(reservation.reserved_at)
        .bind(reservation.expires_at)
        .bind(reservation.total_amount)
        .bind(&reservation.currency)
        .bind(&reservation.pnr_code)
        .execute(&mut *tx)
        .await
        .map_err(insert_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(reservation)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>, EngineError> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn lock_pending(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<PendingLock, EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        let mut reservation = row
            .ok_or(EngineError::ReservationNotFound)?
            .into_reservation()?;

        if reservation.status != ReservationStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "reservation is {}",
                reservation.status.as_str()
            )));
        }

        if now > reservation.expires_at {
            sqlx::query("UPDATE reservations SET status = 'expired' WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.commit().await.map_err(db_err)?;
            reservation.status = ReservationStatus::Expired;
            return Ok(PendingLock::Expired(reservation));
        }

        tx.commit().await.map_err(db_err)?;
        Ok(PendingLock::Ready(reservation))
    }

    async fn record_payment(&self, payment: &Payment) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Status-guarded confirm: if a sweep expired the reservation between
        // the settlement call and here, zero rows change and we refuse.
        let updated = sqlx::query(
            "UPDATE reservations SET status = 'confirmed', payment_reference = $2 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(payment.reservation_id)
        .bind(&payment.transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if updated == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM reservations WHERE id = $1")
                    .bind(payment.reservation_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;
            return match status {
                None => Err(EngineError::ReservationNotFound),
                Some(status) => Err(EngineError::InvalidState(format!(
                    "reservation is {status}"
                ))),
            };
        }

        sqlx::query(
            "INSERT INTO payments \
             (id, reservation_id, amount, currency, method, status, transaction_id, paid_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(payment.id)
        .bind(payment.reservation_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, EngineError> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE status = 'pending' AND expires_at < $1 ORDER BY reserved_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter()
            .map(ReservationRow::into_reservation)
            .collect()
    }

    async fn mark_expired(&self, ids: &[Uuid]) -> Result<u64, EngineError> {
        let updated = sqlx::query(
            "UPDATE reservations SET status = 'expired' \
             WHERE id = ANY($1) AND status = 'pending'",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        Ok(updated)
    }
}

/// Identity lookup against the externally managed users table.
pub struct PgPassengerDirectory {
    pool: PgPool,
}

impl PgPassengerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PassengerDirectory for PgPassengerDirectory {
    async fn resolve(&self, passenger_id: Uuid) -> Result<Option<PassengerRecord>, EngineError> {
        let row: Option<PassengerRow> =
            sqlx::query_as("SELECT id, first_name, last_name FROM users WHERE id = $1")
                .bind(passenger_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(|row| PassengerRecord {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
        }))
    }
}
