//! Implementación Postgres (Diesel) de `fsm_core::StateStore`.
//!
//! Objetivo:
//! - Persistencia durable con la misma semántica que `InMemoryStateStore`:
//!   upsert por `(tenant_id, run_id, name)`, puntero `state_status` que
//!   siempre referencia la última fila escrita.
//! - Atomicidad entrada+puntero dentro de una única transacción
//!   (`build_transaction().read_write()`), igual que el resto de los
//!   backends de este árbol de crates.
//! - Reintentos con backoff ante errores transitorios (deadlocks,
//!   desconexiones) en lectura y escritura.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use fsm_core::constants::{INITIAL_STATE, MAX_RETRY_ERROR, TERMINAL_STATE};
use fsm_core::{RunId, StateEntry, StateError, StateStore};
use log::warn;
use serde_json::Value;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{state_entry, state_status};

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones, para poder testear sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

#[derive(Queryable, Debug, Clone)]
struct StateEntryRow {
    id: i64,
    tenant_id: String,
    run_id: String,
    name: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    params: Value,
    visit_count: i32,
    errors: Value,
    yielded: bool,
}

impl StateEntryRow {
    fn into_entry(self) -> StateEntry {
        let errors: Vec<StateError> = serde_json::from_value(self.errors).unwrap_or_default();
        StateEntry { id: Some(self.id.to_string()),
                      tenant_id: self.tenant_id,
                      run_id: self.run_id,
                      name: self.name,
                      start_time: self.start_time,
                      end_time: self.end_time,
                      params: self.params,
                      visit_count: self.visit_count as u32,
                      errors,
                      yielded: self.yielded }
    }
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = state_entry)]
struct NewStateEntryRow<'a> {
    tenant_id: &'a str,
    run_id: &'a str,
    name: &'a str,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    params: &'a Value,
    visit_count: i32,
    errors: Value,
    yielded: bool,
}

fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict | PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {e:?} -> sleeping {delay_ms}ms", attempts + 1);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn point_status(conn: &mut PgConnection,
                 tenant_id: &str,
                 entry_id: i64,
                 state_name: &str)
                 -> Result<(), diesel::result::Error> {
    diesel::insert_into(state_status::table).values((state_status::tenant_id.eq(tenant_id),
                                                       state_status::last_state_id.eq(entry_id),
                                                       state_status::update_time.eq(Utc::now()),
                                                       state_status::ref_state_name.eq(state_name)))
                                             .on_conflict(state_status::tenant_id)
                                             .do_update()
                                             .set((state_status::last_state_id.eq(entry_id),
                                                   state_status::update_time.eq(Utc::now()),
                                                   state_status::ref_state_name.eq(state_name)))
                                             .execute(conn)?;
    Ok(())
}

/// Implementación `StateStore` respaldada por Postgres, particionada por
/// `tenant_id`. Cada instancia sirve exactamente un tenant (ver §5: el
/// motor nunca ejecuta dos `run` concurrentes contra el mismo store).
pub struct PgStateStore<P: ConnectionProvider> {
    provider: P,
    tenant_id: String,
}

impl<P: ConnectionProvider> PgStateStore<P> {
    pub fn new(provider: P, tenant_id: impl Into<String>) -> Self {
        Self { provider, tenant_id: tenant_id.into() }
    }

    fn upsert_entry(&self,
                     conn: &mut PgConnection,
                     name: &str,
                     run_id: &str,
                     start_time: DateTime<Utc>,
                     end_time: DateTime<Utc>,
                     params: &Value,
                     visit_count: i32,
                     errors: Value,
                     yielded: bool)
                     -> Result<StateEntryRow, diesel::result::Error> {
        let row = NewStateEntryRow { tenant_id: &self.tenant_id,
                                      run_id,
                                      name,
                                      start_time,
                                      end_time,
                                      params,
                                      visit_count,
                                      errors,
                                      yielded };
        diesel::insert_into(state_entry::table).values(&row)
                                                .on_conflict((state_entry::tenant_id, state_entry::run_id, state_entry::name))
                                                .do_update()
                                                .set(&row)
                                                .get_result(conn)
    }
}

impl<P: ConnectionProvider> StateStore for PgStateStore<P> {
    type Error = PersistenceError;

    fn get_last_state(&mut self) -> Result<Option<StateEntry>, Self::Error> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            let joined: Option<StateEntryRow> =
                state_status::table.filter(state_status::tenant_id.eq(&self.tenant_id))
                                    .inner_join(state_entry::table)
                                    .select((state_entry::id,
                                             state_entry::tenant_id,
                                             state_entry::run_id,
                                             state_entry::name,
                                             state_entry::start_time,
                                             state_entry::end_time,
                                             state_entry::params,
                                             state_entry::visit_count,
                                             state_entry::errors,
                                             state_entry::yielded))
                                    .first(&mut conn)
                                    .optional()
                                    .map_err(PersistenceError::from)?;
            Ok(joined.map(StateEntryRow::into_entry))
        })
    }

    fn new_initial_state(&mut self) -> Result<StateEntry, Self::Error> {
        let now = Utc::now();
        Ok(StateEntry { id: None,
                         tenant_id: self.tenant_id.clone(),
                         run_id: Uuid::new_v4().to_string(),
                         name: INITIAL_STATE.to_string(),
                         start_time: now,
                         end_time: now,
                         params: Value::Object(Default::default()),
                         visit_count: 1,
                         errors: Vec::new(),
                         yielded: false })
    }

    fn save_state(&mut self, entry: &mut StateEntry) -> Result<(), Self::Error> {
        let tenant_id = self.tenant_id.clone();
        let saved = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx_conn| -> Result<StateEntryRow, diesel::result::Error> {
                    let row = self.upsert_entry(tx_conn,
                                                 &entry.name,
                                                 &entry.run_id,
                                                 entry.start_time,
                                                 entry.end_time,
                                                 &entry.params,
                                                 entry.visit_count as i32,
                                                 serde_json::to_value(&entry.errors).unwrap_or_default(),
                                                 entry.yielded)?;
                    point_status(tx_conn, &tenant_id, row.id, &row.name)?;
                    Ok(row)
                })
                .map_err(PersistenceError::from)
        })?;
        *entry = saved.into_entry();
        Ok(())
    }

    fn yield_state(&mut self, entry: &mut StateEntry, is_yielded: bool) -> Result<(), Self::Error> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::update(state_entry::table.filter(state_entry::tenant_id
                                                                    .eq(&self.tenant_id)
                                                                    .and(state_entry::run_id.eq(&entry.run_id))
                                                                    .and(state_entry::name.eq(&entry.name)))).set(state_entry::yielded
                                                                                                                   .eq(is_yielded))
                                                                                                              .execute(&mut conn)
                                                                                                              .map_err(PersistenceError::from)?;
            Ok(())
        })?;
        entry.yielded = is_yielded;
        Ok(())
    }

    fn find_state(&mut self, state_name: &str, run_id: &str) -> Result<Option<StateEntry>, Self::Error> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            let row: Option<StateEntryRow> =
                state_entry::table.filter(state_entry::tenant_id
                                                       .eq(&self.tenant_id)
                                                       .and(state_entry::run_id.eq(run_id))
                                                       .and(state_entry::name.eq(state_name)))
                                  .first(&mut conn)
                                  .optional()
                                  .map_err(PersistenceError::from)?;
            Ok(row.map(StateEntryRow::into_entry))
        })
    }

    fn set_current_state(&mut self,
                          state_name: &str,
                          run_id: &str,
                          err: Option<&str>,
                          params: Value,
                          start_time: DateTime<Utc>,
                          end_time: DateTime<Utc>)
                          -> Result<(), Self::Error> {
        let tenant_id = self.tenant_id.clone();
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx_conn| -> Result<(), diesel::result::Error> {
                    let existing: Option<StateEntryRow> =
                        state_entry::table.filter(state_entry::tenant_id
                                                               .eq(&tenant_id)
                                                               .and(state_entry::run_id.eq(run_id))
                                                               .and(state_entry::name.eq(state_name)))
                                          .for_update()
                                          .first(tx_conn)
                                          .optional()?;

                    let (visit_count, errors) = match existing {
                        Some(row) => {
                            let mut errs: Vec<StateError> = serde_json::from_value(row.errors).unwrap_or_default();
                            let visit_count = row.visit_count + 1;
                            if let Some(e) = err {
                                errs.push(StateError { error: e.to_string(), visit_idx: visit_count as u32 });
                            }
                            (visit_count, serde_json::to_value(&errs).unwrap_or_default())
                        }
                        None => {
                            let errs: Vec<StateError> = err.map(|e| vec![StateError { error: e.to_string(), visit_idx: 1 }])
                                                            .unwrap_or_default();
                            (1, serde_json::to_value(&errs).unwrap_or_default())
                        }
                    };

                    let row = self.upsert_entry(tx_conn, state_name, run_id, start_time, end_time, &params, visit_count, errors, false)?;
                    point_status(tx_conn, &tenant_id, row.id, state_name)?;
                    Ok(())
                })
                .map_err(PersistenceError::from)
        })
    }

    fn terminate(&mut self, run_id: &str) -> Result<(), Self::Error> {
        let tenant_id = self.tenant_id.clone();
        let now = Utc::now();
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx_conn| -> Result<(), diesel::result::Error> {
                    let errors = vec![StateError { error: MAX_RETRY_ERROR.to_string(), visit_idx: 1 }];
                    let row = self.upsert_entry(tx_conn,
                                                 TERMINAL_STATE,
                                                 run_id,
                                                 now,
                                                 now,
                                                 &Value::Object(Default::default()),
                                                 1,
                                                 serde_json::to_value(&errors).unwrap_or_default(),
                                                 false)?;
                    point_status(tx_conn, &tenant_id, row.id, TERMINAL_STATE)?;
                    Ok(())
                })
                .map_err(PersistenceError::from)
        })
    }

    fn get_db_history(&mut self) -> Result<Vec<StateEntry>, Self::Error> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            let rows: Vec<StateEntryRow> =
                state_entry::table.filter(state_entry::tenant_id.eq(&self.tenant_id))
                                  .order(state_entry::id.asc())
                                  .load(&mut conn)
                                  .map_err(PersistenceError::from)?;
            Ok(rows.into_iter().map(StateEntryRow::into_entry).collect())
        })
    }
}

/// Construye un pool Postgres r2d2 a partir de una URL y corre las
/// migraciones pendientes en el primer checkout.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1).max(validated_min);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración y construye un
/// pool ya migrado más el `tenant_id` a usar.
pub fn build_dev_pool_from_env() -> Result<(PgPool, String), PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    let pool = build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)?;
    Ok((pool, cfg.tenant_id))
}
