//! Implementación del backend de documentos (`mongodb` sync client) de
//! `fsm_core::StateStore`.
//!
//! Usa el cliente sync del driver oficial para respetar el modelo de
//! concurrencia del motor (§5: de un solo hilo, bloqueante). No hay
//! transacciones multi-documento aquí: cada upsert de `fsm_log` y el
//! puntero en `fsm_status` se hacen como dos escrituras separadas,
//! ordenadas con la entrada primero y el puntero al final, tal como exige
//! el contrato de la tienda para backends no transaccionales.

use bson::doc;
use bson::oid::ObjectId;
use chrono::Utc;
use mongodb::sync::{Client, Collection, Database};
use serde_json::Value;

use fsm_core::constants::{INITIAL_STATE, MAX_RETRY_ERROR, TERMINAL_STATE};
use fsm_core::{StateEntry, StateError, StateStore};

use crate::config::MongoConfig;
use crate::error::MongoStoreError;
use crate::models::{StateEntryDoc, StateStatusDoc};

const LOG_COLLECTION: &str = "fsm_log";
const STATUS_COLLECTION: &str = "fsm_status";

pub struct MongoStateStore {
    database: Database,
    tenant_id: String,
}

impl MongoStateStore {
    pub fn connect(cfg: &MongoConfig) -> Result<Self, MongoStoreError> {
        let client = Client::with_uri_str(&cfg.uri)?;
        let database = client.database(&cfg.database);
        Ok(Self { database, tenant_id: cfg.tenant_id.clone() })
    }

    pub fn new(database: Database, tenant_id: impl Into<String>) -> Self {
        Self { database, tenant_id: tenant_id.into() }
    }

    fn log(&self) -> Collection<StateEntryDoc> {
        self.database.collection(LOG_COLLECTION)
    }

    fn status(&self) -> Collection<StateStatusDoc> {
        self.database.collection(STATUS_COLLECTION)
    }

    fn upsert_log(&self, doc: &StateEntryDoc) -> Result<ObjectId, MongoStoreError> {
        let filter = doc! { "tenantId": &self.tenant_id, "runId": &doc.run_id, "name": &doc.name };
        let update = doc! { "$set": bson::to_document(doc)? };
        let options = mongodb::options::FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(mongodb::options::ReturnDocument::After)
            .build();
        let saved = self.log()
                         .find_one_and_update(filter, update, options)?
                         .expect("upsert with return_document(After) always yields a document");
        Ok(saved.id.expect("persisted document always has an _id"))
    }

    fn point_status(&self, entry_id: ObjectId, state_name: &str) -> Result<(), MongoStoreError> {
        let filter = doc! { "tenantId": &self.tenant_id };
        let update = doc! { "$set": {
            "lastStateId": entry_id,
            "updateTime": bson::DateTime::from_chrono(Utc::now()),
            "refStateName": state_name,
        } };
        let options = mongodb::options::FindOneAndUpdateOptions::builder().upsert(true).build();
        self.status().find_one_and_update(filter, update, options)?;
        Ok(())
    }
}

impl StateStore for MongoStateStore {
    type Error = MongoStoreError;

    fn get_last_state(&mut self) -> Result<Option<StateEntry>, Self::Error> {
        let status = self.status().find_one(doc! { "tenantId": &self.tenant_id }, None)?;
        let Some(status) = status else { return Ok(None) };
        let entry = self.log().find_one(doc! { "_id": status.last_state_id }, None)?;
        Ok(entry.map(StateEntryDoc::into_entry))
    }

    fn new_initial_state(&mut self) -> Result<StateEntry, Self::Error> {
        let now = Utc::now();
        Ok(StateEntry { id: None,
                         tenant_id: self.tenant_id.clone(),
                         run_id: ObjectId::new().to_hex(),
                         name: INITIAL_STATE.to_string(),
                         start_time: now,
                         end_time: now,
                         params: Value::Object(Default::default()),
                         visit_count: 1,
                         errors: Vec::new(),
                         yielded: false })
    }

    fn save_state(&mut self, entry: &mut StateEntry) -> Result<(), Self::Error> {
        let doc = StateEntryDoc::from_entry(entry)?;
        let id = self.upsert_log(&doc)?;
        self.point_status(id, &entry.name)?;
        entry.id = Some(id.to_hex());
        Ok(())
    }

    fn yield_state(&mut self, entry: &mut StateEntry, is_yielded: bool) -> Result<(), Self::Error> {
        let filter = doc! { "tenantId": &self.tenant_id, "runId": &entry.run_id, "name": &entry.name };
        let update = doc! { "$set": { "yielded": is_yielded } };
        self.log().update_one(filter, update, None)?;
        entry.yielded = is_yielded;
        Ok(())
    }

    fn find_state(&mut self, state_name: &str, run_id: &str) -> Result<Option<StateEntry>, Self::Error> {
        let filter = doc! { "tenantId": &self.tenant_id, "runId": run_id, "name": state_name };
        let found = self.log().find_one(filter, None)?;
        Ok(found.map(StateEntryDoc::into_entry))
    }

    fn set_current_state(&mut self,
                          state_name: &str,
                          run_id: &str,
                          err: Option<&str>,
                          params: Value,
                          start_time: chrono::DateTime<Utc>,
                          end_time: chrono::DateTime<Utc>)
                          -> Result<(), Self::Error> {
        let existing = self.find_state(state_name, run_id)?;
        let (visit_count, errors): (u32, Vec<StateError>) = match existing {
            Some(entry) => {
                let mut errors = entry.errors;
                let visit_count = entry.visit_count + 1;
                if let Some(e) = err {
                    errors.push(StateError { error: e.to_string(), visit_idx: visit_count });
                }
                (visit_count, errors)
            }
            None => {
                let errors = err.map(|e| vec![StateError { error: e.to_string(), visit_idx: 1 }]).unwrap_or_default();
                (1, errors)
            }
        };
        let entry = StateEntry { id: None,
                                  tenant_id: self.tenant_id.clone(),
                                  run_id: run_id.to_string(),
                                  name: state_name.to_string(),
                                  start_time,
                                  end_time,
                                  params,
                                  visit_count,
                                  errors,
                                  yielded: false };
        let doc = StateEntryDoc::from_entry(&entry)?;
        let id = self.upsert_log(&doc)?;
        self.point_status(id, state_name)?;
        Ok(())
    }

    fn terminate(&mut self, run_id: &str) -> Result<(), Self::Error> {
        let now = Utc::now();
        let entry = StateEntry { id: None,
                                  tenant_id: self.tenant_id.clone(),
                                  run_id: run_id.to_string(),
                                  name: TERMINAL_STATE.to_string(),
                                  start_time: now,
                                  end_time: now,
                                  params: Value::Object(Default::default()),
                                  visit_count: 1,
                                  errors: vec![StateError { error: MAX_RETRY_ERROR.to_string(), visit_idx: 1 }],
                                  yielded: false };
        let doc = StateEntryDoc::from_entry(&entry)?;
        let id = self.upsert_log(&doc)?;
        self.point_status(id, TERMINAL_STATE)?;
        Ok(())
    }

    fn get_db_history(&mut self) -> Result<Vec<StateEntry>, Self::Error> {
        let filter = doc! { "tenantId": &self.tenant_id };
        let options = mongodb::options::FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.log().find(filter, options)?;
        let mut out = Vec::new();
        for doc in cursor {
            out.push(doc?.into_entry());
        }
        Ok(out)
    }
}
