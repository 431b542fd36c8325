//! Documentos Mongo, en camelCase (ver decisión de casing por backend).
//!
//! Colecciones: `fsm_log` (una entrada por `(tenantId, runId, name)`) y
//! `fsm_status` (puntero, una fila por tenant).

use bson::oid::ObjectId;
use bson::DateTime as BsonDateTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fsm_core::{StateEntry, StateError};

use crate::error::MongoStoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateErrorDoc {
    pub error: String,
    #[serde(rename = "visitIdx")]
    pub visit_idx: i32,
}

impl From<&StateError> for StateErrorDoc {
    fn from(e: &StateError) -> Self {
        Self { error: e.error.clone(), visit_idx: e.visit_idx as i32 }
    }
}

impl From<StateErrorDoc> for StateError {
    fn from(d: StateErrorDoc) -> Self {
        StateError { error: d.error, visit_idx: d.visit_idx as u32 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntryDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "runId")]
    pub run_id: String,
    pub name: String,
    #[serde(rename = "startTime")]
    pub start_time: BsonDateTime,
    #[serde(rename = "endTime")]
    pub end_time: BsonDateTime,
    pub params: serde_json::Value,
    #[serde(rename = "visitCount")]
    pub visit_count: i32,
    pub errors: Vec<StateErrorDoc>,
    pub yielded: bool,
}

impl StateEntryDoc {
    pub fn into_entry(self) -> StateEntry {
        StateEntry { id: self.id.map(|oid| oid.to_hex()),
                      tenant_id: self.tenant_id,
                      run_id: self.run_id,
                      name: self.name,
                      start_time: DateTime::<Utc>::from(self.start_time),
                      end_time: DateTime::<Utc>::from(self.end_time),
                      params: self.params,
                      visit_count: self.visit_count as u32,
                      errors: self.errors.into_iter().map(StateError::from).collect(),
                      yielded: self.yielded }
    }

    pub fn from_entry(entry: &StateEntry) -> Result<Self, MongoStoreError> {
        Ok(Self { id: None,
                   tenant_id: entry.tenant_id.clone(),
                   run_id: entry.run_id.clone(),
                   name: entry.name.clone(),
                   start_time: BsonDateTime::from_chrono(entry.start_time),
                   end_time: BsonDateTime::from_chrono(entry.end_time),
                   params: entry.params.clone(),
                   visit_count: entry.visit_count as i32,
                   errors: entry.errors.iter().map(StateErrorDoc::from).collect(),
                   yielded: entry.yielded })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateStatusDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "lastStateId")]
    pub last_state_id: ObjectId,
    #[serde(rename = "updateTime")]
    pub update_time: BsonDateTime,
    #[serde(rename = "refStateName")]
    pub ref_state_name: String,
}
