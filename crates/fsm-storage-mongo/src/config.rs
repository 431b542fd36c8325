//! Carga de configuración de conexión desde variables de entorno.
//! Convención `MONGODB_URI` / `MONGODB_DATABASE` más `tenant_id`.

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub tenant_id: String,
}

impl MongoConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let uri = env::var("MONGODB_URI").expect("MONGODB_URI no definido");
        let database = env::var("MONGODB_DATABASE").unwrap_or_else(|_| "fsm".to_string());
        let tenant_id = env::var("FSM_TENANT_ID").unwrap_or_else(|_| "default".to_string());
        Self { uri, database, tenant_id }
    }
}

pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
