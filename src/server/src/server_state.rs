use crate::database_state::DatabaseState;
use common::QuarryError;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Server-wide state: every open database plus which client is connected
/// to which database.
pub struct ServerState {
    /// Directory holding one subdirectory per database.
    pub base_path: PathBuf,
    /// Maps database id to DatabaseState.
    pub id_to_db: RwLock<HashMap<u64, Arc<DatabaseState>>>,
    /// Maps client id to the database id it is connected to.
    pub active_connections: RwLock<HashMap<u64, u64>>,
}

impl ServerState {
    /// Create the server state, loading every database found under the
    /// base path.
    pub fn new(base_path: PathBuf) -> Result<Self, QuarryError> {
        fs::create_dir_all(&base_path)?;
        let server_state = ServerState {
            base_path,
            id_to_db: RwLock::new(HashMap::new()),
            active_connections: RwLock::new(HashMap::new()),
        };
        debug!("Looking for databases in {:?}", server_state.base_path);
        for entry in fs::read_dir(&server_state.base_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if DatabaseState::exists(&server_state.base_path, &name) {
                info!("Loading database {:?}", name);
                let db_state =
                    Arc::new(DatabaseState::open_from_dir(&server_state.base_path, &name)?);
                server_state
                    .id_to_db
                    .write()
                    .unwrap()
                    .insert(db_state.id, db_state);
            }
        }
        Ok(server_state)
    }

    fn get_db_id_from_db_name(&self, db_name: &str) -> Result<u64, QuarryError> {
        let map_ref = self.id_to_db.read().unwrap();
        for (db_id, db_state) in map_ref.iter() {
            if db_state.name == db_name {
                return Ok(*db_id);
            }
        }
        Err(QuarryError::ValidationError(format!(
            "Database {} not found",
            db_name
        )))
    }

    /// Names of all open databases.
    pub fn database_names(&self) -> Vec<String> {
        let map_ref = self.id_to_db.read().unwrap();
        let mut names: Vec<String> = map_ref.values().map(|db| db.name.clone()).collect();
        names.sort();
        names
    }

    /// Creates a new database with name.
    pub fn create_database(&self, name: &str) -> Result<String, QuarryError> {
        let db_state = Arc::new(DatabaseState::new_from_name(&self.base_path, name)?);
        self.id_to_db
            .write()
            .unwrap()
            .insert(db_state.id, db_state);
        Ok(format!("Created database {:?}", name))
    }

    /// Bind a client to a database.
    pub fn connect_to_db(&self, db_name: &str, client_id: u64) -> Result<String, QuarryError> {
        let db_id = self.get_db_id_from_db_name(db_name)?;
        let map_ref = self.id_to_db.read().unwrap();
        let db_state = map_ref.get(&db_id).unwrap();
        {
            let mut connections = self.active_connections.write().unwrap();
            connections.insert(client_id, db_state.id);
        }
        db_state.register_new_client_connection(client_id);
        Ok(format!("Connected to database {:?}", db_name))
    }

    /// The database a client is connected to.
    pub fn get_connected_db(&self, client_id: u64) -> Result<Arc<DatabaseState>, QuarryError> {
        let connections = self.active_connections.read().unwrap();
        let db_id = connections.get(&client_id).ok_or_else(|| {
            QuarryError::ValidationError(String::from("No active DB or DB not found"))
        })?;
        let map_ref = self.id_to_db.read().unwrap();
        map_ref.get(db_id).cloned().ok_or_else(|| {
            QuarryError::InternalError(String::from("Connected database disappeared"))
        })
    }

    /// Resets a database to empty: drop every table.
    pub fn reset_database(&self, db_name: &str) -> Result<String, QuarryError> {
        info!("Resetting database {:?}", db_name);
        let db_id = self.get_db_id_from_db_name(db_name)?;
        let db_state = self.id_to_db.read().unwrap().get(&db_id).unwrap().clone();
        let table_names: Vec<String> = {
            let tables = db_state.database.tables.read().unwrap();
            tables.keys().cloned().collect()
        };
        for table in table_names {
            db_state.drop_table(&table)?;
        }
        Ok(String::from("Reset"))
    }

    pub fn close_client_connection(&self, client_id: u64) {
        let db_id = {
            let connections = self.active_connections.read().unwrap();
            connections.get(&client_id).copied()
        };
        match db_id {
            Some(db_id) => {
                let db_ref = self.id_to_db.read().unwrap();
                if let Some(db) = db_ref.get(&db_id) {
                    db.close_client_connection(client_id);
                }
            }
            None => {
                debug!("Client was not connected to a DB");
            }
        }
        self.active_connections.write().unwrap().remove(&client_id);
        info!("Shut down client connection with ID: {:?}", client_id);
    }

    /// Flush and close every database.
    pub fn shutdown(&self) -> Result<(), QuarryError> {
        info!("Shutting down");
        let map_ref = self.id_to_db.read().unwrap();
        for db_state in map_ref.values() {
            db_state.close()?;
        }
        Ok(())
    }
}
