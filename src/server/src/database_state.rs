use crate::record_printer::{RecordPrinter, ResponseBuffer};
use common::catalog::Catalog;
use common::database::Database;
use common::ids::{ContainerId, TransactionId};
use common::table::{IndexColumn, IndexMeta, Table};
use common::{Attribute, DataType, QuarryError, QueryResult, TableSchema};
use heapstore::{BufferPool, StorageManager};
use index::{make_key, IndexManager};
use optimizer::Knobs;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock};
use txn_manager::log_manager::LogManager;
use txn_manager::transactions::{Transaction, TransactionManager};

const DB_META_NAME: &str = "db.meta";
const LOG_FILE_NAME: &str = "db.log";
const OUTPUT_FILE_NAME: &str = "output.txt";

/// One open database: its catalog, storage, indexes, transactions, log,
/// and planner knobs. All files live in one directory named after the
/// database: the metadata descriptor, one heap file per table, one index
/// file per index, and the log.
pub struct DatabaseState {
    pub id: u64,
    pub name: String,
    /// The database directory.
    pub base_dir: PathBuf,
    pub database: Database,
    pub storage_manager: Arc<StorageManager>,
    pub index_manager: Arc<IndexManager>,
    pub transaction_manager: Arc<TransactionManager>,
    pub log_manager: Arc<LogManager>,
    knobs: RwLock<Knobs>,
    next_container_id: common::ids::AtomicContainerId,
    /// Clients currently connected to this database.
    pub active_client_connections: RwLock<HashSet<u64>>,
}

impl DatabaseState {
    pub fn get_database_id(db_name: &str) -> u64 {
        let mut s = DefaultHasher::new();
        db_name.hash(&mut s);
        s.finish()
    }

    fn table_file_name(table: &str) -> String {
        format!("{}.tbl", table)
    }

    /// Whether a database directory with a descriptor exists under `base`.
    pub fn exists(base: &Path, db_name: &str) -> bool {
        base.join(db_name).join(DB_META_NAME).is_file()
    }

    fn build(base_dir: PathBuf, name: String, database: Database) -> Result<Self, QuarryError> {
        let bp = Arc::new(BufferPool::new());
        let storage_manager = Arc::new(StorageManager::new(base_dir.clone(), bp.clone())?);
        let index_manager = Arc::new(IndexManager::new(base_dir.clone(), bp));
        let transaction_manager = Arc::new(TransactionManager::new(
            storage_manager.clone(),
            index_manager.clone(),
        ));
        let log_manager = Arc::new(LogManager::new(base_dir.join(LOG_FILE_NAME))?);
        Ok(DatabaseState {
            id: Self::get_database_id(&name),
            name,
            base_dir,
            database,
            storage_manager,
            index_manager,
            transaction_manager,
            log_manager,
            knobs: RwLock::new(Knobs::default()),
            next_container_id: common::ids::AtomicContainerId::new(1),
            active_client_connections: RwLock::new(HashSet::new()),
        })
    }

    /// Create a fresh database directory with an empty catalog.
    pub fn new_from_name(base: &Path, db_name: &str) -> Result<Self, QuarryError> {
        let base_dir = base.join(db_name);
        if base_dir.join(DB_META_NAME).exists() {
            return Err(QuarryError::ValidationError(format!(
                "Database {} already exists",
                db_name
            )));
        }
        fs::create_dir_all(&base_dir)?;
        debug!("Creating new DatabaseState {:?}", base_dir);
        let state = Self::build(
            base_dir,
            db_name.to_string(),
            Database::new(db_name.to_string()),
        )?;
        state.flush_meta()?;
        Ok(state)
    }

    /// Open an existing database: load the descriptor and reopen every
    /// heap and index file it names.
    pub fn open_from_dir(base: &Path, db_name: &str) -> Result<Self, QuarryError> {
        let base_dir = base.join(db_name);
        let meta_path = base_dir.join(DB_META_NAME);
        debug!("Loading DatabaseState from {:?}", meta_path);
        let contents = fs::read_to_string(&meta_path)?;
        let database: Database = serde_json::from_str(&contents).map_err(|e| {
            QuarryError::IOError(format!("Malformed database descriptor: {}", e))
        })?;
        let state = Self::build(base_dir, db_name.to_string(), database)?;

        let mut max_cid: ContainerId = 0;
        {
            let tables = state.database.tables.read().unwrap();
            for table_ptr in tables.values() {
                let table = table_ptr.read().unwrap();
                max_cid = max_cid.max(table.container_id);
                state
                    .storage_manager
                    .open_container(table.container_id, &Self::table_file_name(&table.name))?;
                for index in table.indexes.values() {
                    max_cid = max_cid.max(index.container_id);
                    state.index_manager.open_index(index)?;
                }
            }
        }
        state
            .next_container_id
            .store(max_cid + 1, Ordering::SeqCst);
        Ok(state)
    }

    fn alloc_container_id(&self) -> ContainerId {
        self.next_container_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Persist the catalog descriptor.
    pub fn flush_meta(&self) -> Result<(), QuarryError> {
        let json = serde_json::to_string(&self.database).map_err(|e| {
            QuarryError::InternalError(format!("Cannot serialize database descriptor: {}", e))
        })?;
        fs::write(self.base_dir.join(DB_META_NAME), json)?;
        Ok(())
    }

    pub fn knobs(&self) -> Knobs {
        *self.knobs.read().unwrap()
    }

    /// `SET <knob> = <value>`.
    pub fn set_knob(&self, name: &str, value: bool) -> Result<(), QuarryError> {
        let mut knobs = self.knobs.write().unwrap();
        match name {
            "enable_output_file" => knobs.enable_output_file = value,
            "enable_nestloop" => knobs.enable_nestloop = value,
            "enable_sortmerge" => knobs.enable_sortmerge = value,
            _ => {
                return Err(QuarryError::ValidationError(format!(
                    "Unknown knob {}",
                    name
                )))
            }
        }
        if !knobs.enable_nestloop && !knobs.enable_sortmerge {
            // Leave the knobs usable: refuse the change instead.
            match name {
                "enable_nestloop" => knobs.enable_nestloop = true,
                _ => knobs.enable_sortmerge = true,
            }
            return Err(QuarryError::ValidationError(String::from(
                "At least one join executor must stay enabled",
            )));
        }
        Ok(())
    }

    /// Append a pre-rendered row block to output.txt when the knob is on.
    pub fn append_output_file(&self, content: &str) -> Result<(), QuarryError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.base_dir.join(OUTPUT_FILE_NAME))?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn register_new_client_connection(&self, client_id: u64) {
        debug!(
            "Registering new client connection: {:?} to database: {:?}",
            client_id, self.id
        );
        self.active_client_connections
            .write()
            .unwrap()
            .insert(client_id);
    }

    pub fn close_client_connection(&self, client_id: u64) {
        info!("Closing client connection: {:?}", &client_id);
        self.active_client_connections
            .write()
            .unwrap()
            .remove(&client_id);
        if self.active_client_connections.read().unwrap().is_empty() {
            if let Err(e) = self.flush_meta() {
                error!("Failed to persist db {}: {}", self.name, e);
            }
        }
    }

    /// Creates a new table.
    pub fn create_table(
        &self,
        table_name: &str,
        col_defs: &[(String, DataType)],
    ) -> Result<QueryResult, QuarryError> {
        let mut tables_ref = self.database.tables.write().unwrap();
        if tables_ref.contains_key(table_name) {
            return Err(QuarryError::ValidationError(format!(
                "Table {} already exists",
                table_name
            )));
        }
        let mut attributes: Vec<Attribute> = Vec::new();
        for (name, dtype) in col_defs {
            if attributes.iter().any(|a| &a.name == name) {
                return Err(QuarryError::ValidationError(format!(
                    "Duplicate column {}",
                    name
                )));
            }
            attributes.push(Attribute::new(table_name, name, *dtype));
        }
        let schema = TableSchema::new(attributes);
        debug!("Creating table with schema: {:?}", schema);
        let container_id = self.alloc_container_id();
        self.storage_manager
            .create_container(container_id, &Self::table_file_name(table_name))?;
        let table = Table::new(table_name.to_string(), container_id, schema);
        tables_ref.insert(table_name.to_string(), Arc::new(RwLock::new(table)));
        drop(tables_ref);
        self.flush_meta()?;
        Ok(QueryResult::new(&format!("Table {} created", table_name)))
    }

    /// Drops a table, its heap file, and all of its indexes.
    pub fn drop_table(&self, table_name: &str) -> Result<QueryResult, QuarryError> {
        let table = {
            let mut tables_ref = self.database.tables.write().unwrap();
            tables_ref.remove(table_name).ok_or_else(|| {
                QuarryError::ValidationError(format!("Table {} not found", table_name))
            })?
        };
        let table = table.read().unwrap();
        for index in table.indexes.values() {
            self.index_manager
                .destroy_index(&index.name, index.container_id)?;
        }
        self.storage_manager
            .remove_container(table.container_id, &Self::table_file_name(table_name))?;
        self.flush_meta()?;
        Ok(QueryResult::new(&format!("Table {} dropped", table_name)))
    }

    /// Creates a unique index over the column list and backfills it from
    /// the heap. A duplicate key aborts the build and removes the file.
    pub fn create_index(
        &self,
        table_name: &str,
        col_names: &[String],
    ) -> Result<QueryResult, QuarryError> {
        let table_ptr = self.database.get_table_ptr(table_name)?;
        let meta = {
            let table = table_ptr.read().unwrap();
            let index_name = IndexMeta::index_name(table_name, col_names);
            if table.indexes.contains_key(&index_name) {
                return Err(QuarryError::ValidationError(format!(
                    "Index {} already exists",
                    index_name
                )));
            }
            let mut cols = Vec::with_capacity(col_names.len());
            let mut key_len = 0;
            for col_name in col_names {
                let idx = table
                    .schema
                    .find_column(&common::ColumnRef::new("", col_name))?;
                let attr = table.schema.get_attribute(idx).unwrap();
                let len = attr.get_byte_len();
                cols.push(IndexColumn {
                    name: col_name.clone(),
                    dtype: attr.dtype(),
                    len,
                    offset: table.schema.get_offset(idx).unwrap(),
                });
                key_len += len;
            }
            IndexMeta {
                table: table_name.to_string(),
                name: index_name,
                container_id: self.alloc_container_id(),
                key_len,
                cols,
            }
        };

        let handle = self.index_manager.create_index(&meta)?;
        let table_cid = table_ptr.read().unwrap().container_id;
        let tid = TransactionId::new();
        for (rid, bytes) in self.storage_manager.get_iterator(table_cid, tid) {
            let key = make_key(&meta, &bytes);
            if handle.insert(&key, rid)?.is_none() {
                self.index_manager
                    .destroy_index(&meta.name, meta.container_id)?;
                return Err(QuarryError::DuplicateKeyError(format!(
                    "Duplicate key found while creating unique index {}",
                    meta.name
                )));
            }
        }
        handle.flush()?;

        let index_name = meta.name.clone();
        table_ptr
            .write()
            .unwrap()
            .indexes
            .insert(index_name.clone(), meta);
        self.flush_meta()?;
        Ok(QueryResult::new(&format!("Index {} created", index_name)))
    }

    /// Drops an index and its file.
    pub fn drop_index(
        &self,
        table_name: &str,
        col_names: &[String],
    ) -> Result<QueryResult, QuarryError> {
        let table_ptr = self.database.get_table_ptr(table_name)?;
        let index_name = IndexMeta::index_name(table_name, col_names);
        let meta = table_ptr
            .write()
            .unwrap()
            .indexes
            .remove(&index_name)
            .ok_or_else(|| {
                QuarryError::ValidationError(format!("Index {} not found", index_name))
            })?;
        self.index_manager
            .destroy_index(&meta.name, meta.container_id)?;
        self.flush_meta()?;
        Ok(QueryResult::new(&format!("Index {} dropped", index_name)))
    }

    /// `SHOW TABLES` output.
    pub fn show_tables(&self) -> Result<QueryResult, QuarryError> {
        let printer = RecordPrinter::new(1);
        let mut buf = ResponseBuffer::new();
        printer.print_separator(&mut buf);
        printer.print_record(&[String::from("Tables")], &mut buf);
        printer.print_separator(&mut buf);
        let mut names: Vec<String> = {
            let tables = self.database.tables.read().unwrap();
            tables.keys().cloned().collect()
        };
        names.sort();
        for name in names {
            printer.print_record(&[name], &mut buf);
        }
        printer.print_separator(&mut buf);
        Ok(QueryResult::new(&buf.into_string()))
    }

    /// `SHOW INDEX FROM t` output: `| table | unique | (col,...) |` rows.
    pub fn show_indexes(&self, table_name: &str) -> Result<QueryResult, QuarryError> {
        let table_ptr = self.database.get_table_ptr(table_name)?;
        let table = table_ptr.read().unwrap();
        let mut buf = ResponseBuffer::new();
        let mut names: Vec<&String> = table.indexes.keys().collect();
        names.sort();
        for name in names {
            let index = &table.indexes[name];
            let cols: Vec<String> = index.cols.iter().map(|c| c.name.clone()).collect();
            buf.append_unbounded(&format!(
                "| {} | unique | ({}) |\n",
                table_name,
                cols.join(",")
            ));
        }
        Ok(QueryResult::new(&buf.into_string()))
    }

    /// `DESC t` output: field, type, and whether it leads an index.
    pub fn desc_table(&self, table_name: &str) -> Result<QueryResult, QuarryError> {
        let table_ptr = self.database.get_table_ptr(table_name)?;
        let table = table_ptr.read().unwrap();
        let printer = RecordPrinter::new(3);
        let mut buf = ResponseBuffer::new();
        printer.print_separator(&mut buf);
        printer.print_record(
            &[
                String::from("Field"),
                String::from("Type"),
                String::from("Index"),
            ],
            &mut buf,
        );
        printer.print_separator(&mut buf);
        for attr in table.schema.attributes() {
            let indexed = if table.is_col_indexed(&attr.name) {
                "YES"
            } else {
                "NO"
            };
            printer.print_record(
                &[
                    attr.name.clone(),
                    attr.dtype().to_string(),
                    indexed.to_string(),
                ],
                &mut buf,
            );
        }
        printer.print_separator(&mut buf);
        Ok(QueryResult::new(&buf.into_string()))
    }

    pub fn get_table_names(&self) -> Result<String, QuarryError> {
        let mut table_names: Vec<String> = {
            let tables = self.database.tables.read().unwrap();
            tables.keys().cloned().collect()
        };
        table_names.sort();
        if table_names.is_empty() {
            Ok(String::from("No tables"))
        } else {
            Ok(table_names.join("\n"))
        }
    }

    /// Static checkpoint: commit the open transaction, flush the metadata
    /// and every heap and index file, then truncate the log.
    pub fn checkpoint(&self, txn: &Arc<Mutex<Transaction>>) -> Result<(), QuarryError> {
        self.transaction_manager.commit(txn, &self.log_manager)?;
        self.flush_meta()?;
        let tables = self.database.tables.read().unwrap();
        for table_ptr in tables.values() {
            let table = table_ptr.read().unwrap();
            self.storage_manager.flush_container(table.container_id)?;
            for index in table.indexes.values() {
                self.index_manager.flush_index(&index.name)?;
            }
        }
        self.log_manager.truncate()?;
        Ok(())
    }

    /// Flush everything and close the database's files.
    pub fn close(&self) -> Result<(), QuarryError> {
        self.flush_meta()?;
        self.log_manager.flush_log_to_disk()?;
        let tables = self.database.tables.read().unwrap();
        for table_ptr in tables.values() {
            let table = table_ptr.read().unwrap();
            self.storage_manager.close_container(table.container_id)?;
            for index in table.indexes.values() {
                self.index_manager.close_index(&index.name)?;
            }
        }
        Ok(())
    }
}
