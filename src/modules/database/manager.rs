// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::context::Initialize;
use crate::modules::credits::entity::{EmailCreditsTxn, GeneralCreditsTxn, UserCredits};
use crate::modules::database::{batch_insert_impl, list_all_impl, META_MODELS};
use crate::modules::email::attachment::EmailAttachment;
use crate::modules::email::message::EmailMessage;
use crate::modules::email::task_trace::EmailTask;
use crate::modules::error::{code::ErrorCode, EngineError, EngineResult};
use crate::modules::issue::entity::Issue;
use crate::modules::locks::SingleFlightLock;
use crate::modules::notify::entity::WebhookConfig;
use crate::modules::settings::dir::{DATA_DIR_MANAGER, META_FILE, TASK_FILE};
use crate::modules::settings::SETTINGS;
use crate::modules::taskqueue::nativedb::{TaskMetaEntity, TASK_MODELS};
use crate::modules::user::entity::{EmailAlias, Plan, Subscription, User};
use crate::raise_error;
use native_db::{Builder, Database};
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

pub static DB_MANAGER: LazyLock<DatabaseManager> = LazyLock::new(DatabaseManager::new);

pub struct DatabaseManager {
    meta_db: Arc<Database<'static>>,
    tasks_db: Arc<Database<'static>>,
}

impl DatabaseManager {
    fn new() -> Self {
        let meta_db = Self::init_meta_database().expect("Failed to initialize metadata database");
        let tasks_db =
            Self::init_task_queue_database().expect("Failed to initialize tasks database");
        DatabaseManager { meta_db, tasks_db }
    }

    pub fn meta_db(&self) -> &Arc<Database<'static>> {
        &self.meta_db
    }

    pub fn tasks_db(&self) -> &Arc<Database<'static>> {
        &self.tasks_db
    }

    fn init_meta_database() -> EngineResult<Arc<Database<'static>>> {
        if SETTINGS.memory_mode_enabled {
            return Ok(Arc::new(
                Builder::new().create_in_memory(&META_MODELS).unwrap(),
            ));
        }
        let mut database = Builder::new()
            .set_cache_size(SETTINGS.metadata_cache_size.unwrap_or(134217728).max(67108864))
            .create(&META_MODELS, DATA_DIR_MANAGER.meta_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    pub async fn load_meta_snapshot(&self) -> EngineResult<()> {
        let latest_snapshot = DATA_DIR_MANAGER.find_latest_snapshot_for(META_FILE);
        let snapshot = match latest_snapshot {
            Some(snapshot) => {
                info!("Found existing meta snapshot: {:?}", snapshot);
                snapshot
            }
            None => {
                warn!("No meta snapshot found in the data directory");
                info!("Creating new meta snapshot instance");
                return Ok(());
            }
        };

        let database = Arc::new(
            Builder::new()
                .create(&META_MODELS, snapshot)
                .map_err(Self::handle_database_error)?,
        );

        let mut join_set = tokio::task::JoinSet::new();
        macro_rules! spawn_migration_task {
            ($table:ty) => {
                let db = Arc::clone(&database);
                let mem_db = Arc::clone(&self.meta_db);
                join_set.spawn(async move {
                    let data = list_all_impl::<$table>(&db).await?;
                    batch_insert_impl(&mem_db, data).await
                });
            };
        }

        spawn_migration_task!(User);
        spawn_migration_task!(Plan);
        spawn_migration_task!(Subscription);
        spawn_migration_task!(UserCredits);
        spawn_migration_task!(EmailCreditsTxn);
        spawn_migration_task!(GeneralCreditsTxn);
        spawn_migration_task!(EmailMessage);
        spawn_migration_task!(EmailAttachment);
        spawn_migration_task!(EmailTask);
        spawn_migration_task!(Issue);
        spawn_migration_task!(WebhookConfig);
        spawn_migration_task!(SingleFlightLock);
        spawn_migration_task!(EmailAlias);

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok(inner_res) => inner_res?,
                Err(join_err) => {
                    return Err(raise_error!(
                        format!("{:#?}", join_err),
                        ErrorCode::InternalError
                    ))
                }
            }
        }

        Ok(())
    }

    fn init_task_queue_database() -> EngineResult<Arc<Database<'static>>> {
        if SETTINGS.memory_mode_enabled {
            return Ok(Arc::new(
                Builder::new().create_in_memory(&TASK_MODELS).unwrap(),
            ));
        }
        let mut database = Builder::new()
            .set_cache_size(
                SETTINGS
                    .task_queue_cache_size
                    .unwrap_or(134217728)
                    .max(67108864),
            )
            .create(&TASK_MODELS, DATA_DIR_MANAGER.task_db.clone())
            .map_err(Self::handle_database_error)?;
        database
            .compact()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Arc::new(database))
    }

    pub async fn load_task_snapshot(&self) -> EngineResult<()> {
        let latest_snapshot = DATA_DIR_MANAGER.find_latest_snapshot_for(TASK_FILE);
        let snapshot = match latest_snapshot {
            Some(snapshot) => {
                info!("Found existing task snapshot: {:?}", snapshot);
                snapshot
            }
            None => {
                warn!("No task snapshot found in the data directory");
                info!("Creating new task snapshot instance");
                return Ok(());
            }
        };

        let database = Arc::new(
            Builder::new()
                .create(&TASK_MODELS, snapshot)
                .map_err(Self::handle_database_error)?,
        );

        let data = list_all_impl::<TaskMetaEntity>(&database).await?;
        batch_insert_impl(&self.tasks_db, data).await?;

        Ok(())
    }

    fn handle_database_error(error: native_db::db_type::Error) -> EngineError {
        match error {
            native_db::db_type::Error::RedbDatabaseError(database_error) => match database_error {
                redb::DatabaseError::DatabaseAlreadyOpen => {
                    raise_error!(
                        "Database is already open by another instance".into(),
                        ErrorCode::InternalError
                    )
                }
                other => {
                    raise_error!(
                        format!("Database error: {:?}", other),
                        ErrorCode::InternalError
                    )
                }
            },
            other => {
                raise_error!(
                    format!("Failed to create database: {:?}", other),
                    ErrorCode::InternalError
                )
            }
        }
    }
}

impl Initialize for DatabaseManager {
    async fn initialize() -> EngineResult<()> {
        if SETTINGS.memory_mode_enabled {
            DB_MANAGER.load_meta_snapshot().await?;
            DB_MANAGER.load_task_snapshot().await?;
        }
        Ok(())
    }
}
