pub mod config_cmd;
pub mod doctor;
pub mod run;
pub mod serve;

use std::sync::Arc;
use turnstile_config::AppConfig;
use turnstile_core::{SessionLog, SessionResolver, SessionWriter};
use turnstile_store::{InMemorySessionStore, SessionSeed, SqliteSessionStore};

/// One store seen through the three roles the runtime needs.
pub struct Stores {
    pub log: Arc<dyn SessionLog>,
    pub resolver: Arc<dyn SessionResolver>,
    pub writer: Arc<dyn SessionWriter>,
}

impl Stores {
    fn of<T>(store: Arc<T>) -> Self
    where
        T: SessionLog + SessionResolver + SessionWriter + 'static,
    {
        Self {
            log: store.clone(),
            resolver: store.clone(),
            writer: store,
        }
    }
}

/// Open the configured store backend, loading `seed` into it when given.
pub async fn open_store(
    config: &AppConfig,
    seed: Option<&SessionSeed>,
) -> Result<Stores, Box<dyn std::error::Error>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            let path = config.store.path.clone().unwrap_or_else(|| {
                format!(
                    "sqlite://{}",
                    AppConfig::config_dir().join("sessions.db").display()
                )
            });
            let store = Arc::new(SqliteSessionStore::new(&path).await?);
            if let Some(seed) = seed {
                store.add_project(&seed.project).await?;
                store
                    .add_thread(&seed.thread_id, &seed.project.project_id)
                    .await?;
                for message in seed.to_messages() {
                    store.append(message).await?;
                }
            }
            Ok(Stores::of(store))
        }
        _ => {
            let store = Arc::new(InMemorySessionStore::new());
            if let Some(seed) = seed {
                store.seed(seed).await?;
            }
            Ok(Stores::of(store))
        }
    }
}
