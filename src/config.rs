use std::sync::Arc;

use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    mongodb::ensure_indexes_exist,
    store::{DynStore, MongoStore},
};
use crate::voting::{
    pipeline::SubmissionPipeline,
    sealer::{DynSealer, HmacSealer},
    session::SessionManager,
    tally::TallyEngine,
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_session_ttl")]
    pub(crate) session_ttl: u32,
    #[serde(default = "default_sweep_interval")]
    pub(crate) sweep_interval: u32,
    // secrets
    pub(crate) jwt_secret: String,
    pub(crate) seal_secret: String,
}

fn default_session_ttl() -> u32 {
    30 * 60
}

fn default_sweep_interval() -> u32 {
    60
}

impl Config {
    /// How long a voting session stays completable after it starts.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// How often lapsed sessions are swept.
    pub fn sweep_interval(&self) -> Duration {
        Duration::seconds(self.sweep_interval.into())
    }

    /// Secret key used to verify voter tokens from the authentication service.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key of the built-in vote sealer.
    pub fn seal_secret(&self) -> &[u8] {
        self.seal_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "ballots".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the uniqueness indexes exist, and places the [`DynStore`] into
/// managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        let store: DynStore = Arc::new(MongoStore::new(&db));
        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// A fairing that builds the voting services from the config and store, and
/// places the [`SessionManager`], [`SubmissionPipeline`] and [`TallyEngine`]
/// into managed state.
/// Must be attached after the config fairing and whatever provides the store.
pub struct ServicesFairing;

#[rocket::async_trait]
impl Fairing for ServicesFairing {
    fn info(&self) -> Info {
        Info {
            name: "Voting services",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (store, config) = match (rocket.state::<DynStore>(), rocket.state::<Config>()) {
            (Some(store), Some(config)) => (store.clone(), config),
            _ => {
                error!("Store and config must be available before building voting services");
                return Err(rocket);
            }
        };

        let sealer: DynSealer = Arc::new(HmacSealer::new(config.seal_secret()));
        let sessions = SessionManager::new(store.clone(), config.session_ttl());
        let pipeline = SubmissionPipeline::new(store.clone(), sealer.clone(), sessions.clone());
        let tally = TallyEngine::new(store, sealer);
        info!(
            "Voting services ready, session TTL {}s",
            config.session_ttl().num_seconds()
        );

        rocket = rocket.manage(sessions).manage(pipeline).manage(tally);
        Ok(rocket)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self {
                session_ttl: default_session_ttl(),
                sweep_interval: default_sweep_interval(),
                jwt_secret: "test jwt secret".to_string(),
                seal_secret: "test seal secret".to_string(),
            }
        }
    }
}
