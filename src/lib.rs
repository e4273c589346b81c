#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, ServicesFairing};
use crate::logging::LoggerFairing;
use crate::voting::sweeper::SessionSweeperFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod scheduled_task;
pub mod voting;

pub use config::Config;

/// Assemble the server. Fairing order matters: each ignition fairing relies on
/// the state managed by those before it.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(ServicesFairing)
        .attach(SessionSweeperFairing)
        .mount("/", api::routes())
}

/// The server over a given store, with test secrets.
#[cfg(test)]
pub(crate) fn rocket_for_store(store: model::store::DynStore) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("jwt_secret", "test jwt secret"))
        .merge(("seal_secret", "test seal secret"));
    rocket::custom(figment)
        .manage(store)
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(ServicesFairing)
        .attach(SessionSweeperFairing)
        .mount("/", api::routes())
}

/// A fresh, uniquely named database on the server at `db_uri`, with indexes in
/// place. Dropped by `#[backend_test]` once the test finishes.
#[cfg(test)]
pub(crate) async fn test_database() -> mongodb::Database {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` must be configured to run database tests");
    let client = mongodb::Client::with_uri_str(&db_uri).await.unwrap();
    let db = client.database(&format!("test_{}", model::mongodb::Id::new()));
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    db
}
