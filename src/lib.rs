#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod model;

pub use config::Config;

/// Assemble the rocket: all routes plus the logging, config, database and
/// messaging fairings. Nothing connects until ignition.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(logging::LoggerFairing)
        .attach(config::ConfigFairing)
        .attach(config::DatabaseFairing)
        .attach(config::AwsFairing)
        .attach(config::MailFairing)
}

/// Connect to the test database server.
#[cfg(test)]
pub(crate) async fn db_client() -> mongodb::Client {
    let uri = std::env::var("TEST_DB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    mongodb::Client::with_uri_str(&uri)
        .await
        .expect("Could not connect to the test database")
}

/// Build a rocket against the given database, skipping the connection
/// fairings. Message dispatch is compiled out under test, but the handlers
/// still expect managed messaging state, so placeholder clients are managed.
#[cfg(test)]
pub(crate) async fn test_rocket(db_client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    let db = db_client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db)
        .await
        .expect("Failed to create indexes");

    let rocket = rocket::build();
    let config = rocket
        .figment()
        .extract::<Config>()
        .expect("Failed to load application config");

    let sns = config::sns_client(
        "eu-west-2".to_string(),
        "test-access-key".to_string(),
        "test-secret-key".to_string(),
    );
    let mailer = messaging::Mailer::new(
        "http://localhost:9/send".to_string(),
        "test-api-key".to_string(),
        "votes@example.com".to_string(),
    );

    rocket
        .mount("/", api::routes())
        .attach(logging::LoggerFairing)
        .manage(config)
        .manage(db_client)
        .manage(db)
        .manage(sns)
        .manage(mailer)
}
