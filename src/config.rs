use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sns::{
    config::{Credentials, Region},
    Client as SnsClient,
};
use chrono::Duration;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::messaging::Mailer;
use crate::model::mongodb::ensure_indexes_exist;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    otp_ttl: u32,
    otp_max_attempts: u32,
    otp_rate_limit: u32,
    otp_rate_window: u32,
    // secrets
    hmac_secret: String,
}

impl Config {
    /// Valid lifetime of an OTP code in seconds.
    pub fn otp_ttl(&self) -> Duration {
        Duration::seconds(self.otp_ttl.into())
    }

    /// Verification attempt budget per OTP code.
    pub fn otp_max_attempts(&self) -> u32 {
        self.otp_max_attempts
    }

    /// Max OTP issuances per voter inside the rate window.
    pub fn otp_rate_limit(&self) -> u32 {
        self.otp_rate_limit
    }

    /// Length of the sliding issuance rate window in seconds.
    pub fn otp_rate_window(&self) -> Duration {
        Duration::seconds(self.otp_rate_window.into())
    }

    /// Secret key for OTP code HMACs.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
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
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the uniqueness constraints exist, and places both a `Client`
/// and a `Database` into managed state.
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
        let db = client.database(&get_database_name());

        // Ensure the required indexes exist; the vote uniqueness constraints
        // are load-bearing, so refuse to launch without them.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Get the name of the database to use (production version).
#[cfg(not(test))]
pub(crate) fn get_database_name() -> String {
    "ballotbox".to_string()
}

/// Get the name of the database to use (test version).
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn get_database_name() -> String {
    let random: u32 = rand::random();
    let db = format!("test{random}");
    info!("Using database {db}");
    db
}

/// Configuration for the AWS connection.
#[derive(Deserialize)]
struct AwsConfig {
    // non-secrets
    aws_region: String,
    aws_access_key_id: String,
    // secrets
    aws_secret_access_key: String,
}

/// A fairing that loads the AWS config and places an SNS `Client` into
/// managed state.
pub struct AwsFairing;

#[rocket::async_trait]
impl Fairing for AwsFairing {
    fn info(&self) -> Info {
        Info {
            name: "AWS SNS",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<AwsConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load AWS config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        // Construct the connection.
        let client = sns_client(
            config.aws_region,
            config.aws_access_key_id,
            config.aws_secret_access_key,
        );
        info!("Loaded Amazon SNS config");

        // Manage the state.
        rocket = rocket.manage(client);
        Ok(rocket)
    }
}

/// Construct an SNS client for the given region and credentials.
pub(crate) fn sns_client(region: String, access_key_id: String, secret_access_key: String) -> SnsClient {
    let aws_config = SdkConfig::builder()
        .region(Region::new(region))
        .credentials_provider(SharedCredentialsProvider::new(Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "rocket config",
        )))
        .behavior_version(BehaviorVersion::latest())
        .build();
    SnsClient::new(&aws_config)
}

/// Configuration for the mail API.
#[derive(Deserialize)]
struct MailConfig {
    // non-secrets
    mail_api_url: String,
    mail_from: String,
    // secrets
    mail_api_key: String,
}

/// A fairing that loads the mail config and places a [`Mailer`] into
/// managed state.
pub struct MailFairing;

#[rocket::async_trait]
impl Fairing for MailFairing {
    fn info(&self) -> Info {
        Info {
            name: "Mail API",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<MailConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load mail config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let mailer = Mailer::new(config.mail_api_url, config.mail_api_key, config.mail_from);
        info!("Loaded mail API config");

        // Manage the state.
        rocket = rocket.manage(mailer);
        Ok(rocket)
    }
}
