use anyhow::Result;
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub claims: ClaimConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ClaimConfig {
    /// Minimum lead balance (in paise) for the lead to be claim-eligible.
    /// Defaults to 100 paise (one rupee).
    pub min_lead_balance_paise: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("CRM_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CRM_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()?;

        let db_url = env::var("CRM_DATABASE_URL").expect("CRM_DATABASE_URL must be set");
        let db_name = env::var("CRM_DATABASE_NAME").unwrap_or_else(|_| "crm_db".to_string());

        let min_lead_balance_paise = env::var("CRM_MIN_CLAIM_THRESHOLD_PAISE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()?;

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            claims: ClaimConfig {
                min_lead_balance_paise,
            },
            service_name: "crm-service".to_string(),
        })
    }
}
