//! Test helper module for crm-service integration tests.
//!
//! Spawns the real application on a random port over the in-memory store
//! and drives it through HTTP.

#![allow(dead_code)]

use crm_service::config::{ClaimConfig, Config, DatabaseConfig, ServerConfig};
use crm_service::services::MemoryStore;
use crm_service::Application;
use secrecy::Secret;
use std::sync::Arc;

pub const ADMIN_ID: &str = "admin-1";
pub const OPERATION_ID: &str = "ops-1";
pub const EMPLOYEE_ID: &str = "emp-1";
pub const SECOND_EMPLOYEE_ID: &str = "emp-2";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Random port
            },
            database: DatabaseConfig {
                url: Secret::new("mongodb://unused".to_string()),
                db_name: "crm_test".to_string(),
            },
            claims: ClaimConfig {
                min_lead_balance_paise: 100,
            },
            service_name: "crm-service-test".to_string(),
        };

        let store = Arc::new(MemoryStore::new());
        let app = Application::build_with_store(config, store)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to come up.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn get_as(&self, path: &str, user_id: &str, role: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("X-User-ID", user_id)
            .header("X-User-Role", role)
    }

    pub fn post_as(&self, path: &str, user_id: &str, role: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("X-User-ID", user_id)
            .header("X-User-Role", role)
    }

    /// Create a lead as admin, returning its id.
    pub async fn create_lead(&self, name: &str, opening_balance: i64) -> String {
        let response = self
            .post_as("/leads", ADMIN_ID, "admin")
            .json(&serde_json::json!({
                "name": name,
                "phone": "9811000000",
                "available_payment_amount": opening_balance,
            }))
            .send()
            .await
            .expect("Failed to create lead");
        assert_eq!(response.status(), 201, "lead creation should succeed");
        let body: serde_json::Value = response.json().await.expect("Invalid lead response");
        body["id"].as_str().expect("lead id missing").to_string()
    }

    /// Create an available payment as admin, returning its id.
    pub async fn create_payment(&self, amount: i64) -> String {
        let response = self
            .post_as("/payments", ADMIN_ID, "admin")
            .json(&serde_json::json!({ "amount": amount }))
            .send()
            .await
            .expect("Failed to create payment");
        assert_eq!(response.status(), 201, "payment creation should succeed");
        let body: serde_json::Value = response.json().await.expect("Invalid payment response");
        body["id"].as_str().expect("payment id missing").to_string()
    }

    /// Attempt a claim as the given employee.
    pub async fn claim(
        &self,
        payment_id: &str,
        lead_id: &str,
        employee_id: &str,
    ) -> reqwest::Response {
        self.post_as(
            &format!("/payments/{}/claim-with-lead", payment_id),
            employee_id,
            "employee",
        )
        .json(&serde_json::json!({ "lead_id": lead_id }))
        .send()
        .await
        .expect("Failed to send claim request")
    }

    pub async fn available_payments(&self) -> Vec<serde_json::Value> {
        let response = self
            .get_as("/payments/available", EMPLOYEE_ID, "employee")
            .send()
            .await
            .expect("Failed to list available payments");
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.expect("Invalid list response");
        body["payments"]
            .as_array()
            .expect("payments array missing")
            .clone()
    }

    pub async fn lead_balance(&self, lead_id: &str) -> i64 {
        let response = self
            .get_as(&format!("/leads/{}", lead_id), ADMIN_ID, "admin")
            .send()
            .await
            .expect("Failed to fetch lead");
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.expect("Invalid lead response");
        body["available_payment_amount"]
            .as_i64()
            .expect("balance missing")
    }
}
