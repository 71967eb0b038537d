//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use quarry_core::{
    FieldDescriptor, FieldType, FromRow, Model, ModelDescriptor, Projection, Result, Row, Table,
    Value,
};
use quarry_engine::driver::scripted::{Reply, Request, ScriptedConnector};
use quarry_engine::{Database, EngineConfig, ManualClock};
use std::sync::Arc;

/// Row of the `Clients` table; `ID` is an identity key
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: i32,
    pub name: String,
    pub is_active: bool,
    pub last_buy_date: Option<NaiveDateTime>,
}

impl Client {
    pub fn new(id: i32, name: &str) -> Self {
        Client {
            id,
            name: name.to_string(),
            is_active: true,
            last_buy_date: None,
        }
    }
}

impl FromRow for Client {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Client {
            id: row.get_as("ID")?,
            name: row.get_as("Name")?,
            is_active: row.get_as("IsActive")?,
            last_buy_date: row.get_as("LastBuyDate")?,
        })
    }
}

impl Model for Client {
    type Key = i32;

    fn describe() -> Result<ModelDescriptor> {
        ModelDescriptor::new(
            "Clients",
            vec![
                FieldDescriptor::new("ID", FieldType::Int)
                    .primary_key()
                    .identity(),
                FieldDescriptor::new("Name", FieldType::String),
                FieldDescriptor::new("IsActive", FieldType::Bool),
                FieldDescriptor::new("LastBuyDate", FieldType::DateTime).nullable(),
            ],
        )
    }

    fn key(&self) -> i32 {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.is_active.into(),
            self.last_buy_date.into(),
        ]
    }

    fn log_field() -> Option<&'static str> {
        Some("Name")
    }
}

/// Narrow result shape read from `Clients`
#[derive(Debug, Clone, PartialEq)]
pub struct ClientName {
    pub name: String,
    pub active: bool,
}

impl FromRow for ClientName {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(ClientName {
            name: row.get_as("Name")?,
            active: row.get_or_default("Active")?,
        })
    }
}

impl Projection for ClientName {
    fn columns() -> Vec<String> {
        vec!["Name".to_string(), "Active".to_string()]
    }
}

pub fn client_columns() -> Vec<String> {
    ["ID", "Name", "IsActive", "LastBuyDate"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

/// Table of clients `ids`, named `Client <id>`
pub fn client_table(ids: impl IntoIterator<Item = i32>) -> Table {
    let mut table = Table::new(client_columns());
    for id in ids {
        table
            .push(vec![
                Value::Int(id),
                Value::from(format!("Client {}", id)),
                Value::Bool(id % 2 == 0),
                Value::Null,
            ])
            .unwrap();
    }
    table
}

pub fn buy_date() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap()
}

/// Engine configuration for tests: no lock report threads
pub fn test_config() -> EngineConfig {
    EngineConfig {
        lock_diagnostics: false,
        ..EngineConfig::default()
    }
}

/// Database over a scripted connector with a manual clock
pub fn database_with(
    config: EngineConfig,
    responder: impl Fn(&Request) -> Reply + Send + Sync + 'static,
) -> (Database, ScriptedConnector, Arc<ManualClock>) {
    let connector = ScriptedConnector::new(responder);
    let clock = Arc::new(ManualClock::new());
    let db = Database::builder(connector.clone(), "Server=test;Database=shop")
        .config(config)
        .clock(clock.clone())
        .build()
        .unwrap();
    (db, connector, clock)
}

/// Database answering every statement with `Affected(1)`
pub fn database() -> (Database, ScriptedConnector, Arc<ManualClock>) {
    database_with(test_config(), |_| Reply::Affected(1))
}
