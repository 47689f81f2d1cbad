pub mod appresult;
pub mod backend;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod res;
pub mod rides;
pub mod session;
pub mod web;

use std::sync::Arc;

use axum::extract::FromRef;
use serde_json::Value;

pub use appresult::{AppError, AppResult};
pub use error::CarpoolError;
pub use identity::Identity;
pub use rides::RideDirectory;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub identity: Arc<Identity>,
    pub rides: Arc<RideDirectory>,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> error::Result<String>;
    fn get_obj_field(&self, field: &str) -> error::Result<&Value>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> error::Result<String> {
        Ok(
            self.get(field)
            .ok_or_else(|| CarpoolError::Parse(format!("expected {field} in {self}")))?
            .as_str()
            .ok_or_else(|| CarpoolError::Parse(format!("expected {field} in {self} to be string")))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> error::Result<&Value> {
        self.get(field)
        .ok_or_else(|| CarpoolError::Parse(format!("expected {field} in {self}")))
    }
}
