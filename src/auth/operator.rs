//! Operator identity model.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::role::Role;

/// Stored operator account. The bcrypt hash stays wrapped so `Debug` never prints it.
#[derive(Clone, Debug)]
pub struct Operator {
    pub id: Uuid,
    pub username: String,
    pub password_hash: SecretString,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Operator {
    #[must_use]
    pub fn new(username: String, password_hash: SecretString, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            password_hash,
            role,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[must_use]
    pub fn summary(&self) -> OperatorSummary {
        OperatorSummary::from(self)
    }
}

/// Everything about an operator that may leave the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSummary {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Operator> for OperatorSummary {
    fn from(operator: &Operator) -> Self {
        Self {
            id: operator.id,
            username: operator.username.clone(),
            role: operator.role,
            created_at: operator.created_at,
            updated_at: operator.updated_at,
        }
    }
}
