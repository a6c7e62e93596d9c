use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminSetting {
    pub setting_key: String,
    pub setting_value: String,
    pub updated_at: String,
}
