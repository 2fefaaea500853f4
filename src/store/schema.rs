//! PostgreSQL schema bootstrap

use sqlx::PgPool;

use super::StoreError;

/// Create the five core tables and their indexes if missing.
pub async fn init_schema(pool: &PgPool) -> Result<(), StoreError> {
    tracing::info!("Initializing PostgreSQL schema...");

    for statement in [
        CREATE_USERS_TABLE,
        CREATE_USERS_USERNAME_INDEX,
        CREATE_USERS_EMAIL_INDEX,
        CREATE_BALANCES_TABLE,
        CREATE_TRANSACTIONS_TABLE,
        CREATE_TRANSACTIONS_FROM_INDEX,
        CREATE_TRANSACTIONS_TO_INDEX,
        CREATE_BALANCE_HISTORY_TABLE,
        CREATE_BALANCE_HISTORY_USER_INDEX,
        CREATE_AUDIT_LOGS_TABLE,
        CREATE_AUDIT_LOGS_ENTITY_INDEX,
        CREATE_AUDIT_LOGS_ENTITY_TYPE_INDEX,
        CREATE_AUDIT_LOGS_CREATED_INDEX,
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("PostgreSQL schema initialized");
    Ok(())
}

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    username VARCHAR(50) NOT NULL,
    email VARCHAR(100) NOT NULL,
    password_digest VARCHAR(255) NOT NULL,
    role VARCHAR(20) NOT NULL DEFAULT 'customer',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    deleted_at TIMESTAMPTZ
)
"#;

const CREATE_USERS_USERNAME_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users (username)";

// Email uniqueness is case-insensitive
const CREATE_USERS_EMAIL_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (LOWER(email))";

const CREATE_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    user_id UUID PRIMARY KEY REFERENCES users (id),
    amount NUMERIC(15,2) NOT NULL DEFAULT 0 CHECK (amount >= 0),
    last_updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id UUID PRIMARY KEY,
    from_user_id UUID,
    to_user_id UUID,
    amount NUMERIC(15,2) NOT NULL CHECK (amount > 0),
    type VARCHAR(20) NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    reference VARCHAR(100) NOT NULL DEFAULT '',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TRANSACTIONS_FROM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transactions_from_user ON transactions (from_user_id)";

const CREATE_TRANSACTIONS_TO_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_transactions_to_user ON transactions (to_user_id)";

const CREATE_BALANCE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balance_history (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL,
    previous_amount NUMERIC(15,2) NOT NULL,
    new_amount NUMERIC(15,2) NOT NULL,
    change_amount NUMERIC(15,2) NOT NULL,
    change_type VARCHAR(20) NOT NULL,
    transaction_id UUID,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_BALANCE_HISTORY_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_balance_history_user ON balance_history (user_id, created_at)";

const CREATE_AUDIT_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS audit_logs (
    id UUID PRIMARY KEY,
    entity_type VARCHAR(50) NOT NULL,
    entity_id VARCHAR(100) NOT NULL,
    action VARCHAR(50) NOT NULL,
    details TEXT NOT NULL DEFAULT '',
    user_id UUID,
    ip VARCHAR(45),
    user_agent VARCHAR(500),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_AUDIT_LOGS_ENTITY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs (entity_id)";

const CREATE_AUDIT_LOGS_ENTITY_TYPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_entity_type ON audit_logs (entity_type)";

const CREATE_AUDIT_LOGS_CREATED_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs (created_at)";
