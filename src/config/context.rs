use std::sync::Arc;

use tracing::info;

use crate::context::TablegateContext;
use crate::repository::{interface::Repository, postgres::PostgresRepository};

use super::schema::TablegateConfig;

/// Connect to the configured database and build the context the frontends serve from
pub async fn build_context(config: &TablegateConfig) -> Result<TablegateContext, sqlx::Error> {
    let repository: Arc<dyn Repository> =
        Arc::new(PostgresRepository::connect(&config.database).await?);

    info!(
        "Connected to the database (default schema {:?}, pool of {}-{} connections)",
        config.database.default_schema,
        config.database.min_connections,
        config.database.max_connections
    );

    Ok(TablegateContext::new(
        repository,
        config.database.default_schema.clone(),
        config.misc.default_page_size,
    ))
}
