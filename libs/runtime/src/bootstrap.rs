use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use odata_criteria::ServiceDocument;
use odata_db::DbHandle;
use odata_query::RequestProcessor;

use crate::config::{default_logging_config, AppConfig};
use crate::logging::init_logging;

/// A connected database and the request processor reading from it.
pub struct Engine {
    pub db: Arc<DbHandle>,
    pub processor: RequestProcessor,
}

impl Engine {
    /// Connect the configured database and pick the SQL dialect it reports.
    pub async fn connect(config: &AppConfig, sd: Arc<ServiceDocument>) -> Result<Self> {
        let database = config
            .database
            .as_ref()
            .context("database section is required")?;
        let url = database.resolved_url()?;
        let db = DbHandle::connect(&url, database.connect_opts())
            .await
            .with_context(|| {
                format!(
                    "Failed to connect {}",
                    odata_db::redact_credentials_in_dsn(Some(&url))
                )
            })?;
        let db = Arc::new(db);

        let processor = db.processor();
        tracing::info!(
            product = db.product_name(),
            dialect = processor.name(),
            dsn = %db.dsn(),
            "database connected"
        );

        let processor = RequestProcessor::new(sd, processor, db.clone(), config.query);
        Ok(Self { db, processor })
    }
}

/// Initialize logging from the configuration, then connect.
pub async fn bootstrap(config: &AppConfig, sd: Arc<ServiceDocument>) -> Result<Engine> {
    let logging = config.logging.clone().unwrap_or_else(default_logging_config);
    init_logging(&logging, Path::new(&config.home_dir));
    Engine::connect(config, sd).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use odata_core::{ODataQuery, ROOT_RESULT_KEY};
    use odata_query::{QueryConfig, RequestContext, UriPath};

    fn sqlite_config() -> AppConfig {
        AppConfig {
            home_dir: String::new(),
            database: Some(DatabaseConfig {
                url: "sqlite::memory:".into(),
                max_conns: Some(1),
                min_conns: None,
                acquire_timeout: None,
                idle_timeout: None,
                max_lifetime: None,
            }),
            logging: None,
            query: QueryConfig {
                max_page_size: Some(1),
                default_page_size: Some(5),
            },
        }
    }

    #[tokio::test]
    async fn connects_and_reads_through_the_configured_database() {
        let engine = Engine::connect(
            &sqlite_config(),
            odata_criteria::testing::service_document().unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(engine.processor.config().max_page_size, Some(1));

        let pool = engine.db.sqlx_sqlite().unwrap();
        for ddl in [
            r#"ATTACH DATABASE ':memory:' AS "OLINGO""#,
            r#"CREATE TABLE "OLINGO"."BusinessPartnerRole" ("BusinessPartnerID" TEXT, "BusinessPartnerRole" TEXT)"#,
            r#"INSERT INTO "OLINGO"."BusinessPartnerRole" VALUES ('1', 'A'), ('1', 'B')"#,
        ] {
            sqlx::query(ddl).execute(pool).await.unwrap();
        }

        let result = engine
            .processor
            .read(
                &UriPath::entity_set("BusinessPartnerRoles"),
                &ODataQuery::new().with_count(true),
                &RequestContext::new(),
            )
            .await
            .unwrap();
        let roles = &result[ROOT_RESULT_KEY];
        assert_eq!(roles.len(), 1, "clamped to the configured page size");
        assert_eq!(roles.count, Some(2));
    }

    #[tokio::test]
    async fn missing_database_section_is_an_error() {
        let config = AppConfig {
            database: None,
            ..sqlite_config()
        };
        let err = Engine::connect(&config, odata_criteria::testing::service_document().unwrap())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("database section"));
    }
}
