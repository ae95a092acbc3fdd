//! Round trips through an in-memory SQLite database.
#![cfg(feature = "sqlite")]

use std::sync::Arc;

use anyhow::Result;
use odata_core::ast::{CompareOperator, Expr, Value};
use odata_core::{ExpandItem, ODataQuery, PropertyValue, ROOT_RESULT_KEY};
use odata_criteria::{testing, FieldKind, Statement, TupleElement};
use odata_db::{ConnectOpts, DbHandle};
use odata_query::{QueryConfig, QueryExecutor, RequestContext, RequestProcessor, UriPath};

const SCHEMA_DDL: &[&str] = &[
    r#"ATTACH DATABASE ':memory:' AS "OLINGO""#,
    r#"CREATE TABLE "OLINGO"."BusinessPartner" (
        "ID" TEXT PRIMARY KEY,
        "ETag" INTEGER,
        "Type" TEXT,
        "Country" TEXT,
        "Address.StreetName" TEXT,
        "Address.CityName" TEXT,
        "Address.PostalCode" TEXT,
        "Address.Region" TEXT,
        "Address.Country" TEXT,
        "CustomString1" TEXT,
        "NameLine1" TEXT,
        "NameLine2" TEXT,
        "ABCClass" INTEGER
    )"#,
    r#"CREATE TABLE "OLINGO"."BusinessPartnerRole" (
        "BusinessPartnerID" TEXT,
        "BusinessPartnerRole" TEXT,
        PRIMARY KEY ("BusinessPartnerID", "BusinessPartnerRole")
    )"#,
    r#"CREATE TABLE "OLINGO"."Comment" ("BusinessPartnerID" TEXT, "Text" TEXT)"#,
    r#"INSERT INTO "OLINGO"."BusinessPartner" ("ID", "ETag", "Type", "Country", "Address.CityName", "NameLine1")
        VALUES ('1', 3, '2', 'DEU', 'Berlin', 'First Org'),
               ('2', 1, '2', 'CHE', 'Bern', 'Second Org'),
               ('3', 5, '1', 'DEU', 'Hamburg', 'Max')"#,
    r#"INSERT INTO "OLINGO"."BusinessPartnerRole" VALUES ('1', 'A'), ('1', 'B'), ('2', 'A'), ('3', 'C')"#,
    r#"INSERT INTO "OLINGO"."Comment" VALUES ('1', 'hello'), ('1', 'again')"#,
];

/// A single connection, so the attached schema and the data stay visible.
async fn bring_up() -> Result<Arc<DbHandle>> {
    let opts = ConnectOpts {
        max_conns: Some(1),
        ..ConnectOpts::default()
    };
    let db = DbHandle::connect("sqlite::memory:", opts).await?;
    let pool = db.sqlx_sqlite().expect("sqlite pool");
    for ddl in SCHEMA_DDL {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(Arc::new(db))
}

fn processor(db: &Arc<DbHandle>) -> RequestProcessor {
    RequestProcessor::new(
        testing::service_document().unwrap(),
        db.processor(),
        db.clone(),
        QueryConfig::default(),
    )
}

#[tokio::test]
async fn filtered_read_with_expand_and_collection() -> Result<()> {
    let db = bring_up().await?;
    let query = ODataQuery::new()
        .with_filter(Expr::Compare(
            Box::new(Expr::Identifier("Country".into())),
            CompareOperator::Eq,
            Box::new(Expr::Value(Value::from("DEU"))),
        ))
        .with_expand(ExpandItem::new("Roles").with_options(ODataQuery::new().with_count(true)));

    let result = processor(&db)
        .read(
            &UriPath::entity_set("Organizations"),
            &query,
            &RequestContext::new(),
        )
        .await?;

    let root = &result[ROOT_RESULT_KEY];
    assert_eq!(root.len(), 1, "only organizations from DEU");
    let org = &root.entities[0];
    assert_eq!(org.value("ID"), Some(&Value::from("1")));
    assert_eq!(org.value("ETag"), Some(&Value::from(3i64)));
    assert_eq!(org.value("Address/CityName"), Some(&Value::from("Berlin")));
    assert_eq!(org.value("Address/Region"), Some(&Value::Null));

    let roles = org.expanded("Roles").unwrap();
    let categories: Vec<_> = roles
        .entities
        .iter()
        .map(|r| r.value("RoleCategory").cloned())
        .collect();
    assert_eq!(
        categories,
        vec![Some(Value::from("A")), Some(Value::from("B"))]
    );
    assert_eq!(roles.count, Some(2));

    match org.property("Comment") {
        Some(PropertyValue::Collection(items)) => assert_eq!(items.len(), 2),
        other => panic!("unexpected comment property: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn paged_read_restricts_children_to_the_page() -> Result<()> {
    let db = bring_up().await?;
    let query = ODataQuery::new()
        .with_top(2)
        .with_expand(ExpandItem::new("Roles"));

    let result = processor(&db)
        .read(
            &UriPath::entity_set("BusinessPartners"),
            &query,
            &RequestContext::new(),
        )
        .await?;

    let root = &result[ROOT_RESULT_KEY];
    assert_eq!(root.len(), 2);
    assert_eq!(root.entities[0].expanded("Roles").unwrap().len(), 2);
    assert_eq!(root.entities[1].expanded("Roles").unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn many_to_one_expand_yields_one_target_per_row() -> Result<()> {
    let db = bring_up().await?;
    let query = ODataQuery::new()
        .with_expand(ExpandItem::new("Organization").with_options(ODataQuery::new().with_count(true)));

    let result = processor(&db)
        .read(
            &UriPath::entity_set("BusinessPartnerRoles"),
            &query,
            &RequestContext::new(),
        )
        .await?;

    let roles = &result[ROOT_RESULT_KEY];
    assert_eq!(roles.len(), 4);
    for (role, partner) in roles.entities[..3].iter().zip(["1", "1", "2"]) {
        let organization = role.expanded("Organization").unwrap();
        assert_eq!(organization.len(), 1, "role of partner {partner}");
        assert_eq!(organization.entities[0].value("ID"), Some(&Value::from(partner)));
        assert_eq!(organization.count, Some(1));
    }
    let person_role = roles.entities[3].expanded("Organization").unwrap();
    assert!(person_role.is_empty());
    assert_eq!(person_role.count, Some(0));
    Ok(())
}

#[tokio::test]
async fn statements_bind_in_position_order() -> Result<()> {
    let db = bring_up().await?;
    let statement = Statement {
        sql: r#"SELECT COUNT(*), 'x', 1.5 FROM "OLINGO"."BusinessPartner" WHERE "Country" = ?1 AND "ETag" >= ?2"#
            .to_string(),
        parameters: vec![Value::from("DEU"), Value::from(3i64)],
        elements: Arc::from(vec![
            TupleElement {
                alias: Some("count".to_string()),
                kind: Some(FieldKind::I64),
                position: 0,
            },
            TupleElement {
                alias: None,
                kind: None,
                position: 1,
            },
            TupleElement {
                alias: None,
                kind: None,
                position: 2,
            },
        ]),
    };

    let rows = db.fetch(&statement).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_by_alias_as::<i64>("count")?, 2);
    assert_eq!(rows[0].get(1)?, &Value::from("x"));
    assert!(matches!(rows[0].get(2)?, Value::Number(_)));
    Ok(())
}

#[tokio::test]
async fn reports_product_and_version() -> Result<()> {
    let db = bring_up().await?;
    assert_eq!(db.product_name(), "SQLite");
    assert_eq!(db.processor().name(), "sqlite");
    assert!(!db.server_version().await?.is_empty());
    Ok(())
}
