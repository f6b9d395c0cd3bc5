// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::MIGRATIONS;
use aptos_indexer_processor_sdk::utils::errors::ProcessorError;
use diesel::{
    pg::Pg,
    query_builder::{AstPass, Query, QueryFragment, QueryId},
    ConnectionResult, QueryResult,
};
use diesel_async::{
    async_connection_wrapper::AsyncConnectionWrapper,
    pooled_connection::{
        bb8::{Pool, PooledConnection},
        AsyncDieselConnectionManager, ManagerConfig, PoolError,
    },
    AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::MigrationHarness;
use futures::{future::BoxFuture, FutureExt};
use std::sync::Arc;
use url::Url;

pub type MyDbConnection = AsyncPgConnection;
pub type DbPool = Pool<MyDbConnection>;
pub type ArcDbPool = Arc<DbPool>;
pub type DbPoolConnection<'a> = PooledConnection<'a, MyDbConnection>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 150;

/// Splits the `sslrootcert` query param off the connection string so the
/// remainder can be handed to tokio-postgres directly.
fn parse_and_clean_db_url(url: &str) -> (String, Option<String>) {
    let mut db_url = Url::parse(url).expect("Could not parse database url");
    let mut cert_path = None;

    let mut query = "".to_string();
    db_url.query_pairs().for_each(|(k, v)| {
        if k == "sslrootcert" {
            cert_path = Some(v.parse().unwrap());
        } else {
            query.push_str(&format!("{}={}&", k, v));
        }
    });
    db_url.set_query(Some(&query));

    (db_url.to_string(), cert_path)
}

fn establish_connection(database_url: &str) -> BoxFuture<ConnectionResult<AsyncPgConnection>> {
    use native_tls::{Certificate, TlsConnector};
    use postgres_native_tls::MakeTlsConnector;

    (async move {
        let (url, cert_path) = parse_and_clean_db_url(database_url);
        let cert = std::fs::read(cert_path.unwrap()).expect("Could not read certificate");

        let cert = Certificate::from_pem(cert.as_slice()).expect("Could not parse certificate");
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .add_root_certificate(cert)
            .build()
            .expect("Could not build TLS connector");
        let connector = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(&url, connector)
            .await
            .expect("Could not connect to database");
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("connection error: {}", e);
            }
        });
        AsyncPgConnection::try_from(client).await
    })
    .boxed()
}

pub async fn new_db_pool(
    database_url: &str,
    max_pool_size: Option<u32>,
) -> Result<ArcDbPool, PoolError> {
    let (_url, cert_path) = parse_and_clean_db_url(database_url);

    let config = if cert_path.is_some() {
        let mut config = ManagerConfig::<MyDbConnection>::default();
        config.custom_setup = Box::new(|conn| Box::pin(establish_connection(conn)));
        AsyncDieselConnectionManager::<MyDbConnection>::new_with_config(database_url, config)
    } else {
        AsyncDieselConnectionManager::<MyDbConnection>::new(database_url)
    };
    let pool = Pool::builder()
        .max_size(max_pool_size.unwrap_or(DEFAULT_MAX_POOL_SIZE))
        .build(config)
        .await?;
    Ok(Arc::new(pool))
}

pub fn run_pending_migrations<DB: diesel::backend::Backend>(conn: &mut impl MigrationHarness<DB>) {
    conn.run_pending_migrations(MIGRATIONS)
        .expect("[Processor] Migrations failed!");
}

pub async fn run_migrations(postgres_connection_string: String, _conn_pool: ArcDbPool) {
    use diesel::Connection;

    tracing::info!("Running migrations: {:?}", postgres_connection_string);
    let migration_time = std::time::Instant::now();
    let mut conn = AsyncConnectionWrapper::<AsyncPgConnection>::establish(
        &postgres_connection_string,
    )
    .expect("Failed to connect to postgres");
    tokio::task::spawn_blocking(move || {
        run_pending_migrations(&mut conn);
    })
    .await
    .expect("Failed to run migrations");
    tracing::info!(
        duration_in_secs = migration_time.elapsed().as_secs_f64(),
        "[Processor] Finished migrations"
    );
}

/// Cleans the data for DB insertion. Currently only strips null bytes out of
/// strings since Postgres rejects them inside TEXT values.
pub fn clean_data_for_db<T: serde::Serialize + for<'de> serde::Deserialize<'de>>(
    items: Vec<T>,
    should_remove_null_bytes: bool,
) -> Vec<T> {
    if should_remove_null_bytes {
        items.iter().map(remove_null_bytes).collect()
    } else {
        items
    }
}

pub fn remove_null_bytes<T: serde::Serialize + for<'de> serde::Deserialize<'de>>(input: &T) -> T {
    let mut txn_json = serde_json::to_value(input).unwrap();
    recurse_remove_null_bytes_from_json(&mut txn_json);
    serde_json::from_value::<T>(txn_json).unwrap()
}

fn recurse_remove_null_bytes_from_json(sub_json: &mut serde_json::Value) {
    match sub_json {
        serde_json::Value::Array(array) => {
            for item in array {
                recurse_remove_null_bytes_from_json(item);
            }
        },
        serde_json::Value::Object(object) => {
            for (_key, value) in object {
                recurse_remove_null_bytes_from_json(value);
            }
        },
        serde_json::Value::String(str) => {
            if !str.is_empty() {
                *str = str.replace('\u{0000}', "").replace("\\u0000", "");
            }
        },
        _ => {},
    }
}

pub async fn execute_in_chunks<U, T>(
    conn: ArcDbPool,
    build_query: fn(Vec<T>) -> (U, Option<&'static str>),
    items_to_insert: &[T],
    chunk_size: usize,
) -> Result<(), ProcessorError>
where
    U: QueryFragment<Pg> + QueryId + Send + 'static,
    T: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone + Send + 'static,
{
    let tasks = items_to_insert
        .chunks(chunk_size)
        .map(|chunk| {
            let conn = conn.clone();
            let items = chunk.to_vec();
            tokio::spawn(async move {
                let (query, additional_where_clause) = build_query(items.clone());
                execute_or_retry_cleaned(conn, build_query, items, query, additional_where_clause)
                    .await
            })
        })
        .collect::<Vec<_>>();

    let results = futures_util::future::try_join_all(tasks)
        .await
        .expect("Task panicked executing in chunks");
    for res in results {
        res?
    }

    Ok(())
}

async fn execute_or_retry_cleaned<U, T>(
    conn: ArcDbPool,
    build_query: fn(Vec<T>) -> (U, Option<&'static str>),
    items: Vec<T>,
    query: U,
    additional_where_clause: Option<&'static str>,
) -> Result<(), ProcessorError>
where
    U: QueryFragment<Pg> + QueryId + Send,
    T: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone,
{
    match execute_with_better_error(conn.clone(), query, additional_where_clause).await {
        Ok(_) => {},
        Err(_) => {
            // A null byte inside a string column is the usual culprit, retry
            // once with cleaned rows before giving up.
            let cleaned_items = clean_data_for_db(items, true);
            let (cleaned_query, additional_where_clause) = build_query(cleaned_items);
            match execute_with_better_error(conn.clone(), cleaned_query, additional_where_clause)
                .await
            {
                Ok(_) => {},
                Err(e) => return Err(e),
            }
        },
    }
    Ok(())
}

pub async fn execute_with_better_error<U>(
    pool: ArcDbPool,
    query: U,
    mut additional_where_clause: Option<&'static str>,
) -> Result<usize, ProcessorError>
where
    U: QueryFragment<Pg> + QueryId + Send,
{
    let original_query = diesel::debug_query::<Pg, _>(&query).to_string();
    // Appending a raw WHERE to a query that already carries one would produce
    // invalid SQL, so the caller-provided clause is dropped in that case.
    if original_query.to_lowercase().contains("where") {
        additional_where_clause = None;
    }
    let final_query = UpsertFilterLatestTransactionQuery {
        query,
        where_clause: additional_where_clause,
    };
    let debug_string = diesel::debug_query::<Pg, _>(&final_query).to_string();
    tracing::debug!("Executing query: {:?}", debug_string);
    let conn = &mut pool.get().await.map_err(|e| {
        tracing::warn!("Error getting connection from pool: {:?}", e);
        ProcessorError::DBStoreError {
            message: format!("{:#}", e),
            query: None,
        }
    })?;
    let res = final_query.execute(conn).await;
    if let Err(ref e) = res {
        tracing::warn!("Error running query: {:?}\n{:?}", e, debug_string);
    }
    res.map_err(|e| ProcessorError::DBStoreError {
        message: format!("{:#}", e),
        query: Some(debug_string),
    })
}

/// Wraps the query with an additional raw-SQL where clause. Used to guard
/// upserts with the last-transaction-version watermark so replayed batches
/// never move a current row backwards.
#[derive(Debug)]
pub struct UpsertFilterLatestTransactionQuery<T> {
    query: T,
    where_clause: Option<&'static str>,
}

impl<T: Query> Query for UpsertFilterLatestTransactionQuery<T> {
    type SqlType = T::SqlType;
}

impl<T> QueryId for UpsertFilterLatestTransactionQuery<T> {
    type QueryId = ();
    const HAS_STATIC_QUERY_ID: bool = false;
}

impl<T> QueryFragment<Pg> for UpsertFilterLatestTransactionQuery<T>
where
    T: QueryFragment<Pg>,
{
    fn walk_ast<'b>(&'b self, mut out: AstPass<'_, 'b, Pg>) -> QueryResult<()> {
        self.query.walk_ast(out.reborrow())?;
        if let Some(w) = self.where_clause {
            out.push_sql(w);
        }
        Ok(())
    }
}
