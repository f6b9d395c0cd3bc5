// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    models::{
        listing_models::CurrentMarketplaceListing,
        volume_models::{
            CollectionVolume, CurrentCollectionVolume, CurrentTokenVolume, TokenVolume,
        },
    },
    postgres::postgres_utils::{execute_in_chunks, ArcDbPool},
    schema,
    steps::reduction_step::Tables,
};
use aptos_indexer_processor_sdk::{
    traits::{async_step::AsyncRunType, AsyncStep, NamedStep, Processable},
    types::transaction_context::TransactionContext,
    utils::errors::ProcessorError,
};
use diesel::{
    pg::{upsert::excluded, Pg},
    query_builder::QueryFragment,
    ExpressionMethods,
};
use tonic::async_trait;

// Rows inserted per chunk for each table
const INSERT_CHUNK_SIZE: usize = 200;

pub struct DBWritingStep {
    pub db_pool: ArcDbPool,
}

impl DBWritingStep {
    pub fn new(db_pool: ArcDbPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl Processable for DBWritingStep {
    type Input = Tables;
    type Output = ();
    type RunType = AsyncRunType;

    async fn process(
        &mut self,
        input: TransactionContext<Tables>,
    ) -> Result<Option<TransactionContext<()>>, ProcessorError> {
        let (
            collection_volumes,
            current_collection_volumes,
            token_volumes,
            current_token_volumes,
            current_listings,
        ) = input.data;

        let collection_volumes_result = execute_in_chunks(
            self.db_pool.clone(),
            insert_collection_volumes,
            &collection_volumes,
            INSERT_CHUNK_SIZE,
        );

        let current_collection_volumes_result = execute_in_chunks(
            self.db_pool.clone(),
            insert_current_collection_volumes,
            &current_collection_volumes,
            INSERT_CHUNK_SIZE,
        );

        let token_volumes_result = execute_in_chunks(
            self.db_pool.clone(),
            insert_token_volumes,
            &token_volumes,
            INSERT_CHUNK_SIZE,
        );

        let current_token_volumes_result = execute_in_chunks(
            self.db_pool.clone(),
            insert_current_token_volumes,
            &current_token_volumes,
            INSERT_CHUNK_SIZE,
        );

        let current_listings_result = execute_in_chunks(
            self.db_pool.clone(),
            insert_current_marketplace_listings,
            &current_listings,
            INSERT_CHUNK_SIZE,
        );

        let (
            collection_volumes_result,
            current_collection_volumes_result,
            token_volumes_result,
            current_token_volumes_result,
            current_listings_result,
        ) = tokio::join!(
            collection_volumes_result,
            current_collection_volumes_result,
            token_volumes_result,
            current_token_volumes_result,
            current_listings_result
        );

        for result in [
            collection_volumes_result,
            current_collection_volumes_result,
            token_volumes_result,
            current_token_volumes_result,
            current_listings_result,
        ] {
            if let Err(e) = result {
                return Err(ProcessorError::DBStoreError {
                    message: format!("Failed to store: {:?}", e),
                    query: None,
                });
            }
        }

        Ok(Some(TransactionContext {
            data: (),
            metadata: input.metadata,
        }))
    }
}

impl AsyncStep for DBWritingStep {}

impl NamedStep for DBWritingStep {
    fn name(&self) -> String {
        "DBWritingStep".to_string()
    }
}

pub fn insert_collection_volumes(
    items_to_insert: Vec<CollectionVolume>,
) -> (
    impl QueryFragment<Pg> + diesel::query_builder::QueryId + Send,
    Option<&'static str>,
) {
    use crate::schema::collection_volumes::dsl::*;

    (
        diesel::insert_into(schema::collection_volumes::table)
            .values(items_to_insert)
            .on_conflict((
                collection_data_id_hash,
                last_transaction_version,
                event_index,
            ))
            .do_nothing(),
        None,
    )
}

pub fn insert_current_collection_volumes(
    items_to_insert: Vec<CurrentCollectionVolume>,
) -> (
    impl QueryFragment<Pg> + diesel::query_builder::QueryId + Send,
    Option<&'static str>,
) {
    use crate::schema::current_collection_volumes::dsl::*;

    (
        diesel::insert_into(schema::current_collection_volumes::table)
            .values(items_to_insert)
            .on_conflict(collection_data_id_hash)
            .do_update()
            .set((
                volume.eq(excluded(volume)),
                inserted_at.eq(excluded(inserted_at)),
                last_transaction_version.eq(excluded(last_transaction_version)),
            )),
        Some(" WHERE current_collection_volumes.last_transaction_version <= excluded.last_transaction_version "),
    )
}

pub fn insert_token_volumes(
    items_to_insert: Vec<TokenVolume>,
) -> (
    impl QueryFragment<Pg> + diesel::query_builder::QueryId + Send,
    Option<&'static str>,
) {
    use crate::schema::token_volumes::dsl::*;

    (
        diesel::insert_into(schema::token_volumes::table)
            .values(items_to_insert)
            .on_conflict((token_data_id_hash, last_transaction_version, event_index))
            .do_nothing(),
        None,
    )
}

pub fn insert_current_token_volumes(
    items_to_insert: Vec<CurrentTokenVolume>,
) -> (
    impl QueryFragment<Pg> + diesel::query_builder::QueryId + Send,
    Option<&'static str>,
) {
    use crate::schema::current_token_volumes::dsl::*;

    (
        diesel::insert_into(schema::current_token_volumes::table)
            .values(items_to_insert)
            .on_conflict(token_data_id_hash)
            .do_update()
            .set((
                volume.eq(excluded(volume)),
                inserted_at.eq(excluded(inserted_at)),
                last_transaction_version.eq(excluded(last_transaction_version)),
            )),
        Some(" WHERE current_token_volumes.last_transaction_version <= excluded.last_transaction_version "),
    )
}

pub fn insert_current_marketplace_listings(
    items_to_insert: Vec<CurrentMarketplaceListing>,
) -> (
    impl QueryFragment<Pg> + diesel::query_builder::QueryId + Send,
    Option<&'static str>,
) {
    use crate::schema::current_marketplace_listings::dsl::*;

    (
        diesel::insert_into(schema::current_marketplace_listings::table)
            .values(items_to_insert)
            .on_conflict(token_data_id_hash)
            .do_update()
            .set((
                market_address.eq(excluded(market_address)),
                property_version.eq(excluded(property_version)),
                creator_address.eq(excluded(creator_address)),
                collection_name.eq(excluded(collection_name)),
                name.eq(excluded(name)),
                seller.eq(excluded(seller)),
                amount.eq(excluded(amount)),
                price.eq(excluded(price)),
                event_type.eq(excluded(event_type)),
                inserted_at.eq(excluded(inserted_at)),
                last_transaction_version.eq(excluded(last_transaction_version)),
            )),
        Some(" WHERE current_marketplace_listings.last_transaction_version <= excluded.last_transaction_version "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::marketplace_config::MarketplaceEventType;
    use bigdecimal::BigDecimal;

    fn naive_now() -> chrono::NaiveDateTime {
        chrono::DateTime::from_timestamp(1679000000, 0)
            .unwrap()
            .naive_utc()
    }

    #[test]
    fn history_inserts_are_append_only() {
        let (query, where_clause) = insert_collection_volumes(vec![CollectionVolume {
            collection_data_id_hash: "aa".to_string(),
            volume: BigDecimal::from(1),
            inserted_at: naive_now(),
            last_transaction_version: 1,
            event_index: 0,
        }]);
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("ON CONFLICT"));
        assert!(sql.contains("DO NOTHING"));
        assert!(where_clause.is_none());
    }

    #[test]
    fn current_volume_upserts_guard_on_version_watermark() {
        let (query, where_clause) =
            insert_current_collection_volumes(vec![CurrentCollectionVolume {
                collection_data_id_hash: "aa".to_string(),
                volume: BigDecimal::from(1),
                inserted_at: naive_now(),
                last_transaction_version: 1,
            }]);
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("ON CONFLICT"));
        assert!(sql.contains("DO UPDATE"));
        assert!(where_clause
            .unwrap()
            .contains("last_transaction_version <= excluded.last_transaction_version"));
    }

    #[test]
    fn listing_upserts_replace_all_mutable_columns() {
        let (query, where_clause) =
            insert_current_marketplace_listings(vec![CurrentMarketplaceListing {
                token_data_id_hash: "aa".to_string(),
                market_address: "0x2".to_string(),
                property_version: BigDecimal::from(0),
                creator_address: "0x1".to_string(),
                collection_name: "c".to_string(),
                name: "n".to_string(),
                seller: "0xa".to_string(),
                amount: BigDecimal::from(1),
                price: BigDecimal::from(100),
                event_type: MarketplaceEventType::PlaceListing,
                inserted_at: naive_now(),
                last_transaction_version: 1,
            }]);
        let sql = diesel::debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("DO UPDATE"));
        assert!(sql.contains("\"market_address\""));
        assert!(sql.contains("\"event_type\""));
        assert!(where_clause
            .unwrap()
            .contains("current_marketplace_listings.last_transaction_version"));
    }
}
