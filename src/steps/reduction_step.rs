// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::models::{
    listing_models::CurrentMarketplaceListing,
    volume_models::{
        CollectionVolume, CurrentCollectionVolume, CurrentTokenVolume, TokenVolume,
    },
};
use aptos_indexer_processor_sdk::{
    traits::{AsyncRunType, AsyncStep, NamedStep, Processable},
    types::transaction_context::TransactionContext,
    utils::errors::ProcessorError,
};
use std::collections::BTreeMap;

pub type Tables = (
    Vec<CollectionVolume>,
    Vec<CurrentCollectionVolume>,
    Vec<TokenVolume>,
    Vec<CurrentTokenVolume>,
    Vec<CurrentMarketplaceListing>,
);

/// Collapses one batch down to unique primary keys. History rows are folded by
/// their composite key so replays within a batch cannot duplicate them;
/// current rows keep only the newest observation per entity. BTreeMaps keep
/// the drained vectors sorted by primary key, which keeps concurrent batch
/// writes deadlock free.
#[derive(Debug, Default)]
pub struct VolumeAccumulator {
    collection_volumes: BTreeMap<(String, i64, i64), CollectionVolume>,
    current_collection_volumes: BTreeMap<String, CurrentCollectionVolume>,
    token_volumes: BTreeMap<(String, i64, i64), TokenVolume>,
    current_token_volumes: BTreeMap<String, CurrentTokenVolume>,
    current_listings: BTreeMap<String, CurrentMarketplaceListing>,
}

impl VolumeAccumulator {
    pub fn fold_collection_volume(&mut self, volume: CollectionVolume) {
        let key = (
            volume.collection_data_id_hash.clone(),
            volume.last_transaction_version,
            volume.event_index,
        );
        self.collection_volumes.insert(key, volume);
    }

    pub fn fold_current_collection_volume(&mut self, volume: CurrentCollectionVolume) {
        match self
            .current_collection_volumes
            .get(&volume.collection_data_id_hash)
        {
            Some(existing)
                if existing.last_transaction_version > volume.last_transaction_version => {},
            _ => {
                self.current_collection_volumes
                    .insert(volume.collection_data_id_hash.clone(), volume);
            },
        }
    }

    pub fn fold_token_volume(&mut self, volume: TokenVolume) {
        let key = (
            volume.token_data_id_hash.clone(),
            volume.last_transaction_version,
            volume.event_index,
        );
        self.token_volumes.insert(key, volume);
    }

    pub fn fold_current_token_volume(&mut self, volume: CurrentTokenVolume) {
        match self.current_token_volumes.get(&volume.token_data_id_hash) {
            Some(existing)
                if existing.last_transaction_version > volume.last_transaction_version => {},
            _ => {
                self.current_token_volumes
                    .insert(volume.token_data_id_hash.clone(), volume);
            },
        }
    }

    pub fn fold_listing(&mut self, listing: CurrentMarketplaceListing) {
        match self.current_listings.get(&listing.token_data_id_hash) {
            Some(existing)
                if existing.last_transaction_version > listing.last_transaction_version => {},
            _ => {
                self.current_listings
                    .insert(listing.token_data_id_hash.clone(), listing);
            },
        }
    }

    pub fn drain(self) -> Tables {
        (
            self.collection_volumes.into_values().collect(),
            self.current_collection_volumes.into_values().collect(),
            self.token_volumes.into_values().collect(),
            self.current_token_volumes.into_values().collect(),
            self.current_listings.into_values().collect(),
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct VolumeReductionStep {}

impl VolumeReductionStep {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait::async_trait]
impl Processable for VolumeReductionStep {
    type Input = Tables;
    type Output = Tables;
    type RunType = AsyncRunType;

    async fn process(
        &mut self,
        transactions: TransactionContext<Tables>,
    ) -> Result<Option<TransactionContext<Tables>>, ProcessorError> {
        let (
            collection_volumes,
            current_collection_volumes,
            token_volumes,
            current_token_volumes,
            current_listings,
        ) = transactions.data;

        let mut acc = VolumeAccumulator::default();

        collection_volumes
            .into_iter()
            .for_each(|v| acc.fold_collection_volume(v));
        current_collection_volumes
            .into_iter()
            .for_each(|v| acc.fold_current_collection_volume(v));
        token_volumes
            .into_iter()
            .for_each(|v| acc.fold_token_volume(v));
        current_token_volumes
            .into_iter()
            .for_each(|v| acc.fold_current_token_volume(v));
        current_listings
            .into_iter()
            .for_each(|l| acc.fold_listing(l));

        Ok(Some(TransactionContext {
            data: acc.drain(),
            metadata: transactions.metadata,
        }))
    }
}

impl AsyncStep for VolumeReductionStep {}

impl NamedStep for VolumeReductionStep {
    fn name(&self) -> String {
        "VolumeReductionStep".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn current_collection_volume(
        hash: &str,
        version: i64,
        volume: u64,
    ) -> CurrentCollectionVolume {
        CurrentCollectionVolume {
            collection_data_id_hash: hash.to_string(),
            volume: BigDecimal::from(volume),
            inserted_at: chrono::DateTime::from_timestamp(1679000000, 0)
                .unwrap()
                .naive_utc(),
            last_transaction_version: version,
        }
    }

    fn collection_volume(hash: &str, version: i64, index: i64, volume: u64) -> CollectionVolume {
        CollectionVolume {
            collection_data_id_hash: hash.to_string(),
            volume: BigDecimal::from(volume),
            inserted_at: chrono::DateTime::from_timestamp(1679000000, 0)
                .unwrap()
                .naive_utc(),
            last_transaction_version: version,
            event_index: index,
        }
    }

    #[test]
    fn newest_observation_wins_per_collection() {
        let mut acc = VolumeAccumulator::default();
        acc.fold_current_collection_volume(current_collection_volume("aa", 10, 100));
        acc.fold_current_collection_volume(current_collection_volume("aa", 12, 300));
        acc.fold_current_collection_volume(current_collection_volume("aa", 11, 200));
        acc.fold_current_collection_volume(current_collection_volume("bb", 5, 50));

        let (_, current, ..) = acc.drain();
        assert_eq!(current.len(), 2);
        // drained in key order
        assert_eq!(current[0].collection_data_id_hash, "aa");
        assert_eq!(current[0].last_transaction_version, 12);
        assert_eq!(current[0].volume, BigDecimal::from(300));
        assert_eq!(current[1].collection_data_id_hash, "bb");
    }

    #[test]
    fn same_version_later_event_wins() {
        let mut acc = VolumeAccumulator::default();
        acc.fold_current_collection_volume(current_collection_volume("aa", 10, 100));
        acc.fold_current_collection_volume(current_collection_volume("aa", 10, 999));

        let (_, current, ..) = acc.drain();
        assert_eq!(current[0].volume, BigDecimal::from(999));
    }

    #[test]
    fn history_rows_are_deduped_by_composite_key_only() {
        let mut acc = VolumeAccumulator::default();
        acc.fold_collection_volume(collection_volume("aa", 10, 0, 100));
        acc.fold_collection_volume(collection_volume("aa", 10, 1, 200));
        acc.fold_collection_volume(collection_volume("aa", 11, 0, 300));
        // exact replay of an earlier row collapses
        acc.fold_collection_volume(collection_volume("aa", 10, 0, 100));

        let (history, ..) = acc.drain();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].event_index, 0);
        assert_eq!(history[1].event_index, 1);
        assert_eq!(history[2].last_transaction_version, 11);
    }
}
