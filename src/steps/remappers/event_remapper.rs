// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::marketplace_config::{
        ContractToMarketplaceMap, MarketplaceConfigs, MarketplaceEventConfigMappings,
        MarketplaceEventType,
    },
    models::{
        listing_models::CurrentMarketplaceListing, marketplace_activity::MarketplaceActivity,
        volume_models::CurrentCollectionVolume,
    },
    steps::reduction_step::Tables,
    utils::parse_timestamp,
};
use anyhow::Result;
use aptos_indexer_processor_sdk::utils::errors::ProcessorError;
use aptos_protos::transaction::v1::{transaction::TxnData, Transaction};
use std::sync::Arc;
use tracing::warn;

pub struct EventRemapper {
    pub event_mappings: Arc<MarketplaceEventConfigMappings>,
    pub contract_to_marketplace_map: Arc<ContractToMarketplaceMap>,
}

impl EventRemapper {
    pub fn new(configs: &MarketplaceConfigs) -> Result<Self> {
        let (event_mappings, contract_to_marketplace_map) = configs.get_mappings()?;
        Ok(Self {
            event_mappings: Arc::new(event_mappings),
            contract_to_marketplace_map: Arc::new(contract_to_marketplace_map),
        })
    }

    /**
     * Remaps the events of one transaction into volume history rows, current
     * volume rows and current listing rows.
     */
    pub fn remap_events(&self, txn: Transaction) -> Result<Tables, ProcessorError> {
        let mut collection_volumes = Vec::new();
        let mut current_collection_volumes = Vec::new();
        let mut token_volumes = Vec::new();
        let mut current_token_volumes = Vec::new();
        let mut current_listings = Vec::new();

        let txn_data = txn
            .txn_data
            .as_ref()
            .ok_or_else(|| ProcessorError::ProcessError {
                message: format!("Transaction data is missing for version {}", txn.version),
            })?;

        if let TxnData::User(tx_inner) = txn_data {
            let txn_timestamp =
                parse_timestamp(txn.timestamp.as_ref().unwrap(), txn.version as i64);

            for (event_index, event) in tx_inner.events.iter().enumerate() {
                if let Some(activity) = MarketplaceActivity::from_event(
                    event,
                    txn.version as i64,
                    event_index as i64,
                    txn_timestamp,
                    &self.event_mappings,
                    &self.contract_to_marketplace_map,
                ) {
                    if activity.standard_event_type == MarketplaceEventType::Unknown {
                        warn!(
                            txn_version = activity.txn_version,
                            raw_event_type = activity.raw_event_type.as_str(),
                            "Skipping event mapped to unknown type"
                        );
                        continue;
                    }

                    if let Some((current_collection, collection, current_token, token)) =
                        CurrentCollectionVolume::from_activity(&activity)
                    {
                        collection_volumes.push(collection);
                        current_collection_volumes.push(current_collection);
                        token_volumes.push(token);
                        current_token_volumes.push(current_token);
                    }

                    if let Some(listing) = CurrentMarketplaceListing::from_activity(&activity) {
                        current_listings.push(listing);
                    }
                }
            }
        }

        Ok((
            collection_volumes,
            current_collection_volumes,
            token_volumes,
            current_token_volumes,
            current_listings,
        ))
    }
}
