// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::marketplace_config::{
        standardize_event_type, ContractToMarketplaceMap, MarketplaceEventConfigMappings,
        MarketplaceEventType,
    },
    steps::{extract_bigdecimal, extract_string},
    utils::token_ids::TokenDataIdType,
};
use aptos_indexer_processor_sdk::utils::convert::standardize_address;
use aptos_protos::transaction::v1::Event;
use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDateTime;
use serde_json::Value;
use tracing::{debug, warn};

/// One marketplace event after remapping, not persisted directly. Volume and
/// listing rows are derived from this.
#[derive(Clone, Debug)]
pub struct MarketplaceActivity {
    pub txn_version: i64,
    pub event_index: i64,
    pub raw_event_type: String,
    pub standard_event_type: MarketplaceEventType,
    pub marketplace: String,
    pub contract_address: String,
    pub creator_address: Option<String>,
    pub collection_name: Option<String>,
    pub token_name: Option<String>,
    pub property_version: BigDecimal,
    pub seller: Option<String>,
    pub buyer: Option<String>,
    pub price: BigDecimal,
    pub token_amount: BigDecimal,
    pub block_timestamp: NaiveDateTime,
}

impl MarketplaceActivity {
    pub fn from_event(
        event: &Event,
        txn_version: i64,
        event_index: i64,
        block_timestamp: NaiveDateTime,
        event_mappings: &MarketplaceEventConfigMappings,
        contract_to_marketplace_map: &ContractToMarketplaceMap,
    ) -> Option<Self> {
        let (event_type, contract_address) = standardize_event_type(&event.type_str).ok()?;

        let marketplace = contract_to_marketplace_map
            .get(&contract_address)
            .or_else(|| {
                debug!(
                    "Marketplace not found for the given contract address: {}",
                    contract_address
                );
                None
            })?;
        let config = event_mappings.get(marketplace)?.get(&event_type)?;

        let event_data: Value = match serde_json::from_str(event.data.as_str()) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    txn_version,
                    event_type = event_type.as_str(),
                    "Event data is not valid JSON: {}",
                    e
                );
                return None;
            },
        };

        Some(Self {
            txn_version,
            event_index,
            raw_event_type: event_type,
            standard_event_type: config.event_type.clone(),
            marketplace: config.marketplace.clone(),
            contract_address,
            creator_address: extract_string(&config.creator_address, &event_data)
                .map(|addr| standardize_address(&addr)),
            collection_name: extract_string(&config.collection_name, &event_data),
            token_name: extract_string(&config.token_name, &event_data),
            property_version: extract_bigdecimal(&config.property_version, &event_data)
                .unwrap_or_else(BigDecimal::zero),
            seller: extract_string(&config.seller, &event_data)
                .map(|addr| standardize_address(&addr)),
            buyer: extract_string(&config.buyer, &event_data)
                .map(|addr| standardize_address(&addr)),
            price: extract_bigdecimal(&config.price, &event_data)
                .unwrap_or_else(BigDecimal::zero),
            token_amount: extract_bigdecimal(&config.token_amount, &event_data)
                .unwrap_or_else(BigDecimal::zero),
            block_timestamp,
        })
    }

    /// Token identity is only resolvable when the event carried all three
    /// naming fields.
    pub fn token_data_id(&self) -> Option<TokenDataIdType> {
        match (
            &self.creator_address,
            &self.collection_name,
            &self.token_name,
        ) {
            (Some(creator), Some(collection), Some(name)) => Some(TokenDataIdType::new(
                creator.clone(),
                collection.clone(),
                name.clone(),
            )),
            _ => {
                debug!(
                    txn_version = self.txn_version,
                    event_index = self.event_index,
                    "Missing fields for token identity"
                );
                None
            },
        }
    }
}
