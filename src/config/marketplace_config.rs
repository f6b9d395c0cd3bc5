// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::steps::HashableJsonPaths;
use ahash::AHashMap;
use anyhow::Result;
use aptos_indexer_processor_sdk::utils::convert::standardize_address;
use diesel::{
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    pg::{Pg, PgValue},
    serialize::{self, Output, ToSql},
    sql_types::Text,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, io::Write};
use strum::{Display, EnumString};

// marketplace_name -> raw event type -> compiled extraction config
pub type MarketplaceEventConfigMappings = AHashMap<String, AHashMap<String, MarketplaceEventConfig>>;
// standardized contract address -> marketplace_name
pub type ContractToMarketplaceMap = AHashMap<String, String>;

/// Top-level marketplace configurations
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarketplaceConfigs {
    pub marketplaces: Vec<MarketplaceConfig>,
}

/// Represents a marketplace and its configuration. Event keys are fully
/// qualified on-chain event types, e.g. `0x2c7b::events::BuyEvent`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarketplaceConfig {
    pub name: String,
    pub events: HashMap<String, EventConfig>,
}

/// Defines how the fields of a single raw event are extracted. Each field is a
/// list of JSON paths tried in order, so one config can cover payload variants.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    pub event_type: MarketplaceEventType,
    #[serde(default)]
    pub price: Vec<String>,
    #[serde(default)]
    pub token_amount: Vec<String>,
    #[serde(default)]
    pub seller: Vec<String>,
    #[serde(default)]
    pub buyer: Vec<String>,
    #[serde(default)]
    pub creator_address: Vec<String>,
    #[serde(default)]
    pub collection_name: Vec<String>,
    #[serde(default)]
    pub token_name: Vec<String>,
    #[serde(default)]
    pub property_version: Vec<String>,
}

/// Compiled form of [`EventConfig`] with parsed JSON paths.
#[derive(Clone, Debug)]
pub struct MarketplaceEventConfig {
    pub marketplace: String,
    pub event_type: MarketplaceEventType,
    pub price: HashableJsonPaths,
    pub token_amount: HashableJsonPaths,
    pub seller: HashableJsonPaths,
    pub buyer: HashableJsonPaths,
    pub creator_address: HashableJsonPaths,
    pub collection_name: HashableJsonPaths,
    pub token_name: HashableJsonPaths,
    pub property_version: HashableJsonPaths,
}

impl MarketplaceConfigs {
    pub fn get_mappings(
        &self,
    ) -> Result<(MarketplaceEventConfigMappings, ContractToMarketplaceMap)> {
        let mut event_mappings: MarketplaceEventConfigMappings = AHashMap::new();
        let mut contract_to_marketplace_map: ContractToMarketplaceMap = AHashMap::new();

        for marketplace in &self.marketplaces {
            let per_event = event_mappings.entry(marketplace.name.clone()).or_default();
            for (raw_event_type, event_config) in &marketplace.events {
                let (standardized_event_type, contract_address) =
                    standardize_event_type(raw_event_type)?;
                contract_to_marketplace_map
                    .insert(contract_address, marketplace.name.clone());
                per_event.insert(standardized_event_type, MarketplaceEventConfig {
                    marketplace: marketplace.name.clone(),
                    event_type: event_config.event_type.clone(),
                    price: HashableJsonPaths::new(event_config.price.clone())?,
                    token_amount: HashableJsonPaths::new(event_config.token_amount.clone())?,
                    seller: HashableJsonPaths::new(event_config.seller.clone())?,
                    buyer: HashableJsonPaths::new(event_config.buyer.clone())?,
                    creator_address: HashableJsonPaths::new(
                        event_config.creator_address.clone(),
                    )?,
                    collection_name: HashableJsonPaths::new(
                        event_config.collection_name.clone(),
                    )?,
                    token_name: HashableJsonPaths::new(event_config.token_name.clone())?,
                    property_version: HashableJsonPaths::new(
                        event_config.property_version.clone(),
                    )?,
                });
            }
        }

        Ok((event_mappings, contract_to_marketplace_map))
    }
}

/// Standardizes the address part of a fully qualified event type and returns
/// the rewritten type together with the contract address.
pub fn standardize_event_type(event_type: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = event_type.split("::").collect();
    if parts.len() < 3 {
        // With v1 events it is possible to emit primitives as events, e.g. just
        // emit an address or u64 as an event. We don't support this.
        anyhow::bail!("Unsupported event type: {}", event_type);
    }
    let contract_address = standardize_address(parts[0]);
    let standardized = format!("{}::{}", contract_address, parts[1..].join("::"));
    Ok((standardized, contract_address))
}

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsExpression,
    FromSqlRow,
    EnumString,
    Display,
    Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[diesel(sql_type = Text)]
pub enum MarketplaceEventType {
    // Listing lifecycle
    PlaceListing,
    CancelListing,
    /// Completed buy/sell/swap. The only type that contributes trade volume.
    FillListing,
    ChangePrice,
    #[default]
    Unknown,
}

impl ToSql<Text, Pg> for MarketplaceEventType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.to_string().as_bytes())?;
        Ok(serialize::IsNull::No)
    }
}

impl FromSql<Text, Pg> for MarketplaceEventType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let s = std::str::from_utf8(bytes.as_bytes())?;
        s.parse::<MarketplaceEventType>()
            .map_err(|_| "Unrecognized MarketplaceEventType".into())
    }
}
