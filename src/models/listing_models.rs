// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

// This is required because a diesel macro makes clippy sad
#![allow(clippy::extra_unused_lifetimes)]
#![allow(clippy::unused_unit)]

use crate::{
    config::marketplace_config::MarketplaceEventType,
    models::marketplace_activity::MarketplaceActivity,
    schema::current_marketplace_listings,
};
use bigdecimal::BigDecimal;
use diesel::prelude::*;
use field_count::FieldCount;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, FieldCount, Identifiable, Insertable, Serialize)]
#[diesel(primary_key(token_data_id_hash))]
#[diesel(table_name = current_marketplace_listings)]
pub struct CurrentMarketplaceListing {
    pub token_data_id_hash: String,
    pub market_address: String,
    pub property_version: BigDecimal,
    pub creator_address: String,
    pub collection_name: String,
    pub name: String,
    pub seller: String,
    pub amount: BigDecimal,
    pub price: BigDecimal,
    pub event_type: MarketplaceEventType,
    pub inserted_at: chrono::NaiveDateTime,
    pub last_transaction_version: i64,
}

impl CurrentMarketplaceListing {
    pub fn from_activity(activity: &MarketplaceActivity) -> Option<Self> {
        let token_data_id = activity.token_data_id()?;
        // The market address only identifies an open listing. Once the listing
        // leaves the book the venue is carried by event_type alone.
        let market_address = match activity.standard_event_type {
            MarketplaceEventType::PlaceListing | MarketplaceEventType::ChangePrice => {
                activity.contract_address.clone()
            },
            _ => String::new(),
        };

        Some(Self {
            token_data_id_hash: token_data_id.to_hash(),
            market_address,
            property_version: activity.property_version.clone(),
            creator_address: token_data_id.get_creator(),
            collection_name: token_data_id.get_collection_trunc(),
            name: token_data_id.get_name_trunc(),
            seller: activity.seller.clone().unwrap_or_default(),
            amount: activity.token_amount.clone(),
            price: activity.price.clone(),
            event_type: activity.standard_event_type.clone(),
            inserted_at: activity.block_timestamp,
            last_transaction_version: activity.txn_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::Zero;

    fn listing_activity(event_type: MarketplaceEventType) -> MarketplaceActivity {
        MarketplaceActivity {
            txn_version: 7,
            event_index: 0,
            raw_event_type: "0x2::events::ListEvent".to_string(),
            standard_event_type: event_type,
            marketplace: "topaz".to_string(),
            contract_address:
                "0x0000000000000000000000000000000000000000000000000000000000000002".to_string(),
            creator_address: Some("0x1".to_string()),
            collection_name: Some("Aptos Monkeys".to_string()),
            token_name: Some("Monkey #1".to_string()),
            property_version: BigDecimal::zero(),
            seller: Some("0xa".to_string()),
            buyer: None,
            price: BigDecimal::from(900),
            token_amount: BigDecimal::from(1),
            block_timestamp: chrono::DateTime::from_timestamp(1679000000, 0)
                .unwrap()
                .naive_utc(),
        }
    }

    #[test]
    fn place_listing_keeps_market_address() {
        let listing = CurrentMarketplaceListing::from_activity(&listing_activity(
            MarketplaceEventType::PlaceListing,
        ))
        .unwrap();
        assert_eq!(
            listing.market_address,
            "0x0000000000000000000000000000000000000000000000000000000000000002"
        );
        assert_eq!(listing.event_type, MarketplaceEventType::PlaceListing);
        assert_eq!(listing.price, BigDecimal::from(900));
    }

    #[test]
    fn cancel_and_fill_clear_market_address() {
        for event_type in [
            MarketplaceEventType::CancelListing,
            MarketplaceEventType::FillListing,
        ] {
            let listing =
                CurrentMarketplaceListing::from_activity(&listing_activity(event_type)).unwrap();
            assert_eq!(listing.market_address, "");
        }
    }

    #[test]
    fn long_names_are_truncated() {
        let mut activity = listing_activity(MarketplaceEventType::PlaceListing);
        activity.collection_name = Some("c".repeat(300));
        activity.token_name = Some("n".repeat(300));
        let listing = CurrentMarketplaceListing::from_activity(&activity).unwrap();
        assert_eq!(listing.collection_name.len(), 128);
        assert_eq!(listing.name.len(), 128);
    }
}
