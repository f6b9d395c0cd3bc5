// Tracks collection and token trade volume observed on marketplace fill events.
// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

// This is required because a diesel macro makes clippy sad
#![allow(clippy::extra_unused_lifetimes)]
#![allow(clippy::unused_unit)]

use crate::{
    config::marketplace_config::MarketplaceEventType,
    models::marketplace_activity::MarketplaceActivity,
    schema::{collection_volumes, current_collection_volumes, current_token_volumes, token_volumes},
};
use bigdecimal::BigDecimal;
use diesel::prelude::*;
use field_count::FieldCount;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, FieldCount, Identifiable, Insertable, Serialize)]
#[diesel(primary_key(collection_data_id_hash))]
#[diesel(table_name = current_collection_volumes)]
pub struct CurrentCollectionVolume {
    pub collection_data_id_hash: String,
    pub volume: BigDecimal,
    pub inserted_at: chrono::NaiveDateTime,
    pub last_transaction_version: i64,
}

#[derive(Clone, Debug, Deserialize, FieldCount, Identifiable, Insertable, Serialize)]
#[diesel(primary_key(collection_data_id_hash, last_transaction_version, event_index))]
#[diesel(table_name = collection_volumes)]
pub struct CollectionVolume {
    pub collection_data_id_hash: String,
    pub volume: BigDecimal,
    pub inserted_at: chrono::NaiveDateTime,
    pub last_transaction_version: i64,
    pub event_index: i64,
}

#[derive(Clone, Debug, Deserialize, FieldCount, Identifiable, Insertable, Serialize)]
#[diesel(primary_key(token_data_id_hash))]
#[diesel(table_name = current_token_volumes)]
pub struct CurrentTokenVolume {
    pub token_data_id_hash: String,
    pub volume: BigDecimal,
    pub inserted_at: chrono::NaiveDateTime,
    pub last_transaction_version: i64,
}

#[derive(Clone, Debug, Deserialize, FieldCount, Identifiable, Insertable, Serialize)]
#[diesel(primary_key(token_data_id_hash, last_transaction_version, event_index))]
#[diesel(table_name = token_volumes)]
pub struct TokenVolume {
    pub token_data_id_hash: String,
    pub volume: BigDecimal,
    pub inserted_at: chrono::NaiveDateTime,
    pub last_transaction_version: i64,
    pub event_index: i64,
}

impl CurrentCollectionVolume {
    /// Builds the four volume rows for one completed trade. Returns None for
    /// events that are not fills and for fills whose token identity cannot be
    /// resolved from the payload.
    pub fn from_activity(
        activity: &MarketplaceActivity,
    ) -> Option<(Self, CollectionVolume, CurrentTokenVolume, TokenVolume)> {
        if activity.standard_event_type != MarketplaceEventType::FillListing {
            return None;
        }
        let token_data_id = activity.token_data_id()?;
        let collection_data_id_hash = token_data_id.get_collection_data_id_hash();
        let token_data_id_hash = token_data_id.to_hash();
        let volume = activity.price.clone();

        Some((
            Self {
                collection_data_id_hash: collection_data_id_hash.clone(),
                volume: volume.clone(),
                inserted_at: activity.block_timestamp,
                last_transaction_version: activity.txn_version,
            },
            CollectionVolume {
                collection_data_id_hash,
                volume: volume.clone(),
                inserted_at: activity.block_timestamp,
                last_transaction_version: activity.txn_version,
                event_index: activity.event_index,
            },
            CurrentTokenVolume {
                token_data_id_hash: token_data_id_hash.clone(),
                volume: volume.clone(),
                inserted_at: activity.block_timestamp,
                last_transaction_version: activity.txn_version,
            },
            TokenVolume {
                token_data_id_hash,
                volume,
                inserted_at: activity.block_timestamp,
                last_transaction_version: activity.txn_version,
                event_index: activity.event_index,
            },
        ))
    }
}
