// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::utils::util::{hash_str, truncate_str};
use aptos_indexer_processor_sdk::utils::convert::standardize_address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a collection or token name persisted to the DB
pub const MAX_NAME_LENGTH: usize = 128;

/// Natural identity of a token: creator address plus collection and token names.
/// The hex SHA-256 of the `::`-joined form is the stable key used across tables.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenDataIdType {
    pub creator: String,
    pub collection: String,
    pub name: String,
}

impl TokenDataIdType {
    pub fn new(creator: String, collection: String, name: String) -> Self {
        Self {
            creator,
            collection,
            name,
        }
    }

    pub fn to_hash(&self) -> String {
        hash_str(&self.to_string())
    }

    pub fn get_collection_trunc(&self) -> String {
        truncate_str(&self.collection, MAX_NAME_LENGTH)
    }

    pub fn get_name_trunc(&self) -> String {
        truncate_str(&self.name, MAX_NAME_LENGTH)
    }

    pub fn get_collection_data_id_hash(&self) -> String {
        CollectionDataIdType::new(self.creator.clone(), self.collection.clone()).to_hash()
    }

    pub fn get_creator(&self) -> String {
        standardize_address(&self.creator)
    }
}

impl fmt::Display for TokenDataIdType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            standardize_address(&self.creator),
            self.collection,
            self.name
        )
    }
}

/// Natural identity of a collection, hashed the same way as [`TokenDataIdType`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CollectionDataIdType {
    pub creator: String,
    pub name: String,
}

impl CollectionDataIdType {
    pub fn new(creator: String, name: String) -> Self {
        Self { creator, name }
    }

    pub fn to_hash(&self) -> String {
        hash_str(&self.to_string())
    }

    pub fn get_name_trunc(&self) -> String {
        truncate_str(&self.name, MAX_NAME_LENGTH)
    }

    pub fn get_creator(&self) -> String {
        standardize_address(&self.creator)
    }
}

impl fmt::Display for CollectionDataIdType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", standardize_address(&self.creator), self.name)
    }
}
