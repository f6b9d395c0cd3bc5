// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::marketplace_config::MarketplaceConfigs,
    steps::{reduction_step::Tables, remappers::event_remapper::EventRemapper},
};
use anyhow::Result;
use aptos_indexer_processor_sdk::{
    traits::{AsyncRunType, AsyncStep, NamedStep, Processable},
    types::transaction_context::TransactionContext,
    utils::errors::ProcessorError,
};
use aptos_protos::transaction::v1::Transaction;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::sync::Arc;
use tonic::async_trait;
use tracing::error;

pub struct ProcessStep {
    pub event_remapper: Arc<EventRemapper>,
}

impl ProcessStep {
    pub fn new(marketplace_configs: MarketplaceConfigs) -> Result<Self> {
        Ok(Self {
            event_remapper: Arc::new(EventRemapper::new(&marketplace_configs)?),
        })
    }
}

#[async_trait]
impl Processable for ProcessStep {
    type Input = Vec<Transaction>;
    type Output = Tables;
    type RunType = AsyncRunType;

    async fn process(
        &mut self,
        transactions: TransactionContext<Vec<Transaction>>,
    ) -> Result<Option<TransactionContext<Tables>>, ProcessorError> {
        let results: Result<Vec<_>, ProcessorError> = transactions
            .data
            .par_iter()
            .map(|txn| self.event_remapper.remap_events(txn.clone()))
            .collect();

        match results {
            Ok(results) => {
                let mut all_collection_volumes = Vec::new();
                let mut all_current_collection_volumes = Vec::new();
                let mut all_token_volumes = Vec::new();
                let mut all_current_token_volumes = Vec::new();
                let mut all_listings = Vec::new();

                for (
                    collection_volumes,
                    current_collection_volumes,
                    token_volumes,
                    current_token_volumes,
                    listings,
                ) in results
                {
                    all_collection_volumes.extend(collection_volumes);
                    all_current_collection_volumes.extend(current_collection_volumes);
                    all_token_volumes.extend(token_volumes);
                    all_current_token_volumes.extend(current_token_volumes);
                    all_listings.extend(listings);
                }

                Ok(Some(TransactionContext {
                    data: (
                        all_collection_volumes,
                        all_current_collection_volumes,
                        all_token_volumes,
                        all_current_token_volumes,
                        all_listings,
                    ),
                    metadata: transactions.metadata,
                }))
            },
            Err(e) => {
                error!("Error processing transactions: {:#}", e);
                Err(e)
            },
        }
    }
}

impl AsyncStep for ProcessStep {}

impl NamedStep for ProcessStep {
    fn name(&self) -> String {
        "ProcessStep".to_string()
    }
}
