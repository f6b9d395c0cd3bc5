// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::IndexerProcessorConfig,
    postgres::{postgres_utils::ArcDbPool, processor_status::ProcessorStatusQuery},
    processor::PROCESSOR_NAME,
};
use anyhow::{Context, Result};

/// Get the appropriate starting version for the processor.
///
/// Returns the higher of the checkpointed version from the DB and
/// `starting_version` from the config, or 0 if neither is set.
pub async fn get_starting_version(
    indexer_processor_config: &IndexerProcessorConfig,
    conn_pool: ArcDbPool,
) -> Result<u64> {
    let latest_processed_version =
        get_starting_version_from_db(indexer_processor_config, conn_pool)
            .await
            .context("Failed to get latest processed version from DB")?;

    Ok(latest_processed_version.unwrap_or(
        indexer_processor_config
            .transaction_stream_config
            .starting_version
            .unwrap_or(0),
    ))
}

async fn get_starting_version_from_db(
    indexer_processor_config: &IndexerProcessorConfig,
    conn_pool: ArcDbPool,
) -> Result<Option<u64>> {
    let mut conn = conn_pool.get().await?;

    let status = ProcessorStatusQuery::get_by_processor(PROCESSOR_NAME, &mut conn)
        .await
        .context("Failed to query processor_status table.")?;

    // Return None if there is no checkpoint. Otherwise,
    // return the higher of the checkpointed version and `starting_version`.
    Ok(status.map(|status| {
        std::cmp::max(
            status.last_success_version as u64,
            indexer_processor_config
                .transaction_stream_config
                .starting_version
                .unwrap_or(0),
        )
    }))
}
