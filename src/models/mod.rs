pub mod listing_models;
pub mod marketplace_activity;
pub mod volume_models;
