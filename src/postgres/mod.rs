pub mod postgres_utils;
pub mod processor_status;
