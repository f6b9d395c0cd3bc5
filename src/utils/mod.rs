pub mod starting_version;
pub mod token_ids;
pub mod util;

pub use util::parse_timestamp;
