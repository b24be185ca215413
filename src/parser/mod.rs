// Extraction side of the marketplace adapter.

pub mod olx_parser;

pub use olx_parser::{ListingParser, OLX_SELECTORS_V1, OlxParser};
