//! Document-format extraction glue: thin, value-free adapters turning a raw
//! file into plain text for the segmenter. Out of scope per the core spec
//! (the ingest REST surface is an external collaborator) — kept minimal and
//! grounded on the crates the corpus already reaches for: `lopdf` for PDF,
//! `zip`+`quick-xml` for DOCX, `scraper` for HTML, `serde_json` for JSON.

pub mod docx;
pub mod extract;
pub mod html;
pub mod json;
pub mod lopdf_parser;

pub use extract::extract_text;
pub use lopdf_parser::LoPdfParser;
