//! ```text
//! ┌──────────────┐  bytes   ┌──────────┐ directives ┌───────────┐
//! │   Fetcher    ├──────────►  Parser  ├────────────► Assembler │
//! └──────▲───────┘          └──────────┘            └─────┬─────┘
//!        │ reload                                         │ SegmentList
//! ┌──────┴───────┐        Arc<Representation>             │
//! │SegmentTracker◄────────────────────────────────────────┘
//! └──────┬───────┘
//!        │ next segment, buffer level
//! ┌──────▼───────┐
//! │    Player    ├──── samples ────► BufferAbrStrategy ──► stream index
//! └──────────────┘
//! ```

pub mod abr;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod model;
pub mod util;

pub use config::{AbrConfig, SenriConfig, TrackerConfig};
pub use error::{SenriError, SenriResult};
pub use fetch::{HttpPlaylistFetcher, PlaylistFetcher};
pub use hls::SegmentTracker;
pub use util::{http::HttpClient, time::CLOCK_FREQ};
