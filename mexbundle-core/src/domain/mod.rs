//! Domain types for mexbundle

pub mod bar;
pub mod bin_size;
pub mod ids;
pub mod instrument;

pub use bar::{is_strictly_ordered, Bar};
pub use bin_size::{BinSize, ParseBinSizeError};
pub use ids::{assign_sids, SeriesKey, Sid};
pub use instrument::InstrumentInfo;
