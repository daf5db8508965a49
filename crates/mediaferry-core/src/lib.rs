//! Core helpers shared by the mediaferry crates: tracing setup, media types, timestamps

pub mod media;
pub mod time;
pub mod tracing;

pub use media::{
    MediaKind, TEXT_PLAIN, extension_for_media_type, media_type_for_extension,
    media_type_for_path,
};
pub use time::{file_timestamp, precise_timestamp};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
