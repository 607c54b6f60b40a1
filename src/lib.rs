//! Timeline media archiver library.
//!
//! A tool that walks Twitter/X user timelines and lists, downloads photo,
//! video, and animated GIF attachments, and tracks a per-source watermark
//! so repeated runs only fetch new content.

pub mod archiver;
pub mod config;
pub mod download;
pub mod media;
pub mod metadata;
pub mod timeline;
pub mod twitter;
