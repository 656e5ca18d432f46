//! Camera watcher: pulls frames from a source, runs motion detection and
//! records motion incidents to a per-camera SQLite log with thumbnails.

pub mod db;
pub mod decode;
pub mod incident;
pub mod retention;
pub mod source;
pub mod thumbnail;
pub mod watch;
