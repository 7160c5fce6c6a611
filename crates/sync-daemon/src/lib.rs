//! sync-daemon library: configuration, network status, the file watcher and
//! index refreshes used by the `gitnotes` binary, exposed for integration tests.

pub mod config;
pub mod indexer;
pub mod network;
pub mod watcher;

pub use config::{default_config_dir, default_data_dir, Config};
pub use indexer::spawn_refresh;
pub use network::{NetworkKind, NetworkSettings, StaticNetwork};
pub use watcher::{FileEvent, FileEventKind, FileWatcher};
