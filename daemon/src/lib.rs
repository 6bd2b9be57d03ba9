//! Game-client process and launch control: finding and terminating the
//! running game, locating its installation, launching spectator sessions
//! and locking the game's persisted settings file.

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod game_api;
pub mod hotkey;
pub mod installation;
pub mod paths;
pub mod pid_cache;
pub mod process_registry;
pub mod remote;
pub mod settings_file;
pub mod spectator;

pub use controller::GameClientController;
pub use error::{GameClientError, RemoteError};
pub use game_api::GameClientApi;
