// TEMPORARY, see diesel-rs/diesel#1787.
#![allow(proc_macro_derive_resolution_fallback)]

#[macro_use] extern crate diesel;
#[macro_use] extern crate log;
#[macro_use] extern crate serde_derive;

#[cfg(not(debug_assertions))]
#[macro_use]
extern crate diesel_migrations;

pub(crate) use self::config::Config;

#[macro_use] mod macros;

pub mod config;
pub mod db;
pub mod events;
pub mod models;

pub type Result<T, E=failure::Error> = std::result::Result<T, E>;
