//! Shared test harness.

#![allow(dead_code)]

mod db;

pub use self::db::{Connection, Database, Pool, Pooled, setup_db};

/// Run a test body against the shared test database.
///
/// The database is truncated and re-seeded before the body runs, under a
/// lock that keeps test cases from interleaving.
pub fn run<F>(db: &Database, test: F)
where
    F: FnOnce(&Connection) -> Result<(), failure::Error>,
{
    let _ = env_logger::builder().is_test(true).try_init();

    match db.lock(|pool| test(&*pool.get()?)) {
        Ok(()) => (),
        Err(err) => panic!("{}", err),
    }
}
