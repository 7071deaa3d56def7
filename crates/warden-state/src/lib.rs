pub mod db;

pub use db::WatcherDb;
