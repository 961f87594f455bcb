pub mod db;
pub mod notifications;
pub mod server;
pub mod services;
pub mod web;
