pub mod album;
pub mod api;
pub mod common;
pub mod config;
pub mod db;
pub mod flickr;
