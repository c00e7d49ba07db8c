#![allow(clippy::new_without_default, clippy::len_without_is_empty)]

pub mod api;
pub mod app;
pub mod command;
pub mod common;
pub mod config;
pub mod eval;
