//! WordPress REST client backing the analytics source and login ports.

pub mod client;
mod dto;

pub use client::{TOKEN_ENDPOINTS, WpClient};
