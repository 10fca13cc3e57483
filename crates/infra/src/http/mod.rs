//! HTTP transport shared by every vendor adapter

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
