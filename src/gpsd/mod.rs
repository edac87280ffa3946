pub mod client;

pub use client::GpsdClient;
