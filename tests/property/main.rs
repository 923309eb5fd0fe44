// tests/property/main.rs

mod cache_key;
mod cycles;
mod scheduler;
