// tests/integration/main.rs

mod command_action;
mod fs_abstraction;
