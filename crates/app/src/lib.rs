pub mod cli;
pub mod console;
pub mod demo;
pub mod render;
pub mod settings;
pub mod viewport;
