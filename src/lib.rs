pub mod asm;
pub mod config;
pub mod nes;
