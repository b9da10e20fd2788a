// # Output Writers
//
// This module provides implementations of the OutputWriter trait for
// different destinations.

pub mod console;
pub mod file;
pub mod memory;

pub use console::ConsoleOutput;
pub use file::FileOutput;
pub use memory::MemoryOutput;
