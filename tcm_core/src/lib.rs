//! Assembler and execution engine for a byte-sized, 4-byte-instruction machine.
//!
//! Source text goes through [`assembler::assembler::Assembler`] into a
//! [`instruction::instruction::Program`], which [`engine::engine::Engine`] runs
//! against a [`device::device::ConsoleDevice`].

pub mod assembler;
pub mod device;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod expression;
pub mod instruction;
pub mod machine;
pub mod outcome;
pub mod preprocess;
pub mod symbols;
pub mod templates;
