//! rhkd: a hotkey daemon for X11, and the control socket its `rhkc`
//! client talks to.

pub mod chain;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod display;
pub mod executor;
pub mod hotkey;
pub mod ipc;
pub mod keymap;
pub mod session;
pub mod status;
pub mod x11;
