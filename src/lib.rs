// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent editor environment provisioning.
//!
//! Nvstrap installs a fixed lineup of components that a Neovim setup needs,
//! e.g., the editor itself, search tools, language toolchains, a patched font,
//! and the editor configuration. The installation status of every component
//! is persisted in a small YAML state file, so that repeated runs converge on
//! a working setup instead of repeating expensive or destructive work.
//!
//! # See Also
//!
//! 1. [`orchestrator::Orchestrator`]
//! 2. [`component::Installer`]
//! 3. [`state::StateStore`]

pub mod cli;
pub mod command;
pub mod component;
pub mod config;
pub mod fetch;
pub mod orchestrator;
pub mod package;
pub mod path;
pub mod platform;
pub mod state;
