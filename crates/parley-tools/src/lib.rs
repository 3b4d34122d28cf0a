// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod builtin;
pub mod chest;
pub mod policy;
pub mod reservations;
pub mod toolset;

pub use builtin::calculator::CalculatorToolset;
pub use builtin::command::CommandToolset;
pub use builtin::sheet::SheetToolset;
pub use builtin::think::ThinkToolset;
pub use chest::{InferenceData, ToolChest, ToolSchema, TOOL_SEP};
pub use policy::{CommandPolicy, FlagSpec, PolicyStore};
pub use reservations::{ConcurrencyManager, Reservation, ReservationState};
pub use toolset::{ToolContext, ToolDescriptor, Toolset};
