//! Shared test harness modules for the changeset mirror CLI.

use super::*;

mod helpers;
mod steps;
