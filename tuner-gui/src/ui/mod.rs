//! # UI Module
//!
//! This module contains all UI components for the guitar tuner application.

pub mod cent_meter;
pub mod format;
pub mod main_display;
