pub mod badging;
pub mod devices;
pub mod icon;
pub mod install;
pub mod locator;
pub mod pattern;
pub mod runner;
