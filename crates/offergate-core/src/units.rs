//! Unit conversion constants shared by the provider adapters.
//!
//! Upstream payloads mix units freely: capacities arrive in MB or GB,
//! speeds in Mbit/s or Gbit/s, and prices in whole euros or cents. The
//! canonical model is fixed to MB, Mbit/s and cents.

/// Megabytes per gigabyte (decimal, as used by every upstream).
pub const MB_PER_GB: i32 = 1000;

/// Cents per euro.
pub const CENTS_PER_EURO: i32 = 100;
