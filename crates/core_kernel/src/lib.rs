//! Core Kernel - Foundational types for the member billing system
//!
//! This crate provides the building blocks used by the billing domain and
//! its adapters:
//! - Money and rates with precise decimal arithmetic
//! - Inclusive calendar date ranges
//! - Typed identifiers
//! - Port error and health-check contracts

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;

pub use money::{Money, Rate};
pub use temporal::{DateRange, TemporalError};
pub use identifiers::{
    BillId, BillItemId, BillableItemId, BusinessYearId, CustomItemTypeId, ItemTypeId,
    MemberId, PaymentId, PaymentTypeId, SubscriptionId,
};
pub use ports::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError};
