//! Lens module
//!
//! Lenses combine business logic with the output types shared by every
//! interface (CLI, IPC, HTTP). They never print anything themselves.
//!
//! | Lens | Feature Required | Dependencies |
//! |------|-----------------|--------------|
//! | `LookupService` | (always) | arc-swap, chrono |
//!
//! # Usage
//!
//! ```rust,ignore
//! use maxlon::lens::lookup::LookupService;
//!
//! let service = LookupService::initialize("networks.csv".as_ref())?;
//! let result = service.lookup("8.8.8.8".parse()?);
//! ```

pub mod utils;

// LookupService - longest-prefix lookup with atomic reload
pub mod lookup;
