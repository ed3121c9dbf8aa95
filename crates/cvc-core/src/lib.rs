//! # cvc-core: static electrical rule checking for flat transistor netlists
//!
//! Given a flattened, transistor-level netlist and a power/ground
//! declaration file, this crate propagates power and ground voltages
//! through every switch-level device under three interpretations —
//! worst-case low (Min), worst-case high (Max), and nominal (Sim) — and
//! then sweeps the settled circuit for electrical rule violations:
//! overvoltage, forward-biased diodes, floating gates, and voltage
//! mismatches against a design's stated expectations.
//!
//! ## Design philosophy
//!
//! The netlist is modeled as flat arrays of [`device::Net`] and
//! [`device::Device`] indexed by dense 32-bit ids ([`ids::NetId`],
//! [`ids::DeviceId`]) rather than a general graph structure: propagation
//! needs "all devices touching net N", an adjacency map built once, not
//! arbitrary graph queries. Equivalent nets (shorted through a fuse, a
//! zero-resistance switch) are merged by [`virtual_net::VirtualNetVector`],
//! a union-find variant that also tracks cumulative path resistance.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cvc_core::device::{Device, DeviceType, Net};
//! use cvc_core::ids::{DeviceId, InstanceId, NetId, Voltage};
//! use cvc_core::network::Network;
//! use cvc_core::power::Power;
//!
//! let mut network = Network::new();
//! let vdd = network.add_net(Net::new(NetId::UNKNOWN, "VDD", InstanceId::new(0)));
//! let gnd = network.add_net(Net::new(NetId::UNKNOWN, "GND", InstanceId::new(0)));
//! let out = network.add_net(Net::new(NetId::UNKNOWN, "OUT", InstanceId::new(0)));
//!
//! let mut vdd_power = Power::new(vdd, "VDD");
//! vdd_power.sim_voltage = Voltage::mv(1800);
//! network.powers.insert(vdd_power);
//!
//! let mut gnd_power = Power::new(gnd, "GND");
//! gnd_power.sim_voltage = Voltage::mv(0);
//! network.powers.insert(gnd_power);
//!
//! let mut m1 = Device::new(DeviceId::UNKNOWN, "M1", DeviceType::Nmos, InstanceId::new(0));
//! m1.source = gnd;
//! m1.gate = vdd;
//! m1.drain = out;
//! m1.bulk = gnd;
//! m1.vth = 700;
//! network.add_device(m1);
//!
//! let mut result = network.propagate();
//! let errors = network.check(&mut result, 3600, 100);
//! assert!(errors.is_empty());
//! ```
//!
//! ## Core modules
//!
//! - [`ids`] — net/device/instance ids and the Voltage/Resistance newtypes
//! - [`device`] — the flat netlist data model (`Net`, `Device`)
//! - [`virtual_net`] — the resistance-aware union-find equivalence structure
//! - [`power`] — power/ground declarations, family relations, macro-valued
//!   voltage expressions
//! - [`queue`] — the dual-tier event queues driving propagation
//! - [`connection`] — per-device terminal snapshots consumed by the checker
//! - [`propagator`] — the Min/Sim/Max voltage propagation passes
//! - [`checker`] — post-propagation electrical rule checks
//! - [`network`] — ties the above together into one runnable check

pub mod checker;
pub mod connection;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod network;
pub mod power;
pub mod propagator;
pub mod queue;
pub mod virtual_net;

pub use checker::{Checker, ErrorEvent, ErrorKind};
pub use device::{Device, DeviceType, Net, NetStatus};
pub use diagnostics::{Diagnostics, DiagnosticIssue, Severity};
pub use error::{CoreError, CoreResult};
pub use ids::{DeviceId, InstanceId, NetId, Resistance, Voltage};
pub use network::{Network, NetworkStats, PropagationResult};
pub use power::{Interpretation, Power, PowerTable};
