//! The flat transistor-level netlist: nets and devices.

use crate::ids::{DeviceId, InstanceId, NetId, Resistance};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device kind, restricted to what a switch-level checker actually
/// propagates through. Passive two-terminal parts (capacitor, diode, fuse)
/// and switch-level transistors (NMOS/PMOS) cover the device grammar a
/// flat transistor-level netlist needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Nmos,
    Pmos,
    Resistor,
    Capacitor,
    Diode,
    Fuse,
    /// Bipolar or other device kinds the checker does not model
    /// electrically but must still place on the netlist graph.
    Other,
}

bitflags! {
    /// Per-queue "already handled this pass" bookkeeping, one copy per
    /// interpretation. Mirrors the pending/inactive bits the propagator
    /// consults before re-enqueuing a device it has already relaxed once
    /// this generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct DeviceQueueStatus: u32 {
        const MIN_PENDING  = 1 << 0;
        const MAX_PENDING  = 1 << 1;
        const SIM_PENDING  = 1 << 2;
        const MIN_INACTIVE = 1 << 3;
        const MAX_INACTIVE = 1 << 4;
        const SIM_INACTIVE = 1 << 5;
    }
}

impl DeviceType {
    pub fn is_mos(self) -> bool {
        matches!(self, DeviceType::Nmos | DeviceType::Pmos)
    }

    pub fn is_passive_two_terminal(self) -> bool {
        matches!(
            self,
            DeviceType::Resistor | DeviceType::Capacitor | DeviceType::Diode | DeviceType::Fuse
        )
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceType::Nmos => "nmos",
            DeviceType::Pmos => "pmos",
            DeviceType::Resistor => "resistor",
            DeviceType::Capacitor => "capacitor",
            DeviceType::Diode => "diode",
            DeviceType::Fuse => "fuse",
            DeviceType::Other => "other",
        };
        write!(f, "{s}")
    }
}

bitflags! {
    /// Per-net status accumulated during parsing and propagation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct NetStatus: u32 {
        /// Net appears as a MOSFET gate terminal somewhere in the design.
        const GATE            = 1 << 0;
        /// Net appears as a source/drain terminal somewhere.
        const SOURCE_DRAIN     = 1 << 1;
        /// Net is declared as a power/ground rail in the power file.
        const POWER            = 1 << 2;
        /// Net has at least one resistive (non-MOS) path to another net.
        const RESISTOR_PATH    = 1 << 3;
        /// Net was merged into another net's equivalence chain (a
        /// zero/low-resistance short, e.g. a closed fuse).
        const MERGED           = 1 << 4;
        /// Net settled to a voltage under the Min interpretation.
        const MIN_POWER             = 1 << 5;
        /// Net settled to a voltage under the Max interpretation.
        const MAX_POWER             = 1 << 6;
        /// Net settled to a voltage under the Sim interpretation.
        const SIM_POWER             = 1 << 7;
        /// A device on this net still needs its Min voltage re-examined
        /// against a newly discovered path (set by the voltage-conflict
        /// branch of the propagator, cleared once resolved).
        const NEEDS_MIN_CHECK       = 1 << 8;
        const NEEDS_MAX_CHECK       = 1 << 9;
        /// Net's Min voltage was estimated across a MOS-diode rather than
        /// derived from a real conducting path; a later real path that
        /// offers a lower Min voltage should take over instead of being
        /// reported as a second leak on the same physical short.
        const NEEDS_MIN_CONNECTION  = 1 << 10;
        const NEEDS_MAX_CONNECTION  = 1 << 11;
        /// Net is marked analog: gate-vs-source leak checks are suppressed
        /// here unless explicitly requested (`cvcAnalogGates`).
        const ANALOG                = 1 << 12;
    }
}

impl Default for NetStatus {
    fn default() -> Self {
        NetStatus::empty()
    }
}

bitflags! {
    /// Which device kinds are seen driving a net's source/drain terminals,
    /// tallied by [`ConnectionCount`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
    pub struct SourceDrainType: u32 {
        const NMOS      = 1 << 0;
        const PMOS      = 1 << 1;
        const RESISTOR  = 1 << 2;
        const FUSE_ON   = 1 << 3;
        const FUSE_OFF  = 1 << 4;
    }
}

/// Per-net tallies of how many device terminals of each kind land here,
/// built once after the netlist is fully loaded (`Network::tally_connections`).
/// Used by the possible-HiZ transmission-gate/tristate-inverter test, which
/// needs to know a gate net's fan-out shape without re-walking every device.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionCount {
    pub source_count: u32,
    pub drain_count: u32,
    pub gate_count: u32,
    pub bulk_count: u32,
    pub source_drain_type: SourceDrainType,
}

impl ConnectionCount {
    pub fn source_drain_total(&self) -> u32 {
        self.source_count + self.drain_count
    }
}

/// A single net in the flat netlist.
#[derive(Debug, Clone)]
pub struct Net {
    pub id: NetId,
    pub name: String,
    pub subcircuit: InstanceId,
    pub status: NetStatus,
    pub connections: ConnectionCount,
    /// The net this one is the logical output of an inverter/buffer from,
    /// if any, and whether the relation is same-logic (`true`, a buffer)
    /// or inverted (`false`, a true inverter). Set by
    /// `Network::detect_inverters`.
    pub inverter_of: Option<NetId>,
    pub inverter_same_logic: bool,
    /// Root of this net's always-on-switch equivalence class (a closed
    /// fuse or zero-resistance path merges nets regardless of
    /// interpretation); `self.id` until propagation assigns a root.
    pub equivalent_net: NetId,
}

impl Net {
    pub fn new(id: NetId, name: impl Into<String>, subcircuit: InstanceId) -> Self {
        Self {
            id,
            name: name.into(),
            subcircuit,
            status: NetStatus::empty(),
            connections: ConnectionCount::default(),
            inverter_of: None,
            inverter_same_logic: false,
            equivalent_net: id,
        }
    }
}

/// A single flattened device instance (transistor, resistor, capacitor,
/// diode, or fuse).
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub subcircuit: InstanceId,

    /// Terminal nets. For MOS devices: source/drain are interchangeable at
    /// parse time and get canonicalized during propagation; gate and bulk
    /// are fixed. For two-terminal passives, `gate`/`bulk` are unused
    /// (`NetId::UNKNOWN`).
    pub source: NetId,
    pub drain: NetId,
    pub gate: NetId,
    pub bulk: NetId,

    /// Model/instance parameters: threshold voltage (mV) for MOS devices,
    /// static resistance (mOhm) for resistors/fuses.
    pub vth: i32,
    pub resistance: Resistance,

    /// Per-model overvoltage ceilings (mV), parsed from the model card that
    /// produced this device; `None` falls back to the checker's global
    /// `overvoltage_limit_mv`.
    pub max_vgs_mv: Option<i32>,
    pub max_vds_mv: Option<i32>,
    pub max_vbs_mv: Option<i32>,
    pub max_vbg_mv: Option<i32>,

    /// True once a fuse has been determined open (infinite resistance) by
    /// parsing or by a prior propagation pass.
    pub fuse_open: bool,
    /// Lightly-doped drain variant of this device's model: source and
    /// drain are not interchangeable, so `check_ldd_direction` applies.
    pub is_ldd: bool,
    /// Raw parameter string from the netlist record (`w=1u l=0.1u`), kept
    /// only so error reports can quote a device's instance parameters.
    pub parameter_string: String,

    /// The other half of this device's transmission-gate/tristate-inverter
    /// pair, if any: an opposite-polarity MOS device sharing this device's
    /// source/drain pair but driven by a different gate net. Set by
    /// `Network::detect_transmission_pairs`.
    pub companion_gate: Option<NetId>,

    /// Per-interpretation queue bookkeeping, updated by the propagator.
    pub queue_status: DeviceQueueStatus,
}

impl Device {
    pub fn new(id: DeviceId, name: impl Into<String>, device_type: DeviceType, subcircuit: InstanceId) -> Self {
        Self {
            id,
            name: name.into(),
            device_type,
            subcircuit,
            source: NetId::UNKNOWN,
            drain: NetId::UNKNOWN,
            gate: NetId::UNKNOWN,
            bulk: NetId::UNKNOWN,
            vth: 0,
            resistance: Resistance::INFINITE,
            max_vgs_mv: None,
            max_vds_mv: None,
            max_vbs_mv: None,
            max_vbg_mv: None,
            fuse_open: false,
            is_ldd: false,
            parameter_string: String::new(),
            companion_gate: None,
            queue_status: DeviceQueueStatus::empty(),
        }
    }

    /// Is this source/drain/bulk terminal wired to `net`?
    pub fn touches(&self, net: NetId) -> bool {
        self.source == net || self.drain == net || self.gate == net || self.bulk == net
    }

    /// NMOS pulls its drain low relative to a high gate; PMOS pulls its
    /// drain high relative to a low gate. Used by the propagator to decide
    /// queue direction on dequeue.
    pub fn is_nmos(&self) -> bool {
        self.device_type == DeviceType::Nmos
    }

    pub fn is_pmos(&self) -> bool {
        self.device_type == DeviceType::Pmos
    }
}
