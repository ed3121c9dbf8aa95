//! Power/ground definitions: per-net voltage declarations, the family
//! relation graph used to decide which shorts are expected vs. leaks, and
//! the postfix voltage-expression evaluator used to resolve macro-valued
//! rails (e.g. `VDD - VT`).

use crate::ids::{NetId, Voltage};
use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// Declaration-time classification of a power definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PowerType: u32 {
        /// A true power/ground rail (as opposed to a signal net given an
        /// expected-voltage annotation).
        const POWER              = 1 << 0;
        /// An external input: its voltage is asserted, not derived.
        const INPUT               = 1 << 1;
        /// May legitimately float to high impedance.
        const HIZ                  = 1 << 2;
        /// Reached only through a resistor, never directly driven.
        const RESISTOR             = 1 << 3;
        /// A reference voltage used only for comparison, not propagation.
        const REFERENCE            = 1 << 4;
        const MIN_CALCULATED       = 1 << 5;
        const SIM_CALCULATED       = 1 << 6;
        const MAX_CALCULATED       = 1 << 7;
    }
}

bitflags! {
    /// Which interpretations actively drive or ignore this power during
    /// propagation, mirroring `activeType_t`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActiveType: u32 {
        const MIN_ACTIVE = 1 << 0;
        const MAX_ACTIVE = 1 << 1;
        const MIN_IGNORE = 1 << 2;
        const MAX_IGNORE = 1 << 3;
    }
}

/// How a power's voltage under a given interpretation was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalculationType {
    #[default]
    Unknown,
    /// Declared directly, not derived.
    No,
    /// Derived by an upward (pull-up) traversal.
    Up,
    /// Derived by a downward (pull-down) traversal.
    Down,
    /// Derived through a resistor path.
    Resistor,
    /// Derived by the estimated-current heuristic.
    Estimated,
}

/// One power/ground definition as declared in the power file, keyed by a
/// dense `PowerId` (reusing `NetId`'s numeric space since every power
/// definition is anchored to exactly one net).
#[derive(Debug, Clone)]
pub struct Power {
    pub net_id: NetId,
    pub signal: String,
    /// Alternate name this power is also known by (a second signal token
    /// on the same declaration line), checked by `relates()`'s `member`
    /// test alongside `signal`.
    pub alias: Option<String>,
    /// Alias this power was merged under, if a duplicate definition on the
    /// same net was resolved by keeping the first and aliasing the rest.
    pub alias_of: Option<NetId>,

    pub power_type: PowerType,
    pub active: ActiveType,

    pub min_voltage: Voltage,
    pub sim_voltage: Voltage,
    pub max_voltage: Voltage,

    /// Base-power back-references used by `relates()` and error-checker
    /// "expected voltage" resolution: the net whose min/sim/max voltage
    /// this power's own voltage was ultimately computed from.
    pub default_min_net: Option<NetId>,
    pub default_sim_net: Option<NetId>,
    pub default_max_net: Option<NetId>,

    /// Raw (possibly macro-valued) expected-voltage expressions, evaluated
    /// lazily by `evaluate_expression`.
    pub expected_min: Option<String>,
    pub expected_sim: Option<String>,
    pub expected_max: Option<String>,

    /// Family name this power was declared a member of, kept only for
    /// display/report purposes — `family` directives fold every member's
    /// signal into each other member's `relative_set` at load time
    /// (mirroring how the power file's `permit@FAMILY`/`prohibit@FAMILY`
    /// directives expand), so `relates()` itself never consults this field.
    pub family: String,
    /// The set of other power signals (by name, and by alias) this power
    /// relates to. Populated from `permit@NAME`/`permit@FAMILY` directives
    /// (a "friend" set when `relative_friendly` is true) or from
    /// `prohibit@NAME`/`prohibit@FAMILY` directives (an "enemy" set when
    /// `relative_friendly` is false) — the power file allows only one or
    /// the other per power, matching the single `relativeSet` +
    /// `relativeFriendly` pair the original rule checker keeps.
    pub relative_set: Vec<String>,
    pub relative_friendly: bool,

    pub min_calc: CalculationType,
    pub sim_calc: CalculationType,
    pub max_calc: CalculationType,
}

impl Power {
    pub fn new(net_id: NetId, signal: impl Into<String>) -> Self {
        Self {
            net_id,
            signal: signal.into(),
            alias: None,
            alias_of: None,
            power_type: PowerType::empty(),
            active: ActiveType::empty(),
            min_voltage: Voltage::UNKNOWN,
            sim_voltage: Voltage::UNKNOWN,
            max_voltage: Voltage::UNKNOWN,
            default_min_net: None,
            default_sim_net: None,
            default_max_net: None,
            expected_min: None,
            expected_sim: None,
            expected_max: None,
            family: String::new(),
            relative_set: Vec::new(),
            relative_friendly: true,
            min_calc: CalculationType::Unknown,
            sim_calc: CalculationType::Unknown,
            max_calc: CalculationType::Unknown,
        }
    }

    pub fn is_power_rail(&self) -> bool {
        self.power_type.contains(PowerType::POWER)
    }

    pub fn is_input(&self) -> bool {
        self.power_type.contains(PowerType::INPUT)
    }

    pub fn allows_hiz(&self) -> bool {
        self.power_type.contains(PowerType::HIZ)
    }
}

/// All power definitions, keyed by net id, plus the macro table used to
/// resolve expected-voltage expressions.
#[derive(Debug, Default)]
pub struct PowerTable {
    powers: HashMap<NetId, Power>,
    /// `#define NAME value` entries from the power file; referenced by
    /// postfix voltage expressions (e.g. `VDD VT -`).
    macros: HashMap<String, String>,
    /// Threshold voltage (mV) per model key, populated from the model
    /// table after parsing so `Vth[modelName]` tokens can be resolved
    /// without `cvc-core` depending on `cvc-io`.
    model_vth: HashMap<String, i32>,
}

impl PowerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a power definition. A duplicate definition on a net that
    /// already has one keeps the first, and the caller is expected to log
    /// a warning.
    pub fn insert(&mut self, power: Power) -> bool {
        if self.powers.contains_key(&power.net_id) {
            return false;
        }
        self.powers.insert(power.net_id, power);
        true
    }

    pub fn get(&self, net_id: NetId) -> Option<&Power> {
        self.powers.get(&net_id)
    }

    pub fn get_mut(&mut self, net_id: NetId) -> Option<&mut Power> {
        self.powers.get_mut(&net_id)
    }

    pub fn define_macro(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.macros.insert(name.into(), value.into());
    }

    /// Record the threshold voltage a model key resolves to, for the
    /// `Vth[modelName]` token in expected-voltage expressions.
    pub fn set_model_vth(&mut self, model_key: impl Into<String>, vth_mv: i32) {
        self.model_vth.insert(model_key.into(), vth_mv);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Power> {
        self.powers.values()
    }

    /// Is `other` a declared member of `rec`'s relative set, either by its
    /// own signal/alias or, failing that, by the two records sharing at
    /// least one relative-set entry (the family-expansion case, where both
    /// sides were folded onto the same family member list)?
    fn member(rec: &Power, other: &Power) -> bool {
        let named = rec.relative_set.iter().any(|s| {
            s == &other.signal || other.alias.as_deref() == Some(s.as_str())
        });
        if named {
            return true;
        }
        !rec.relative_set.is_empty()
            && !other.relative_set.is_empty()
            && rec.relative_set.iter().any(|s| other.relative_set.contains(s))
    }

    /// Two powers "relate" if a short between their nets is expected
    /// rather than a leak. Each power carries at most one relative set:
    /// a friend list (`relative_friendly == true`, shorts to named powers
    /// are expected) or an enemy list (`relative_friendly == false`,
    /// shorts to named powers are always leaks even if they'd otherwise
    /// default to related). `default` is the caller's fallback when
    /// neither side declares an opinion about the other.
    pub fn relates(&self, a: NetId, b: NetId, default: bool) -> bool {
        if a == b {
            return true;
        }
        let (Some(pa), Some(pb)) = (self.powers.get(&a), self.powers.get(&b)) else {
            return default;
        };

        let pa_friends = pa.relative_friendly && !pa.relative_set.is_empty();
        let pa_enemies = !pa.relative_friendly && !pa.relative_set.is_empty();
        let pb_friends = pb.relative_friendly && !pb.relative_set.is_empty();
        let pb_enemies = !pb.relative_friendly && !pb.relative_set.is_empty();

        match (pa_friends, pa_enemies, pb_friends, pb_enemies) {
            (true, _, true, _) => Self::member(pa, pb) || Self::member(pb, pa),
            (true, _, _, true) => Self::member(pa, pb) && !Self::member(pb, pa),
            (_, true, true, _) => Self::member(pb, pa) && !Self::member(pa, pb),
            (_, true, _, true) => !Self::member(pa, pb) && !Self::member(pb, pa),
            (true, _, false, false) => Self::member(pa, pb),
            (_, true, false, false) => !Self::member(pa, pb),
            (false, false, true, _) => Self::member(pb, pa),
            (false, false, _, true) => !Self::member(pb, pa),
            (false, false, false, false) => default,
        }
    }

    /// Walk `default_*_net` back-references to find the power a given
    /// power's voltage under `interp` was ultimately derived from. Returns
    /// the starting power itself if it was declared directly (not
    /// calculated).
    pub fn base_power(&self, net_id: NetId, interp: Interpretation) -> Option<&Power> {
        let mut current = net_id;
        let mut steps = 0;
        loop {
            let power = self.powers.get(&current)?;
            let next = match interp {
                Interpretation::Min => power.default_min_net,
                Interpretation::Sim => power.default_sim_net,
                Interpretation::Max => power.default_max_net,
            };
            match next {
                Some(next_net) if next_net != current => {
                    current = next_net;
                    steps += 1;
                    if steps > crate::ids::MAX_CHAIN_LENGTH {
                        return self.powers.get(&current);
                    }
                }
                _ => return self.powers.get(&current),
            }
        }
    }

    /// Evaluate a postfix voltage expression such as `"VDD VT -"` against
    /// the macro table and the already-resolved voltages of named power
    /// signals. `Vth[modelName]` resolves to that model's threshold
    /// voltage. `+ - * /` poison-propagate: an unknown operand poisons the
    /// whole expression, since a partial arithmetic answer would be worse
    /// than no answer. `<`/`>` (binary min/max) poison-drop instead: they
    /// pick whichever operand is known, only poisoning when both are —
    /// a clamp expression like `VDD VDDQ <` should still resolve when only
    /// one rail's voltage happens to be known.
    pub fn evaluate_expression(&self, expr: &str, interp: Interpretation) -> Voltage {
        let mut stack: Vec<Option<i64>> = Vec::new();
        for token in expr.split_whitespace() {
            match token {
                "+" | "-" | "*" | "/" => {
                    let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                        return Voltage::UNKNOWN;
                    };
                    let result = match (a, b) {
                        (Some(a), Some(b)) => match token {
                            "+" => Some(a + b),
                            "-" => Some(a - b),
                            "*" => Some(a * b),
                            "/" => {
                                if b == 0 {
                                    None
                                } else {
                                    Some(a / b)
                                }
                            }
                            _ => unreachable!(),
                        },
                        _ => None,
                    };
                    stack.push(result);
                }
                "<" | ">" => {
                    let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
                        return Voltage::UNKNOWN;
                    };
                    let result = match (a, b) {
                        (Some(a), Some(b)) if token == "<" => Some(a.min(b)),
                        (Some(a), Some(b)) => Some(a.max(b)),
                        (Some(a), None) | (None, Some(a)) => Some(a),
                        (None, None) => None,
                    };
                    stack.push(result);
                }
                _ => {
                    if let Some(model_key) = token.strip_prefix("Vth[").and_then(|s| s.strip_suffix(']')) {
                        stack.push(self.model_vth.get(model_key).copied().map(i64::from));
                        continue;
                    }
                    if let Ok(literal) = token.parse::<i64>() {
                        stack.push(Some(literal));
                        continue;
                    }
                    let resolved = self
                        .macros
                        .get(token)
                        .and_then(|value| value.parse::<i64>().ok())
                        .or_else(|| {
                            self.signal_voltage(token, interp)
                                .filter(Voltage::is_known)
                                .map(|v| v.value() as i64)
                        });
                    stack.push(resolved);
                }
            }
        }
        match stack.as_slice() {
            [Some(value)] => Voltage::mv(*value as i32),
            _ => Voltage::UNKNOWN,
        }
    }

    fn signal_voltage(&self, signal: &str, interp: Interpretation) -> Option<Voltage> {
        let power = self.powers.values().find(|p| p.signal == signal)?;
        Some(match interp {
            Interpretation::Min => power.min_voltage,
            Interpretation::Sim => power.sim_voltage,
            Interpretation::Max => power.max_voltage,
        })
    }
}

/// Which of the three parallel propagation passes a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpretation {
    Min,
    Sim,
    Max,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relates_when_both_sides_list_each_other_as_friends() {
        let mut table = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.relative_friendly = true;
        vdd.relative_set.push("VDDQ".into());
        let mut vddq = Power::new(NetId::new(1), "VDDQ");
        vddq.relative_friendly = true;
        vddq.relative_set.push("VDD".into());
        table.insert(vdd);
        table.insert(vddq);
        assert!(table.relates(NetId::new(0), NetId::new(1), false));
    }

    #[test]
    fn enemy_list_overrides_the_other_sides_friend_claim() {
        let mut table = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.relative_friendly = true;
        vdd.relative_set.push("VDDQ".into());
        let mut vddq = Power::new(NetId::new(1), "VDDQ");
        vddq.relative_friendly = false;
        vddq.relative_set.push("VDD".into());
        table.insert(vdd);
        table.insert(vddq);
        assert!(!table.relates(NetId::new(0), NetId::new(1), true));
    }

    #[test]
    fn unrelated_powers_fall_back_to_default() {
        let mut table = PowerTable::new();
        table.insert(Power::new(NetId::new(0), "VDD"));
        table.insert(Power::new(NetId::new(1), "GND"));
        assert!(!table.relates(NetId::new(0), NetId::new(1), false));
        assert!(table.relates(NetId::new(0), NetId::new(1), true));
    }

    #[test]
    fn family_members_relate_via_shared_relative_set() {
        let mut table = PowerTable::new();
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.family = "core".into();
        vdd.relative_set.push("VDDQ".into());
        let mut vddq = Power::new(NetId::new(1), "VDDQ");
        vddq.family = "core".into();
        vddq.relative_set.push("VDD".into());
        table.insert(vdd);
        table.insert(vddq);
        assert!(table.relates(NetId::new(0), NetId::new(1), false));
    }

    #[test]
    fn postfix_expression_with_macro() {
        let mut table = PowerTable::new();
        table.define_macro("VT", "700");
        let mut vdd = Power::new(NetId::new(0), "VDD");
        vdd.sim_voltage = Voltage::mv(1800);
        table.insert(vdd);

        let v = table.evaluate_expression("VDD VT -", Interpretation::Sim);
        assert_eq!(v, Voltage::mv(1100));
    }

    #[test]
    fn undefined_macro_poisons_result() {
        let table = PowerTable::new();
        let v = table.evaluate_expression("VDD UNDEFINED_MACRO -", Interpretation::Sim);
        assert_eq!(v, Voltage::UNKNOWN);
    }

    #[test]
    fn min_max_operators_pick_the_lower_or_higher_operand() {
        let table = PowerTable::new();
        assert_eq!(table.evaluate_expression("1800 1500 <", Interpretation::Sim), Voltage::mv(1500));
        assert_eq!(table.evaluate_expression("1800 1500 >", Interpretation::Sim), Voltage::mv(1800));
    }

    #[test]
    fn min_max_operators_drop_a_poisoned_operand_instead_of_propagating_it() {
        let table = PowerTable::new();
        let v = table.evaluate_expression("1800 UNDEFINED_MACRO <", Interpretation::Sim);
        assert_eq!(v, Voltage::mv(1800));
    }

    #[test]
    fn vth_token_resolves_model_threshold_voltage() {
        let mut table = PowerTable::new();
        table.set_model_vth("nmos1", 700);
        let v = table.evaluate_expression("Vth[nmos1]", Interpretation::Sim);
        assert_eq!(v, Voltage::mv(700));
    }

    #[test]
    fn base_power_follows_default_net_chain() {
        let mut table = PowerTable::new();
        let vdd = Power::new(NetId::new(0), "VDD");
        let mut derived = Power::new(NetId::new(1), "VDD_INT");
        derived.default_sim_net = Some(NetId::new(0));
        table.insert(vdd);
        table.insert(derived);

        let base = table.base_power(NetId::new(1), Interpretation::Sim).unwrap();
        assert_eq!(base.signal, "VDD");
    }
}
